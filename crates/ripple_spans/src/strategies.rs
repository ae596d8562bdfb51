//! Proptest strategies for scenario graphs.

use proptest::prelude::*;
use ripple_model::{
    BusinessDataField, Dependency, FieldKind, LatencyProfile, Operation, Protocol, ScenarioConfig,
    Service, TelemetryConfig,
};

/// Strategy for a call protocol.
pub fn protocol() -> impl Strategy<Value = Protocol> {
    prop_oneof![
        Just(Protocol::Http),
        Just(Protocol::Grpc),
        Just(Protocol::Other("thrift".to_string())),
    ]
}

/// Strategy for a dependency among `services` peers, stores and queues.
pub fn dependency(services: usize) -> impl Strategy<Value = Dependency> {
    prop_oneof![
        4 => (0..services, prop::option::of(Just("orders".to_string())), protocol()).prop_map(
            |(peer, via, protocol)| Dependency::Service {
                service: format!("svc-{peer}"),
                protocol,
                via,
                latency: Some(LatencyProfile::new(0, 5).with_probability(0.5)),
            }
        ),
        1 => Just(Dependency::database("main-db")),
        1 => Just(Dependency::cache("session-cache")),
        1 => Just(Dependency::queue("audit")),
        1 => Just(Dependency::service("ghost")),
    ]
}

/// Strategy for an operation with latency and business data.
pub fn operation() -> impl Strategy<Value = Operation> {
    ("[A-Z][a-z]{3,8}", prop::bool::ANY).prop_map(|(name, routed)| {
        let op = Operation::new(name.clone())
            .with_latency(LatencyProfile::new(1, 30).with_probability(0.3))
            .with_field(BusinessDataField::new("order_id", FieldKind::String).with_pattern("ord_{hex}"))
            .with_field(BusinessDataField::new("amount", FieldKind::Number).with_range(1.0, 99.0));
        if routed {
            op.with_span_name(format!("POST /{}", name.to_lowercase()))
        } else {
            op
        }
    })
}

/// Strategy for a scenario of up to five services with arbitrary, possibly
/// cyclic, dependencies.
pub fn scenario() -> impl Strategy<Value = ScenarioConfig> {
    (1usize..=5)
        .prop_flat_map(|n| {
            (
                prop::collection::vec(
                    (
                        prop::collection::vec(dependency(n), 0..3),
                        prop::collection::vec(operation(), 0..2),
                    ),
                    n,
                ),
                0.0f64..=1.0,
            )
        })
        .prop_map(|(services, error_rate)| {
            let services = services
                .into_iter()
                .enumerate()
                .map(|(i, (depends_on, operations))| Service {
                    depends_on,
                    operations,
                    ..Service::new(format!("svc-{i}"))
                })
                .collect();
            ScenarioConfig::new(services)
                .with_database("main-db", "postgres")
                .with_database("session-cache", "redis")
                .with_queue("orders", "kafka")
                .with_queue("audit", "rabbitmq")
                .with_telemetry(TelemetryConfig::default().with_error_rate(error_rate))
        })
}
