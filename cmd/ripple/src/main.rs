//! Ripple CLI - synthetic distributed-system telemetry.
//!
//! Commands:
//! - `ripple validate` - Check a scenario and summarize its graph
//! - `ripple trace` - Generate one trace and print its OTLP payload
//! - `ripple run` - Stream telemetry for a scenario to a collector

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use ripple_orchestrator::Limits;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "ripple")]
#[command(about = "Synthetic traces, logs and metrics for observability demos")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a scenario file
    Validate {
        /// Path to the scenario (YAML or JSON)
        scenario: String,
    },

    /// Generate a single trace
    Trace {
        /// Path to the scenario (YAML or JSON)
        scenario: String,

        /// Seed for reproducible output
        #[arg(short, long)]
        seed: Option<u64>,

        /// Force the error source to this service
        #[arg(long)]
        error_source: Option<String>,

        /// Include the derived log payload
        #[arg(long)]
        logs: bool,

        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,

        /// Write the payload to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run a scenario against an OTLP/HTTP collector
    Run(RunArgs),
}

/// Arguments of `ripple run`.
#[derive(Args)]
pub struct RunArgs {
    /// Path to the scenario (YAML or JSON)
    pub scenario: String,

    /// Collector base URL
    #[arg(short, long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", default_value = "http://localhost:4318")]
    pub endpoint: String,

    /// Collector API key
    #[arg(long, env = "RIPPLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Authorization scheme sent before the API key
    #[arg(long, default_value = "ApiKey")]
    pub auth_type: String,

    /// Job owner counted against the per-user limit
    #[arg(long, default_value = ripple_orchestrator::DEFAULT_OWNER)]
    pub owner: String,

    /// Job description
    #[arg(short, long, default_value = "")]
    pub description: String,

    /// Requested run time in hours, capped by the maximum job duration
    #[arg(long)]
    pub duration_hours: Option<u64>,

    #[command(flatten)]
    pub limits: LimitArgs,
}

/// Process limits, read from the environment.
#[derive(Args)]
pub struct LimitArgs {
    /// Maximum running jobs
    #[arg(long, env = "MAX_ACTIVE_JOBS", default_value_t = 50)]
    pub max_active_jobs: usize,

    /// Maximum running jobs per owner
    #[arg(long, env = "MAX_JOBS_PER_USER", default_value_t = 3)]
    pub max_jobs_per_user: usize,

    /// Maximum job duration in hours
    #[arg(long, env = "MAX_JOB_DURATION_HOURS", default_value_t = 24)]
    pub max_job_duration_hours: u64,

    /// Retention of stopped jobs in hours
    #[arg(long, env = "JOB_CLEANUP_HOURS", default_value_t = 24)]
    pub job_cleanup_hours: u64,

    /// Minutes between cleanup sweeps
    #[arg(long, env = "CLEANUP_INTERVAL_MINUTES", default_value_t = 15)]
    pub cleanup_interval_minutes: u64,
}

impl LimitArgs {
    /// Converts the arguments into orchestrator limits.
    pub fn to_limits(&self) -> Limits {
        Limits::default()
            .with_max_active_jobs(self.max_active_jobs)
            .with_max_jobs_per_user(self.max_jobs_per_user)
            .with_max_job_hours(self.max_job_duration_hours)
            .with_retention_hours(self.job_cleanup_hours)
            .with_cleanup_minutes(self.cleanup_interval_minutes.max(1))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG overrides the default level.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Commands::Validate { scenario } => commands::validate::run(&scenario),
        Commands::Trace {
            scenario,
            seed,
            error_source,
            logs,
            pretty,
            output,
        } => commands::trace::run(
            &scenario,
            seed,
            error_source.as_deref(),
            logs,
            pretty,
            output.as_deref(),
        ),
        Commands::Run(args) => commands::run::run(&args).await,
    }
}
