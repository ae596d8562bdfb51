//! Business data field generation.

use rand::prelude::*;
use ripple_model::{AttributeValue, BusinessDataField, FieldKind};

const DEFAULT_MIN: f64 = 0.0;
const DEFAULT_MAX: f64 = 1000.0;

/// Generates a value for a business data field.
///
/// Returns `None` for enum fields without candidates.
pub fn generate<R: Rng + ?Sized>(field: &BusinessDataField, rng: &mut R) -> Option<AttributeValue> {
    match field.kind {
        FieldKind::String => {
            let pattern = field
                .pattern
                .clone()
                .unwrap_or_else(|| format!("{}_{{random}}", field.name));
            Some(AttributeValue::String(expand_pattern(&pattern, rng)))
        }
        FieldKind::Number => {
            let (min, max) = bounds(field);
            let value = if max > min { rng.gen_range(min..=max) } else { min };
            Some(AttributeValue::Float((value * 100.0).round() / 100.0))
        }
        FieldKind::Integer => {
            let (min, max) = bounds(field);
            let (min, max) = (to_int(min.ceil()), to_int(max.floor()));
            let value = if max > min { rng.gen_range(min..=max) } else { min };
            Some(AttributeValue::Int(value))
        }
        FieldKind::Boolean => Some(AttributeValue::Bool(rng.gen_bool(0.5))),
        FieldKind::Enum => field
            .values
            .choose(rng)
            .map(|v| AttributeValue::String(v.clone())),
    }
}

/// Replaces `{random}`, `{uuid}` and `{hex}` placeholders.
pub fn expand_pattern<R: Rng + ?Sized>(pattern: &str, rng: &mut R) -> String {
    let mut out = pattern.to_string();
    while out.contains("{random}") {
        let n: u32 = rng.gen_range(100_000..1_000_000);
        out = out.replacen("{random}", &n.to_string(), 1);
    }
    while out.contains("{uuid}") {
        let id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        out = out.replacen("{uuid}", &id.to_string(), 1);
    }
    while out.contains("{hex}") {
        let hex = format!("{:08x}", rng.gen::<u32>());
        out = out.replacen("{hex}", &hex, 1);
    }
    out
}

fn bounds(field: &BusinessDataField) -> (f64, f64) {
    let min = field.min_value.unwrap_or(DEFAULT_MIN);
    let max = field.max_value.unwrap_or(DEFAULT_MAX.max(min));
    if min <= max {
        (min, max)
    } else {
        (max, min)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_int(value: f64) -> i64 {
    // `as` saturates at the i64 bounds.
    value as i64
}
