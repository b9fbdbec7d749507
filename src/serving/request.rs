/// Lenient decoding of prediction request bodies.
///
/// Field values never fail a request: numbers pass through, numeric
/// strings are parsed, booleans become 1/0, and anything else (missing,
/// null, arrays, unparsable text, non-finite) becomes 0. Only a body that
/// is not a JSON object is rejected.

use crate::analysis::features::finite_or_zero;
use crate::model::FeatureInput;
use serde_json::{Map, Value};

/// Request field names, in the order the client sends them.
pub const REQUEST_FIELDS: [&str; 8] = [
    "mucNuocA",
    "mucNuocB",
    "luuLuong",
    "is_raining_now",
    "b_rate_of_change",
    "flow_rate_of_change",
    "ab_diff",
    "b_absolute_change",
];

/// Best-effort numeric value of a JSON field.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().map(finite_or_zero).unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(finite_or_zero).unwrap_or(0.0),
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Looks a field up by its wire name, falling back to the lowercase
/// column spelling (`mucnuoca`) used by the sensor table.
fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object
        .get(name)
        .or_else(|| object.get(&name.to_ascii_lowercase()))
}

/// Decodes one sample; `None` when `body` is not an object.
pub fn parse_input(body: &Value) -> Option<FeatureInput> {
    let object = body.as_object()?;
    let get = |name: &str| coerce_number(field(object, name));

    Some(FeatureInput {
        mucnuoca: get("mucNuocA"),
        mucnuocb: get("mucNuocB"),
        luuluong: get("luuLuong"),
        is_raining_now: get("is_raining_now"),
        b_rate_of_change: get("b_rate_of_change"),
        flow_rate_of_change: get("flow_rate_of_change"),
        ab_diff: get("ab_diff"),
        b_absolute_change: get("b_absolute_change"),
    })
}

/// Fields of `body` that were absent or not coercible as given.
pub fn defaulted_fields(body: &Value) -> Vec<&'static str> {
    let Some(object) = body.as_object() else {
        return REQUEST_FIELDS.to_vec();
    };
    REQUEST_FIELDS
        .iter()
        .copied()
        .filter(|name| match field(object, name) {
            Some(Value::Number(n)) => n.as_f64().is_none_or(|v| !v.is_finite()),
            Some(Value::String(s)) => s.trim().parse::<f64>().map_or(true, |v| !v.is_finite()),
            Some(Value::Bool(_)) => false,
            _ => true,
        })
        .collect()
}
