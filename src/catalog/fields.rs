//! Field lookup helpers shared by the enrichment stages.
//!
//! Raw payloads arrive with keys such as `Categoria`/`Opciones` while the
//! normalized form uses `categoria`/`opciones`. Lookups try the exact key
//! first and then fall back to comparing normalized keys, which keeps identity
//! assignment and key normalization commutative in their output.

use crate::catalog::normalize::normalize_key;
use serde_json::{Map, Value};

/// Resolve the key in `record` that names `field`.
pub fn resolve_key<'a>(record: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    if let Some((key, _)) = record.get_key_value(field) {
        return Some(key.as_str());
    }
    let wanted = normalize_key(field);
    record
        .keys()
        .find(|key| normalize_key(key) == wanted)
        .map(String::as_str)
}

pub fn field<'a>(record: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    let key = resolve_key(record, name)?;
    record.get(key)
}

pub fn field_mut<'a>(record: &'a mut Map<String, Value>, name: &str) -> Option<&'a mut Value> {
    let key = resolve_key(record, name)?.to_string();
    record.get_mut(&key)
}

/// True when a value would read as "absent": null, empty text, zero, false,
/// or an empty container.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.is_empty(),
        Some(Value::Bool(flag)) => !flag,
        Some(Value::Number(number)) => number.as_f64() == Some(0.0),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
    }
}

/// Text form of a scalar used as an identity seed or lookup key.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Upper-case the first character and lower-case the rest (`"TOPPINGS"` -> `"Toppings"`).
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
