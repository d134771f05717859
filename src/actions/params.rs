//! Lenient field decoders for form payloads
//!
//! The web page posts ids as numbers or strings and flags as booleans,
//! `0`/`1` or `"on"`, so request structs go through these.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Truthiness of a submitted flag
pub fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        _ => false,
    }
}

fn value_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(to_bool(&Value::deserialize(deserializer)?))
}

pub fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_i64(&Value::deserialize(deserializer)?))
}

pub fn opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_i64(&Value::deserialize(deserializer)?).and_then(|v| u32::try_from(v).ok()))
}

/// Number-ish text field; empty and null become `None`
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_string(Value::deserialize(deserializer)?))
}

/// One id or a list of ids; blanks are dropped
pub fn id_list<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.iter().filter_map(value_i64).collect(),
        other => value_i64(&other).into_iter().collect(),
    })
}

/// One string or a list of strings
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(value_string).collect(),
        other => value_string(other).into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Form {
        #[serde(default, deserialize_with = "opt_i64")]
        id: Option<i64>,
        #[serde(default, deserialize_with = "flag")]
        checked: bool,
        #[serde(default, deserialize_with = "id_list")]
        ids: Vec<i64>,
        #[serde(default, deserialize_with = "opt_string")]
        name: Option<String>,
    }

    #[test]
    fn test_lenient_fields() {
        let form: Form =
            serde_json::from_value(json!({"id": "12", "checked": "on", "ids": ["1", 2, ""], "name": 5}))
                .unwrap();
        assert_eq!(form.id, Some(12));
        assert!(form.checked);
        assert_eq!(form.ids, vec![1, 2]);
        assert_eq!(form.name.as_deref(), Some("5"));

        let form: Form = serde_json::from_value(json!({"id": "", "checked": 0, "ids": 7})).unwrap();
        assert_eq!(form.id, None);
        assert!(!form.checked);
        assert_eq!(form.ids, vec![7]);
        assert_eq!(form.name, None);
    }
}
