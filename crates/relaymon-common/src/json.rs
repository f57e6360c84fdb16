//! Case-insensitive JSON field matching.
//!
//! The configuration file, driver descriptors and module metadata all match
//! object keys without regard to case (`Description`, `description` and
//! `DESCRIPTION` are the same field). Only the top-level keys of the given
//! object are folded, so free-form payloads such as a driver's
//! `Configuration` map keep their keys untouched.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Deserializes `value` into `T`, matching top-level object keys
/// case-insensitively against `T`'s lowercase field names.
pub fn from_value_ci<T: DeserializeOwned>(value: Value) -> serde_json::Result<T> {
    serde_json::from_value(lower_keys(value))
}

/// Parses `raw` as JSON and deserializes it via [`from_value_ci`].
pub fn from_str_ci<T: DeserializeOwned>(raw: &str) -> serde_json::Result<T> {
    from_value_ci(serde_json::from_str(raw)?)
}

fn lower_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key.to_ascii_lowercase(), value))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Sample {
        description: String,
        configuration: Map<String, Value>,
    }

    #[test]
    fn matches_keys_case_insensitively() {
        let parsed: Sample =
            from_str_ci(r#"{"Description": "d", "CONFIGURATION": {}}"#).unwrap();
        assert_eq!(parsed.description, "d");
    }

    #[test]
    fn nested_object_keys_are_preserved() {
        let parsed: Sample =
            from_str_ci(r#"{"Configuration": {"MixedCase": 1, "lower": 2}}"#).unwrap();
        assert!(parsed.configuration.contains_key("MixedCase"));
        assert!(parsed.configuration.contains_key("lower"));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: Sample = from_str_ci("{}").unwrap();
        assert_eq!(parsed.description, "");
        assert!(parsed.configuration.is_empty());
    }
}
