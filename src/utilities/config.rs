//! Validating configuration overrides.
//!
//! Overrides arrive as loosely-typed JSON objects. They are merged key by key
//! into the serialized form of a typed configuration; only keys that already
//! exist in that form are accepted, and the merged result must deserialize
//! back into the typed configuration.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::utilities::errors::ConfigError;

/// Apply `overrides` on top of `base`, returning a new typed configuration.
///
/// Nested objects are merged recursively; every other value replaces the
/// base value. Keys absent from `base` are rejected with their dotted path.
/// `Option` fields that are currently `None` serialize as `null` and accept
/// any value; the final deserialization validates its type.
pub fn merge_overrides<T>(base: &T, overrides: &Value) -> Result<T, ConfigError>
where
    T: Serialize + DeserializeOwned,
{
    let overrides = overrides.as_object().ok_or(ConfigError::NotAnObject)?;
    let mut merged = serde_json::to_value(base).map_err(|e| ConfigError::InvalidValue {
        path: String::new(),
        message: e.to_string(),
    })?;

    match merged.as_object_mut() {
        Some(target) => merge_object(target, overrides, "")?,
        None => return Err(ConfigError::NotAnObject),
    }

    serde_json::from_value(merged).map_err(|e| ConfigError::InvalidValue {
        path: first_override_path(overrides),
        message: e.to_string(),
    })
}

fn merge_object(
    target: &mut Map<String, Value>,
    overrides: &Map<String, Value>,
    prefix: &str,
) -> Result<(), ConfigError> {
    for (key, value) in overrides {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        let slot = target
            .get_mut(key)
            .ok_or_else(|| ConfigError::UnknownKey { path: path.clone() })?;

        match (slot.as_object_mut(), value.as_object()) {
            (Some(nested_target), Some(nested_override)) => {
                merge_object(nested_target, nested_override, &path)?;
            }
            (Some(_), None) if !value.is_null() => {
                return Err(ConfigError::InvalidValue {
                    path,
                    message: "expected an object".to_string(),
                });
            }
            _ => *slot = value.clone(),
        }
    }
    Ok(())
}

fn first_override_path(overrides: &Map<String, Value>) -> String {
    overrides.keys().next().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Inner {
        limit: u32,
        enabled: bool,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Outer {
        name: String,
        inner: Inner,
        optional: Option<f64>,
    }

    fn base() -> Outer {
        Outer {
            name: "base".into(),
            inner: Inner {
                limit: 3,
                enabled: true,
            },
            optional: None,
        }
    }

    #[test]
    fn test_deep_merge_keeps_untouched_fields() {
        let merged = merge_overrides(&base(), &json!({"inner": {"limit": 7}})).unwrap();
        assert_eq!(merged.inner.limit, 7);
        assert!(merged.inner.enabled);
        assert_eq!(merged.name, "base");
    }

    #[test]
    fn test_unknown_nested_key_is_rejected() {
        let err = merge_overrides(&base(), &json!({"inner": {"bogus": 1}})).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownKey {
                path: "inner.bogus".into()
            }
        );
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let err = merge_overrides(&base(), &json!({"inner": {"limit": "many"}})).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_scalar_over_object_is_rejected() {
        let err = merge_overrides(&base(), &json!({"inner": 5})).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref path, .. } if path == "inner"));
    }

    #[test]
    fn test_optional_field_accepts_value() {
        let merged = merge_overrides(&base(), &json!({"optional": 0.5})).unwrap();
        assert_eq!(merged.optional, Some(0.5));
    }

    #[test]
    fn test_non_object_override() {
        assert_eq!(
            merge_overrides(&base(), &json!([1, 2])).unwrap_err(),
            ConfigError::NotAnObject
        );
    }
}
