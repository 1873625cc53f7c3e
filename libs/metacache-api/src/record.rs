use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::IngestError;

/// Identity field every record must carry.
pub const USERNAME_FIELD: &str = "username";

/// Latest known metadata of one user.
///
/// Schema-less apart from `username`: `fields` keeps the whole decoded
/// object (username included) and serializes back exactly as received.
/// Immutable once built; the store shares it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    username: String,
    fields: Map<String, Value>,
}

impl MetadataRecord {
    /// Decode a raw log payload.
    pub fn decode(payload: &[u8]) -> Result<Self, IngestError> {
        let value: Value = serde_json::from_slice(payload)?;
        Self::from_value(value)
    }

    /// Build a record from an already parsed value tree.
    ///
    /// Non-objects are decode errors; a missing, non-string or empty
    /// `username` is a schema error.
    pub fn from_value(value: Value) -> Result<Self, IngestError> {
        let fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(IngestError::Decode(format!(
                    "expected JSON object, got {}",
                    type_name(&other)
                )));
            }
        };

        let username = match fields.get(USERNAME_FIELD) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::String(_)) => {
                return Err(IngestError::Schema(format!("'{USERNAME_FIELD}' is empty")));
            }
            Some(other) => {
                return Err(IngestError::Schema(format!(
                    "'{USERNAME_FIELD}' must be a string, got {}",
                    type_name(other)
                )));
            }
            None => {
                return Err(IngestError::Schema(format!("missing '{USERNAME_FIELD}' field")));
            }
        };

        Ok(Self { username, fields })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

impl Serialize for MetadataRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_object_with_username() {
        let record = MetadataRecord::decode(br#"{"username":"alice","age":30}"#).unwrap();
        assert_eq!(record.username(), "alice");
        assert_eq!(record.get("age"), Some(&json!(30)));
    }

    #[test]
    fn keeps_nested_values_untouched() {
        let value = json!({
            "username": "bob",
            "prefs": {"theme": "dark", "langs": ["en", "de"]},
            "active": true,
            "nickname": null
        });
        let record = MetadataRecord::from_value(value.clone()).unwrap();
        assert_eq!(serde_json::to_value(&record).unwrap(), value);
    }

    #[test]
    fn malformed_payload_is_decode_error() {
        let err = MetadataRecord::decode(b"{\"username\": ").unwrap_err();
        assert!(matches!(err, IngestError::Decode(_)));
    }

    #[test]
    fn non_object_is_decode_error() {
        let err = MetadataRecord::decode(br#"["username","alice"]"#).unwrap_err();
        assert!(matches!(err, IngestError::Decode(_)));
    }

    #[test]
    fn missing_username_is_schema_error() {
        let err = MetadataRecord::decode(br#"{"age":30}"#).unwrap_err();
        assert!(matches!(err, IngestError::Schema(_)));
    }

    #[test]
    fn non_string_username_is_schema_error() {
        let err = MetadataRecord::decode(br#"{"username":42}"#).unwrap_err();
        assert!(matches!(err, IngestError::Schema(_)));
    }

    #[test]
    fn empty_username_is_schema_error() {
        let err = MetadataRecord::decode(br#"{"username":""}"#).unwrap_err();
        assert!(matches!(err, IngestError::Schema(_)));
    }
}
