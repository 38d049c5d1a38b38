//! JSON serializer backed by `serde_json`.

use serde_json::Value;

use super::Serializer;
use crate::error::{DocstoreError, Result};

/// The default serializer: plain `serde_json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Serializes any `serde` value into JSON bytes.
    pub fn to_bytes<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| DocstoreError::Serialization(e.to_string()))
    }

    /// Deserializes JSON bytes into any `serde` type.
    pub fn from_bytes<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| DocstoreError::Serialization(e.to_string()))
    }
}

impl Serializer for JsonSerializer {
    fn deserialize(&self, bytes: &[u8]) -> Result<Value> {
        Self::from_bytes(bytes)
    }

    fn serialize(&self, value: &Value) -> Result<Vec<u8>> {
        Self::to_bytes(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_deserialize_object() {
        let value = JsonSerializer.deserialize(br#"{"name":"kit","age":3}"#).unwrap();
        assert_eq!(value, json!({"name": "kit", "age": 3}));
    }

    #[test]
    fn test_deserialize_invalid_json() {
        let err = JsonSerializer.deserialize(b"{not json").unwrap_err();
        assert!(matches!(err, DocstoreError::Serialization(_)));
    }

    #[test]
    fn test_typed_helpers() {
        let bytes = JsonSerializer::to_bytes(&vec![1, 2, 3]).unwrap();
        assert_eq!(bytes, b"[1,2,3]");
        let back: Vec<i32> = JsonSerializer::from_bytes(&bytes).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
