//! Encoding adapter: typed values to and from stored bytes.
//!
//! Values are serialized with bincode through serde, so anything a serde
//! derive covers round-trips: maps, nested structs, vectors, optional and
//! boxed fields. Decode reconstructs the original field values exactly;
//! byte-identity of a re-encode is not part of the contract. Malformed or
//! truncated bytes surface as [`StoreError::Decode`], never as a silently
//! defaulted value.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// Serialize a value for storage.
pub fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Encode(e.to_string()))
}

/// Reconstruct a value from stored bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Inner {
        label: String,
        weight: Option<f64>,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Outer {
        id: u64,
        attrs: HashMap<String, String>,
        children: Vec<Box<Inner>>,
        maybe: Option<Inner>,
    }

    fn sample() -> Outer {
        let mut attrs = HashMap::new();
        attrs.insert("color".to_string(), "teal".to_string());
        attrs.insert("shape".to_string(), "round".to_string());
        Outer {
            id: 42,
            attrs,
            children: vec![
                Box::new(Inner {
                    label: "first".to_string(),
                    weight: Some(1.5),
                }),
                Box::new(Inner {
                    label: "second".to_string(),
                    weight: None,
                }),
            ],
            maybe: None,
        }
    }

    #[test]
    fn roundtrip_nested_struct() {
        let value = sample();
        let bytes = encode(&value).unwrap();
        let decoded: Outer = decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn roundtrip_map() {
        let mut map = HashMap::new();
        map.insert("harry".to_string(), 100_i64);
        map.insert("emma".to_string(), 101_i64);
        let bytes = encode(&map).unwrap();
        let decoded: HashMap<String, i64> = decode(&bytes).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn roundtrip_vec_of_optionals() {
        let value = vec![Some("a".to_string()), None, Some("c".to_string())];
        let bytes = encode(&value).unwrap();
        let decoded: Vec<Option<String>> = decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn truncated_bytes_fail_to_decode() {
        let bytes = encode(&sample()).unwrap();
        let result: StoreResult<Outer> = decode(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(StoreError::Decode(_))));
    }

    #[test]
    fn zero_sized_type_encodes_to_nothing() {
        // The facade relies on this to reject "no value" puts.
        assert!(encode(&()).unwrap().is_empty());
    }
}
