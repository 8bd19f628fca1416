//! Compact binary codec for clustering-key sets and discovery chunks
//!
//! The ledger stores each partition's clustering keys as one encoded set
//! value; the discovery cache stores buffered partition-key batches as
//! encoded lists. Both use bincode for compact storage. A malformed
//! payload is unrecoverable and surfaces as a decode error; callers never
//! retry it.

use crate::error::CodecError;
use std::collections::BTreeSet;

/// Encode a clustering-key set
pub fn encode_key_set(keys: &BTreeSet<String>) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(keys).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a clustering-key set
pub fn decode_key_set(bytes: &[u8]) -> Result<BTreeSet<String>, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Encode a partition-key batch for a discovery chunk
pub fn encode_key_list(keys: &[String]) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(keys).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a partition-key batch from a discovery chunk
pub fn decode_key_list(bytes: &[u8]) -> Result<Vec<String>, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_set_round_trip() {
        let mut keys = BTreeSet::new();
        keys.insert("2024-01-01T00:00:00".to_string());
        keys.insert("2024-01-02T00:00:00".to_string());
        keys.insert("2024-01-03T00:00:00".to_string());

        let bytes = encode_key_set(&keys).unwrap();
        let decoded = decode_key_set(&bytes).unwrap();
        assert_eq!(keys, decoded);
    }

    #[test]
    fn test_empty_key_set_round_trip() {
        let keys = BTreeSet::new();
        let decoded = decode_key_set(&encode_key_set(&keys).unwrap()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_key_set_preserves_unicode_and_pipes() {
        let mut keys = BTreeSet::new();
        keys.insert("sensor-\u{00fc}ber|42".to_string());
        keys.insert("".to_string());

        let decoded = decode_key_set(&encode_key_set(&keys).unwrap()).unwrap();
        assert_eq!(keys, decoded);
    }

    #[test]
    fn test_key_list_round_trip_keeps_order() {
        let keys = vec![
            "pk-3".to_string(),
            "pk-1".to_string(),
            "pk-2".to_string(),
        ];
        let decoded = decode_key_list(&encode_key_list(&keys).unwrap()).unwrap();
        assert_eq!(keys, decoded);
    }

    #[test]
    fn test_malformed_payload_is_a_decode_error() {
        let garbage = vec![0xff, 0xfe, 0x01];
        assert!(matches!(
            decode_key_set(&garbage),
            Err(CodecError::Decode(_))
        ));
        assert!(matches!(
            decode_key_list(&garbage),
            Err(CodecError::Decode(_))
        ));
    }
}
