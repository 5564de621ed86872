//! Canonical serialization for deterministic hashing.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: struct fields serialize in declaration order
//! - Stable Vec order: vectors serialize in index order
//! - No HashMap allowed: hashed data is sorted before it gets here

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// xxh64 of the canonical bytes of a value.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<u64, serde_json::Error> {
    Ok(xxh64(&to_canonical_bytes(value)?, 0))
}

/// [`canonical_hash`] as a 16-digit lowercase hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(format!("{:016x}", canonical_hash(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Member {
        field: &'static str,
        members: Vec<u32>,
    }

    #[test]
    fn test_determinism() {
        let value = Member { field: "comments", members: vec![3, 1, 2] };

        assert_eq!(canonical_hash(&value).unwrap(), canonical_hash(&value).unwrap());
        let hex = canonical_hash_hex(&value).unwrap();
        assert_eq!(hex.len(), 16);
    }

    #[test]
    fn test_order_matters() {
        let a = Member { field: "comments", members: vec![1, 2] };
        let b = Member { field: "comments", members: vec![2, 1] };

        assert_ne!(canonical_hash(&a).unwrap(), canonical_hash(&b).unwrap());
    }
}
