//! Canonical-JSON encoding and SHA-256 hashing shared by the planner and
//! manifest service.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Errors from contract-level operations (serialization, hashing).
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// JSON serialization or deserialization failed.
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Produce a deterministic JSON string for hashing.
///
/// This is not a full JCS implementation, but it is stable for our types:
/// keys are sorted (`serde_json::Map` is a `BTreeMap` under the
/// `preserve_order`-less default) and numbers are serialized consistently by
/// `serde_json`.
///
/// # Errors
///
/// Returns [`ContractError::Json`] if the value cannot be serialized.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, ContractError> {
    let v = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&v)?)
}

/// Compute the hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash any serializable value via [`canonical_json`] then [`sha256_hex`].
///
/// # Errors
///
/// Returns [`ContractError::Json`] if `value` cannot be serialized.
pub fn hash_value<T: Serialize>(value: &T) -> Result<String, ContractError> {
    let json = canonical_json(value)?;
    Ok(sha256_hex(json.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let mut m = BTreeMap::new();
        m.insert("b", 1);
        m.insert("a", 2);
        let s = canonical_json(&m).unwrap();
        assert_eq!(s, r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn hash_value_deterministic() {
        let v = serde_json::json!({"x": 1, "y": [1,2,3]});
        assert_eq!(hash_value(&v).unwrap(), hash_value(&v).unwrap());
    }
}
