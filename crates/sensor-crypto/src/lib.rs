//! Canonical encoding, SHA-256 hashing, and pluggable anchor signing.
//!
//! Mirrors the canonicalize-then-hash split used across the forensic
//! firewall's audit trail: records are turned into a stable byte form
//! before they are hashed or signed, so re-serialization always yields
//! the same digest.

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("canonicalization failed: {0}")]
    Canonicalize(#[from] serde_json::Error),
    #[error("record is not a JSON object")]
    NotAnObject,
}

/// Serializes `value` to canonical JSON bytes: sorted object keys
/// (guaranteed by `serde_json::Map`'s `BTreeMap` backing as long as the
/// `preserve_order` feature stays off), UTF-8, no insignificant
/// whitespace.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>, CryptoError> {
    Ok(serde_json::to_vec(value)?)
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// Canonicalizes `value` as a JSON object with the given field removed,
/// then returns its SHA-256 hex digest. Used to compute a record's
/// content hash over everything except the hash field itself.
pub fn hash_excluding_field<T: Serialize>(value: &T, field: &str) -> Result<String, CryptoError> {
    let mut json = serde_json::to_value(value)?;
    let obj = json.as_object_mut().ok_or(CryptoError::NotAnObject)?;
    obj.remove(field);
    let canonical = serde_json::to_vec(&json)?;
    Ok(sha256_hex(&canonical))
}

/// Pluggable signer for Merkle anchors. The default implementation is a
/// local HMAC-SHA256 stub; a real attestation backend can implement
/// this trait without any change to the anchor service.
pub trait AnchorSigner: Send + Sync {
    /// Opaque signer identity recorded alongside the signature.
    fn signer_id(&self) -> &str;

    /// Signs `message` (conventionally `merkle_root || created_at`) and
    /// returns the raw signature bytes.
    fn sign(&self, message: &[u8]) -> Vec<u8>;
}

type HmacSha256 = Hmac<Sha256>;

/// Local HMAC-SHA256 signer. Not a real attestation mechanism; a stand-in
/// until a pluggable backend is wired in.
pub struct HmacSigner {
    id: String,
    key: Vec<u8>,
}

impl HmacSigner {
    pub fn new(id: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        Self { id: id.into(), key: key.into() }
    }
}

impl AnchorSigner for HmacSigner {
    fn signer_id(&self) -> &str {
        &self.id
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_bytes_are_deterministic() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
    }

    #[test]
    fn hash_excludes_named_field() {
        let a = json!({"hash": "whatever", "x": 1});
        let b = json!({"hash": "different", "x": 1});
        assert_eq!(
            hash_excluding_field(&a, "hash").unwrap(),
            hash_excluding_field(&b, "hash").unwrap()
        );
    }

    #[test]
    fn hmac_signer_is_deterministic_and_keyed() {
        let s1 = HmacSigner::new("local", b"key-a".to_vec());
        let s2 = HmacSigner::new("local", b"key-b".to_vec());
        assert_eq!(s1.sign(b"msg"), s1.sign(b"msg"));
        assert_ne!(s1.sign(b"msg"), s2.sign(b"msg"));
    }

    proptest::proptest! {
        #[test]
        fn sha256_hex_is_64_lowercase_hex_chars(data: Vec<u8>) {
            let h = sha256_hex(&data);
            proptest::prop_assert_eq!(h.len(), 64);
            proptest::prop_assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }
}
