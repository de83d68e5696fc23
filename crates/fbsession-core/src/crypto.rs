//! Cryptographic primitives for signed requests and legacy REST calls
//!
//! Signature comparisons here must stay constant-time; the legacy MD5 scheme
//! exists only because the old REST endpoint requires it.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Standard-alphabet engine that accepts input with or without `=` padding.
const STANDARD_INDIFFERENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Shared application secret used as the HMAC-SHA256 key.
#[derive(Clone)]
pub struct HmacKey {
    key_bytes: Arc<[u8]>,
}

impl HmacKey {
    /// Create a new HMAC key from bytes.
    ///
    /// # Errors
    /// Returns error if the key is empty.
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, HmacKeyError> {
        let key_bytes = key.as_ref();
        if key_bytes.is_empty() {
            return Err(HmacKeyError::Empty);
        }
        Ok(Self {
            key_bytes: Arc::from(key_bytes),
        })
    }

    /// Sign data and return the MAC bytes
    pub fn sign(&self, data: &[u8]) -> [u8; 32] {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key_bytes)
            .expect("HMAC-SHA256 accepts keys of any length");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    /// Lowercase hex encoding of [`HmacKey::sign`].
    pub fn sign_hex(&self, data: &[u8]) -> String {
        hex::encode(self.sign(data))
    }

    /// Verify a signature in constant time
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let expected = self.sign(data);
        constant_time_eq(&expected, signature)
    }
}

impl std::fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacKey")
            .field("key_length", &self.key_bytes.len())
            .finish_non_exhaustive()
    }
}

/// Errors that can occur when creating an HMAC key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HmacKeyError {
    #[error("HMAC key must not be empty")]
    Empty,
}

/// Constant-time byte slice comparison.
///
/// Length is not treated as secret: slices of different length compare
/// unequal immediately.
#[inline]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Decode a base64url segment by translating it to the standard alphabet
/// (`-` to `+`, `_` to `/`) first. Padding is optional.
pub fn decode_base64url(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let translated: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    STANDARD_INDIFFERENT.decode(translated)
}

/// Signature for the legacy REST endpoint.
///
/// Parameters are visited in key order and concatenated as `key=value`,
/// the shared secret is appended, and the MD5 digest is returned as hex.
pub fn legacy_signature(params: &BTreeMap<String, String>, secret: &[u8]) -> String {
    let mut hasher = Md5::new();
    for (key, value) in params {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    hasher.update(secret);
    hex::encode(hasher.finalize())
}
