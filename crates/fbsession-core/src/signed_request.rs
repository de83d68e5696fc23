//! Signed request verification
//!
//! A signed request is `base64url(signature).base64url(payload)` where the
//! signature is HMAC-SHA256 over the payload segment exactly as received,
//! keyed with the application secret.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};

use crate::crypto::{constant_time_eq, decode_base64url, HmacKey, HmacKeyError};
use crate::AuthError;

/// The only algorithm signed requests may declare (compared case-insensitively).
pub const SIGNED_REQUEST_ALGORITHM: &str = "HMAC-SHA256";

/// Fields decoded from a verified signed request.
///
/// Historical payload formats differ in which fields they carry, so everything
/// except `algorithm` and `issued_at` is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayload {
    pub algorithm: String,
    pub user_id: Option<String>,
    pub oauth_code: Option<String>,
    pub access_token: Option<String>,
    /// Token expiry, epoch seconds
    pub expires: Option<i64>,
    /// Issue time, epoch seconds
    pub issued_at: i64,
}

/// Verifies signed requests against the shared application secret.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: HmacKey,
}

impl SignatureVerifier {
    /// Create a verifier for the given application secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, HmacKeyError> {
        Ok(Self {
            key: HmacKey::new(secret)?,
        })
    }

    /// Create a verifier from an already validated key.
    pub fn from_key(key: HmacKey) -> Self {
        Self { key }
    }

    /// Verify `signature_segment` over `payload_segment` and decode the payload.
    ///
    /// Payload checks run first, so a structurally broken payload reports
    /// `MalformedPayload`, `UnsupportedAlgorithm` or `MissingFields` rather
    /// than `InvalidSignature`.
    pub fn verify(
        &self,
        signature_segment: &str,
        payload_segment: &str,
    ) -> Result<VerifiedPayload, AuthError> {
        let object = decode_payload_object(payload_segment)?;

        let algorithm = object
            .get("algorithm")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::UnsupportedAlgorithm("<missing>".to_string()))?;
        if !algorithm.eq_ignore_ascii_case(SIGNED_REQUEST_ALGORITHM) {
            tracing::debug!(algorithm, "signed request declares unsupported algorithm");
            return Err(AuthError::UnsupportedAlgorithm(algorithm.to_string()));
        }

        let oauth_code = string_field(&object, &["code", "oauth_code", "oauthCode"]);
        let access_token =
            string_field(&object, &["oauth_token", "access_token", "accessToken"]);
        if oauth_code.is_none() && access_token.is_none() {
            return Err(AuthError::MissingFields("code"));
        }
        let issued_at = integer_field(&object, &["issued_at", "issuedAt"])
            .ok_or(AuthError::MissingFields("issued_at"))?;

        let provided = decode_base64url(signature_segment).map_err(|_| {
            tracing::debug!("signed request signature is not valid base64");
            AuthError::InvalidSignature
        })?;
        let expected = self.key.sign(payload_segment.as_bytes());
        if !constant_time_eq(&expected, &provided) {
            tracing::debug!("signed request signature mismatch");
            return Err(AuthError::InvalidSignature);
        }

        Ok(VerifiedPayload {
            algorithm: algorithm.to_string(),
            user_id: string_field(&object, &["user_id", "userId"]),
            oauth_code,
            access_token,
            expires: integer_field(&object, &["expires"]),
            issued_at,
        })
    }

    /// Produce `base64url(signature).base64url(payload)` for a JSON payload.
    pub fn sign(&self, payload_json: &str) -> String {
        sign_signed_request(payload_json, &self.key)
    }
}

/// Sign a JSON payload in the signed request format, without padding.
pub fn sign_signed_request(payload_json: &str, key: &HmacKey) -> String {
    let payload_segment = URL_SAFE_NO_PAD.encode(payload_json.as_bytes());
    let signature = key.sign(payload_segment.as_bytes());
    format!("{}.{payload_segment}", URL_SAFE_NO_PAD.encode(signature))
}

fn decode_payload_object(payload_segment: &str) -> Result<Map<String, Value>, AuthError> {
    let bytes = decode_base64url(payload_segment).map_err(|_| AuthError::MalformedPayload)?;
    let text = String::from_utf8(bytes).map_err(|_| AuthError::MalformedPayload)?;
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) | Err(_) => Err(AuthError::MalformedPayload),
    }
}

fn first_present<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| object.get(*name))
        .find(|value| !value.is_null())
}

/// Ids arrive as strings in some formats and as numbers in others.
fn string_field(object: &Map<String, Value>, names: &[&str]) -> Option<String> {
    match first_present(object, names)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn integer_field(object: &Map<String, Value>, names: &[&str]) -> Option<i64> {
    match first_present(object, names)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(SECRET).unwrap()
    }

    fn split(signed: &str) -> (&str, &str) {
        signed.split_once('.').unwrap()
    }

    #[test]
    fn test_roundtrip_with_code() {
        let v = verifier();
        let signed = v.sign(r#"{"algorithm":"HMAC-SHA256","code":"XYZ","issuedAt":1}"#);
        let (sig, payload) = split(&signed);

        let verified = v.verify(sig, payload).unwrap();
        assert_eq!(verified.oauth_code.as_deref(), Some("XYZ"));
        assert_eq!(verified.issued_at, 1);
        assert_eq!(verified.user_id, None);
        assert_eq!(verified.access_token, None);
    }

    #[test]
    fn test_roundtrip_with_token_and_numeric_user_id() {
        let v = verifier();
        let payload = json!({
            "algorithm": "HMAC-SHA256",
            "oauth_token": "tok",
            "expires": 1_900_000_000,
            "issued_at": 1_800_000_000,
            "user_id": 4242,
        });
        let signed = v.sign(&payload.to_string());
        let (sig, body) = split(&signed);

        let verified = v.verify(sig, body).unwrap();
        assert_eq!(verified.access_token.as_deref(), Some("tok"));
        assert_eq!(verified.user_id.as_deref(), Some("4242"));
        assert_eq!(verified.expires, Some(1_900_000_000));
    }

    #[test]
    fn test_algorithm_is_case_insensitive() {
        let v = verifier();
        let signed = v.sign(r#"{"algorithm":"hmac-sha256","code":"c","issued_at":1}"#);
        let (sig, payload) = split(&signed);
        assert_eq!(v.verify(sig, payload).unwrap().algorithm, "hmac-sha256");
    }

    #[test]
    fn test_sha1_is_rejected() {
        let v = verifier();
        let signed = v.sign(r#"{"algorithm":"HMAC-SHA1","code":"c","issued_at":1}"#);
        let (sig, payload) = split(&signed);
        assert_eq!(
            v.verify(sig, payload),
            Err(AuthError::UnsupportedAlgorithm("HMAC-SHA1".to_string()))
        );
    }

    #[test]
    fn test_missing_algorithm_is_unsupported() {
        let v = verifier();
        let signed = v.sign(r#"{"code":"c","issued_at":1}"#);
        let (sig, payload) = split(&signed);
        assert!(matches!(
            v.verify(sig, payload),
            Err(AuthError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_missing_fields() {
        let v = verifier();

        let signed = v.sign(r#"{"algorithm":"HMAC-SHA256","issued_at":1}"#);
        let (sig, payload) = split(&signed);
        assert_eq!(v.verify(sig, payload), Err(AuthError::MissingFields("code")));

        let signed = v.sign(r#"{"algorithm":"HMAC-SHA256","code":"c"}"#);
        let (sig, payload) = split(&signed);
        assert_eq!(
            v.verify(sig, payload),
            Err(AuthError::MissingFields("issued_at"))
        );
    }

    #[test]
    fn test_malformed_payload() {
        let v = verifier();
        assert_eq!(v.verify("sig", "!!!"), Err(AuthError::MalformedPayload));

        let not_json = URL_SAFE_NO_PAD.encode(b"not json");
        assert_eq!(v.verify("sig", &not_json), Err(AuthError::MalformedPayload));

        let array = URL_SAFE_NO_PAD.encode(b"[1,2]");
        assert_eq!(v.verify("sig", &array), Err(AuthError::MalformedPayload));

        let invalid_utf8 = URL_SAFE_NO_PAD.encode([0xff, 0xfe, 0xfd]);
        assert_eq!(
            v.verify("sig", &invalid_utf8),
            Err(AuthError::MalformedPayload)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = SignatureVerifier::new("secret-one").unwrap();
        let signed = signer.sign(r#"{"algorithm":"HMAC-SHA256","code":"c","issued_at":1}"#);
        let (sig, payload) = split(&signed);

        let other = SignatureVerifier::new("secret-two").unwrap();
        assert_eq!(other.verify(sig, payload), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_signature_from_other_payload_rejected() {
        let v = verifier();
        let honest = v.sign(r#"{"algorithm":"HMAC-SHA256","code":"mine","issued_at":1}"#);
        let (sig, _) = split(&honest);

        let forged = URL_SAFE_NO_PAD
            .encode(br#"{"algorithm":"HMAC-SHA256","code":"theirs","issued_at":1}"#);
        assert_eq!(v.verify(sig, &forged), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_non_base64_signature_is_invalid_signature() {
        let v = verifier();
        let signed = v.sign(r#"{"algorithm":"HMAC-SHA256","code":"c","issued_at":1}"#);
        let (_, payload) = split(&signed);
        assert_eq!(v.verify("@@@@", payload), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_padded_segments_accepted() {
        let v = verifier();
        let signed = v.sign(r#"{"algorithm":"HMAC-SHA256","code":"c","issued_at":1}"#);
        let (sig, payload) = split(&signed);
        // Signature covers the payload segment as sent, so only the signature
        // segment may gain padding without invalidating it.
        let padded_sig = format!("{sig}=");
        assert!(v.verify(&padded_sig, payload).is_ok());
    }
}
