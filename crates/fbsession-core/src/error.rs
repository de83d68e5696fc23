//! Session resolution errors

use std::time::Duration;

use thiserror::Error;

/// Failure reported by a [`TransportClient`](crate::TransportClient).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete within its deadline and was aborted.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, TLS or I/O failure.
    #[error("network error: {0}")]
    Network(String),

    /// The body could not be parsed in the requested format.
    #[error("undecodable response body: {0}")]
    Decode(String),
}

/// Errors produced while resolving or using a session.
///
/// Every resolution failure keeps its specific kind so callers can tell
/// "not logged in" apart from "signature forged" or "network outage".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The request carried no usable credential.
    #[error("no credential present")]
    NoCredential,

    /// A credential cookie was present but could not be parsed.
    #[error("malformed cookie: {0}")]
    MalformedCookie(String),

    /// The signed request payload is not decodable JSON.
    #[error("malformed signed request payload")]
    MalformedPayload,

    /// The signed request declares an algorithm other than HMAC-SHA256.
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signed request signature does not match its payload.
    #[error("invalid signature")]
    InvalidSignature,

    /// The signed request payload lacks a required field.
    #[error("signed request is missing required field: {0}")]
    MissingFields(&'static str),

    /// The access token is past its expiry.
    #[error("access token expired")]
    TokenExpired,

    /// The code exchange did not finish before its deadline.
    #[error("token exchange timed out after {0:?}")]
    ExchangeTimeout(Duration),

    /// The transport failed during the code exchange.
    #[error("token exchange failed: {0}")]
    ExchangeNetworkError(String),

    /// The token endpoint answered without a usable access token.
    #[error("token endpoint returned an invalid response: {0}")]
    ExchangeInvalidResponse(String),

    /// The session could not obtain a token to authenticate the call.
    #[error("session is not authenticated")]
    Unauthenticated,

    /// A bound session's call failed in the transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid setup (empty secret, unusable host).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoCredential
            | Self::MalformedCookie(_)
            | Self::MalformedPayload
            | Self::UnsupportedAlgorithm(_)
            | Self::InvalidSignature
            | Self::MissingFields(_)
            | Self::TokenExpired
            | Self::Unauthenticated => 401,
            Self::ExchangeTimeout(_) => 504,
            Self::ExchangeNetworkError(_)
            | Self::ExchangeInvalidResponse(_)
            | Self::Transport(_) => 502,
            Self::Configuration(_) => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoCredential => "NO_CREDENTIAL",
            Self::MalformedCookie(_) => "MALFORMED_COOKIE",
            Self::MalformedPayload => "MALFORMED_PAYLOAD",
            Self::UnsupportedAlgorithm(_) => "UNSUPPORTED_ALGORITHM",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::MissingFields(_) => "MISSING_FIELDS",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::ExchangeTimeout(_) => "EXCHANGE_TIMEOUT",
            Self::ExchangeNetworkError(_) => "EXCHANGE_NETWORK_ERROR",
            Self::ExchangeInvalidResponse(_) => "EXCHANGE_INVALID_RESPONSE",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// True for failures of the remote side rather than of the credential.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            Self::ExchangeTimeout(_)
                | Self::ExchangeNetworkError(_)
                | Self::ExchangeInvalidResponse(_)
                | Self::Transport(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_failures_map_to_401() {
        assert_eq!(AuthError::NoCredential.status_code(), 401);
        assert_eq!(AuthError::InvalidSignature.status_code(), 401);
        assert_eq!(AuthError::MissingFields("issued_at").status_code(), 401);
        assert_eq!(AuthError::Unauthenticated.status_code(), 401);
    }

    #[test]
    fn test_upstream_failures_are_distinguished() {
        let timeout = AuthError::ExchangeTimeout(Duration::from_millis(50));
        assert_eq!(timeout.status_code(), 504);
        assert!(timeout.is_upstream_failure());

        let transport: AuthError = TransportError::Network("reset".to_string()).into();
        assert_eq!(transport.error_code(), "TRANSPORT_ERROR");
        assert!(transport.is_upstream_failure());

        assert!(!AuthError::InvalidSignature.is_upstream_failure());
    }

    #[test]
    fn test_error_display() {
        let err = AuthError::UnsupportedAlgorithm("HMAC-SHA1".to_string());
        assert_eq!(err.to_string(), "unsupported signature algorithm: HMAC-SHA1");

        let err = AuthError::MissingFields("code");
        assert!(err.to_string().contains("code"));
    }
}
