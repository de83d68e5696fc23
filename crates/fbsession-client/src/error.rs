//! Client errors

use thiserror::Error;

/// Errors raised while constructing an [`HttpTransport`](crate::HttpTransport).
///
/// Failures of individual requests are reported as
/// [`TransportError`](fbsession_core::TransportError).
#[derive(Error, Debug)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The HTTP client could not be built (TLS backend, resolver).
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Build(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    #[test]
    fn test_config_error_conversion() {
        let err: ClientError = ConfigError::EmptyUserAgent.into();
        assert!(matches!(err, ClientError::Config(_)));
        assert_eq!(
            err.to_string(),
            "configuration error: user agent must not be empty"
        );
    }
}
