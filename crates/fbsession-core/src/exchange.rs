//! Authorization code exchange
//!
//! One request to `/oauth/access_token` on the secure graph host, raced
//! against a deadline. Exactly one outcome is reported per exchange: the
//! transport future is owned by the timeout and dropped when the deadline
//! fires, so a response arriving afterwards has nowhere to complete.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::instrument;

use crate::metrics::{ExchangeOutcome, ExchangeTimer};
use crate::token_cache::NEVER_EXPIRES;
use crate::transport::{HttpMethod, ParsedBody, ResponseFormat, TransportClient, TransportRequest};
use crate::{AuthError, GraphConfig, TransportError};

/// Path of the token endpoint.
pub const TOKEN_ENDPOINT_PATH: &str = "/oauth/access_token";

/// Token issued in exchange for a code.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds; `None` when the endpoint sent no expiry.
    pub expires_in: Option<i64>,
}

impl TokenGrant {
    /// Absolute expiry relative to `now`. Grants without a lifetime, or with a
    /// lifetime of zero, never expire.
    pub fn expires_at(&self, now: i64) -> i64 {
        match self.expires_in {
            Some(secs) if secs > 0 => now.saturating_add(secs),
            _ => NEVER_EXPIRES,
        }
    }
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Trades authorization codes for access tokens.
#[derive(Clone)]
pub struct TokenExchanger {
    transport: Arc<dyn TransportClient>,
    client_id: String,
    client_secret: SecretString,
    host: String,
    port: u16,
}

impl std::fmt::Debug for TokenExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchanger")
            .field("client_id", &self.client_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl TokenExchanger {
    pub fn new(transport: Arc<dyn TransportClient>, config: &GraphConfig) -> Self {
        Self {
            transport,
            client_id: config.app_id.clone(),
            client_secret: config.app_secret.clone(),
            host: config.graph_secure_host.clone(),
            port: config.graph_secure_port,
        }
    }

    /// Exchange `code` for a token, failing with `ExchangeTimeout` if no
    /// outcome is available within `timeout`.
    #[instrument(skip(self, code, redirect_uri), fields(host = %self.host))]
    pub async fn exchange(
        &self,
        code: &str,
        redirect_uri: &str,
        timeout: Duration,
    ) -> Result<TokenGrant, AuthError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", self.client_secret.expose_secret())
            .append_pair("code", code)
            .append_pair("redirect_uri", redirect_uri)
            .finish();

        let request = TransportRequest {
            host: self.host.clone(),
            port: self.port,
            path: format!("{TOKEN_ENDPOINT_PATH}?{query}"),
            secure: true,
            method: HttpMethod::Get,
            body: None,
            timeout,
            format: ResponseFormat::Query,
        };

        let timer = ExchangeTimer::start();
        let outcome = tokio::time::timeout(timeout, self.transport.request(request)).await;

        let result = match outcome {
            Err(_elapsed) => Err(AuthError::ExchangeTimeout(timeout)),
            Ok(Err(TransportError::Timeout(after))) => Err(AuthError::ExchangeTimeout(after)),
            Ok(Err(TransportError::Network(message))) => {
                Err(AuthError::ExchangeNetworkError(message))
            }
            Ok(Err(TransportError::Decode(message))) => {
                Err(AuthError::ExchangeInvalidResponse(message))
            }
            Ok(Ok(body)) => parse_grant(body),
        };

        let elapsed = timer.finish(outcome_label(&result));
        match &result {
            Ok(grant) => {
                tracing::debug!(?elapsed, expires_in = ?grant.expires_in, "code exchanged");
            }
            Err(err) => tracing::warn!(
                ?elapsed,
                error_code = err.error_code(),
                error = %err,
                "code exchange failed"
            ),
        }
        result
    }
}

fn outcome_label(result: &Result<TokenGrant, AuthError>) -> ExchangeOutcome {
    match result {
        Ok(_) => ExchangeOutcome::Success,
        Err(AuthError::ExchangeTimeout(_)) => ExchangeOutcome::Timeout,
        Err(AuthError::ExchangeNetworkError(_)) => ExchangeOutcome::NetworkError,
        Err(_) => ExchangeOutcome::InvalidResponse,
    }
}

/// Accept both the flat `access_token=..&expires=..` form and a JSON body.
fn parse_grant(body: ParsedBody) -> Result<TokenGrant, AuthError> {
    let (token, expires, error) = match &body {
        ParsedBody::Form(map) => (
            map.get("access_token").cloned(),
            map.get("expires")
                .or_else(|| map.get("expires_in"))
                .map(|v| v.trim().parse::<i64>().ok()),
            map.get("error").cloned(),
        ),
        ParsedBody::Json(value) => (
            value
                .get("access_token")
                .and_then(Value::as_str)
                .map(str::to_string),
            value
                .get("expires")
                .or_else(|| value.get("expires_in"))
                .map(json_integer),
            value.get("error").map(error_message),
        ),
    };

    if let Some(error) = error {
        return Err(AuthError::ExchangeInvalidResponse(error));
    }
    let access_token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::ExchangeInvalidResponse("missing access_token".to_string()))?;
    let expires_in = match expires {
        None => None,
        Some(Some(secs)) => Some(secs),
        Some(None) => {
            return Err(AuthError::ExchangeInvalidResponse(
                "expires is not an integer".to_string(),
            ))
        }
    };

    Ok(TokenGrant {
        access_token,
        expires_in,
    })
}

fn json_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn error_message(value: &Value) -> String {
    value
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| value.as_str())
        .unwrap_or("token endpoint returned an error")
        .to_string()
}
