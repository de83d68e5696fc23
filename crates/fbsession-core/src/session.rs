//! Token-bound graph sessions
//!
//! A [`Session`] is either bound to an access token or still holding the
//! credential it will bind from. Every call goes through one dispatch
//! function that branches on that state. The state sits behind an async
//! mutex that stays locked while a code is exchanged, so concurrent callers
//! on one session share a single exchange and all observe its outcome.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, OnceCell};
use tracing::instrument;

use crate::crypto::legacy_signature;
use crate::exchange::TokenExchanger;
use crate::token_cache::{is_token_valid, now_unix_seconds, TokenCache};
use crate::transport::{HttpMethod, ResponseFormat, TransportClient, TransportRequest};
use crate::{AuthError, GraphConfig, TransportError};

/// Call parameters. String values are sent as-is, anything else JSON-encoded.
pub type Params = Map<String, Value>;

/// Version sent with legacy signed REST calls.
const LEGACY_API_VERSION: &str = "1.0";

/// Credential an unbound session will authenticate with.
#[derive(Clone, PartialEq, Eq)]
pub enum PendingCredential {
    /// Authorization code, exchanged for a token on first use.
    Code { code: String, redirect_uri: String },
    /// Legacy session key, used to sign REST calls directly.
    SessionKey(String),
}

impl std::fmt::Debug for PendingCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code { redirect_uri, .. } => f
                .debug_struct("Code")
                .field("redirect_uri", redirect_uri)
                .finish_non_exhaustive(),
            Self::SessionKey(_) => f.write_str("SessionKey(..)"),
        }
    }
}

/// Observable state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unbound,
    Bound,
    /// Binding failed; the session will not retry.
    Failed,
}

enum SessionState {
    Unbound(PendingCredential),
    Bound { token: String, expires_at: i64 },
    Failed,
}

enum Authorization {
    Token(String),
    SessionKey(String),
}

/// Dependencies shared by every session a resolver creates.
pub(crate) struct GraphContext {
    pub(crate) config: GraphConfig,
    pub(crate) transport: Arc<dyn TransportClient>,
    pub(crate) exchanger: TokenExchanger,
    pub(crate) cache: Arc<TokenCache>,
    call_id: AtomicU64,
}

impl GraphContext {
    pub(crate) fn new(
        config: GraphConfig,
        transport: Arc<dyn TransportClient>,
        cache: Arc<TokenCache>,
    ) -> Self {
        let exchanger = TokenExchanger::new(transport.clone(), &config);
        let seed = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        Self {
            config,
            transport,
            exchanger,
            cache,
            call_id: AtomicU64::new(seed),
        }
    }

    fn next_call_id(&self) -> u64 {
        self.call_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Graph call routed by whether a token is attached: with a token to the
    /// secure host over HTTPS, without one to the plain host.
    pub(crate) async fn graph_request(
        &self,
        path: &str,
        params: &Params,
        method: HttpMethod,
        token: Option<&str>,
    ) -> Result<Value, AuthError> {
        let config = &self.config;

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        if let Some(token) = token {
            query.append_pair("access_token", token);
        }
        for (key, value) in params.iter().filter(|(key, _)| *key != "access_token") {
            query.append_pair(key, &param_value(value));
        }
        let encoded = query.finish();

        let (host, port, secure) = match token {
            Some(_) => (&config.graph_secure_host, config.graph_secure_port, true),
            None => (&config.graph_host, config.graph_port, false),
        };
        let (path, body) = match method {
            HttpMethod::Post => (path.to_string(), Some(encoded)),
            _ if encoded.is_empty() => (path.to_string(), None),
            _ => (format!("{path}?{encoded}"), None),
        };

        self.send(TransportRequest {
            host: host.clone(),
            port,
            path,
            secure,
            method,
            body,
            timeout: config.request_timeout,
            format: ResponseFormat::Json,
        })
        .await
    }

    pub(crate) async fn send(&self, request: TransportRequest) -> Result<Value, AuthError> {
        let route = request.path_only().to_string();
        let timeout = request.timeout;

        let response = tokio::time::timeout(timeout, self.transport.request(request))
            .await
            .unwrap_or(Err(TransportError::Timeout(timeout)));

        match response {
            Ok(body) => body.into_json().ok_or_else(|| {
                TransportError::Decode("expected a JSON document".to_string()).into()
            }),
            Err(err) => {
                tracing::warn!(route = %route, error = %err, "graph request failed");
                Err(err.into())
            }
        }
    }
}

/// A resolved session able to make authenticated graph calls.
pub struct Session {
    ctx: Arc<GraphContext>,
    user_id: Option<String>,
    state: Mutex<SessionState>,
    identity: OnceCell<String>,
    /// Whether tokens bound later may be cached under `user_id`.
    write_back: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn bound(
        ctx: Arc<GraphContext>,
        user_id: Option<String>,
        token: String,
        expires_at: i64,
    ) -> Self {
        Self::with_state(ctx, user_id, SessionState::Bound { token, expires_at })
    }

    pub(crate) fn unbound(
        ctx: Arc<GraphContext>,
        user_id: Option<String>,
        pending: PendingCredential,
    ) -> Self {
        Self::with_state(ctx, user_id, SessionState::Unbound(pending))
    }

    fn with_state(ctx: Arc<GraphContext>, user_id: Option<String>, state: SessionState) -> Self {
        Self {
            ctx,
            user_id,
            state: Mutex::new(state),
            identity: OnceCell::new(),
            write_back: true,
        }
    }

    /// Never write tokens bound by this session to the shared cache. For
    /// sessions whose user id came from an unsigned credential.
    pub(crate) fn without_cache_write_back(mut self) -> Self {
        self.write_back = false;
        self
    }

    /// User id known at resolution time, if the credential carried one.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub async fn status(&self) -> SessionStatus {
        match &*self.state.lock().await {
            SessionState::Unbound(_) => SessionStatus::Unbound,
            SessionState::Bound { .. } => SessionStatus::Bound,
            SessionState::Failed => SessionStatus::Failed,
        }
    }

    /// Bound token and its expiry, expired or not.
    pub async fn access_token(&self) -> Option<(String, i64)> {
        match &*self.state.lock().await {
            SessionState::Bound { token, expires_at } => Some((token.clone(), *expires_at)),
            _ => None,
        }
    }

    /// Graph call. Unbound sessions bind first; session-key sessions are
    /// routed to the legacy signed REST endpoint with `path` as the method.
    #[instrument(skip(self, params), fields(user_id = ?self.user_id))]
    pub async fn api_call(
        &self,
        path: &str,
        params: &Params,
        method: HttpMethod,
    ) -> Result<Value, AuthError> {
        match self.authorize().await? {
            Authorization::Token(token) => {
                self.ctx.graph_request(path, params, method, Some(&token)).await
            }
            Authorization::SessionKey(key) => {
                self.legacy_rest_request(path.trim_start_matches('/'), params, &key)
                    .await
            }
        }
    }

    /// `GET` graph call.
    pub async fn graph_get(&self, path: &str, params: &Params) -> Result<Value, AuthError> {
        self.api_call(path, params, HttpMethod::Get).await
    }

    /// Call a REST method, authenticated by token or by signed session key.
    #[instrument(skip(self, params), fields(user_id = ?self.user_id))]
    pub async fn rest_call(&self, method: &str, params: &Params) -> Result<Value, AuthError> {
        match self.authorize().await? {
            Authorization::Token(token) => self.token_rest_request(method, params, &token).await,
            Authorization::SessionKey(key) => self.legacy_rest_request(method, params, &key).await,
        }
    }

    /// The caller's `/me` document.
    pub async fn me(&self) -> Result<Value, AuthError> {
        let token = self.require_token().await?;
        self.ctx.graph_request("/me", &Params::new(), HttpMethod::Get, Some(&token))
            .await
    }

    /// Probe the graph with `/me`. Error-shaped bodies are `Unauthenticated`;
    /// transport and binding failures keep their own kind.
    pub async fn validate(&self) -> Result<(), AuthError> {
        let me = self.me().await?;
        if is_error_document(&me) {
            tracing::debug!(user_id = ?self.user_id, "graph rejected session token");
            return Err(AuthError::Unauthenticated);
        }
        Ok(())
    }

    /// [`Session::validate`] collapsed to a bool.
    pub async fn is_valid(&self) -> bool {
        self.validate().await.is_ok()
    }

    /// Graph id of the session's user. Cached after the first success.
    pub async fn get_identity(&self) -> Result<String, AuthError> {
        self.identity
            .get_or_try_init(|| self.fetch_identity())
            .await
            .cloned()
    }

    async fn fetch_identity(&self) -> Result<String, AuthError> {
        let me = self.me().await?;
        if is_error_document(&me) {
            return Err(AuthError::Unauthenticated);
        }
        match me.get("id") {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(TransportError::Decode("identity document has no id".to_string()).into()),
        }
    }

    /// Bind to a token obtained out of band, replacing any current state.
    pub async fn inject_access_token(&self, token: impl Into<String>, expires_at: i64) {
        let mut state = self.state.lock().await;
        self.bind(&mut state, token.into(), expires_at);
    }

    /// Exchange `code` now and bind to the resulting token. On failure the
    /// session keeps its current state and the specific error is returned.
    pub async fn retrieve_access_token(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        let grant = self
            .ctx
            .exchanger
            .exchange(code, redirect_uri, self.ctx.config.exchange_timeout)
            .await?;
        let expires_at = grant.expires_at(now_unix_seconds());
        self.bind(&mut state, grant.access_token, expires_at);
        Ok(())
    }

    async fn authorize(&self) -> Result<Authorization, AuthError> {
        let mut state = self.state.lock().await;
        let (code, redirect_uri) = match &*state {
            SessionState::Bound { token, expires_at } => {
                return if is_token_valid(*expires_at, now_unix_seconds()) {
                    Ok(Authorization::Token(token.clone()))
                } else {
                    Err(AuthError::TokenExpired)
                };
            }
            SessionState::Failed => return Err(AuthError::Unauthenticated),
            SessionState::Unbound(PendingCredential::SessionKey(key)) => {
                return Ok(Authorization::SessionKey(key.clone()));
            }
            SessionState::Unbound(PendingCredential::Code { code, redirect_uri }) => {
                (code.clone(), redirect_uri.clone())
            }
        };

        let exchanged = self
            .ctx
            .exchanger
            .exchange(&code, &redirect_uri, self.ctx.config.exchange_timeout)
            .await;
        match exchanged {
            Ok(grant) => {
                let expires_at = grant.expires_at(now_unix_seconds());
                let token = grant.access_token;
                self.bind(&mut state, token.clone(), expires_at);
                Ok(Authorization::Token(token))
            }
            Err(err) => {
                tracing::warn!(
                    user_id = ?self.user_id,
                    error_code = err.error_code(),
                    "session could not be bound"
                );
                *state = SessionState::Failed;
                Err(AuthError::Unauthenticated)
            }
        }
    }

    async fn require_token(&self) -> Result<String, AuthError> {
        match self.authorize().await? {
            Authorization::Token(token) => Ok(token),
            Authorization::SessionKey(_) => Err(AuthError::Unauthenticated),
        }
    }

    fn bind(&self, state: &mut SessionState, token: String, expires_at: i64) {
        if let Some(user_id) = self.user_id.as_deref().filter(|_| self.write_back) {
            self.ctx.cache.insert(user_id, &token, expires_at);
        }
        *state = SessionState::Bound { token, expires_at };
        tracing::debug!(user_id = ?self.user_id, expires_at, "session bound");
    }

    async fn token_rest_request(
        &self,
        method: &str,
        params: &Params,
        token: &str,
    ) -> Result<Value, AuthError> {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in params
            .iter()
            .filter(|(key, _)| *key != "access_token" && *key != "format")
        {
            query.append_pair(key, &param_value(value));
        }
        query.append_pair("access_token", token);
        query.append_pair("format", "json-strings");

        self.ctx.send(self.rest_request(method, query.finish())).await
    }

    async fn legacy_rest_request(
        &self,
        method: &str,
        params: &Params,
        session_key: &str,
    ) -> Result<Value, AuthError> {
        let config = &self.ctx.config;

        let mut signed: BTreeMap<String, String> = params
            .iter()
            .map(|(key, value)| (key.clone(), param_value(value)))
            .collect();
        signed.insert("method".to_string(), method.to_string());
        signed.insert("api_key".to_string(), config.app_id.clone());
        signed.insert("session_key".to_string(), session_key.to_string());
        signed.insert("call_id".to_string(), self.ctx.next_call_id().to_string());
        signed.insert("v".to_string(), LEGACY_API_VERSION.to_string());
        signed.insert("format".to_string(), "json".to_string());
        signed.remove("sig");
        let sig = legacy_signature(&signed, config.secret_bytes());

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &signed {
            query.append_pair(key, value);
        }
        query.append_pair("sig", &sig);

        self.ctx.send(self.rest_request(method, query.finish())).await
    }

    fn rest_request(&self, method: &str, query: String) -> TransportRequest {
        let config = &self.ctx.config;
        TransportRequest {
            host: config.rest_host.clone(),
            port: config.rest_port,
            path: format!("{}{}?{}", config.rest_path, method, query),
            secure: true,
            method: HttpMethod::Get,
            body: None,
            timeout: config.request_timeout,
            format: ResponseFormat::Json,
        }
    }

}

fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_error_document(value: &Value) -> bool {
    value.get("error").is_some_and(|error| !error.is_null())
}
