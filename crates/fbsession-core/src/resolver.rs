//! Session resolution
//!
//! Cookie header to credential, credential to session. Resolution itself
//! never performs I/O: access tokens bind immediately, authorization codes
//! are exchanged lazily by the session on its first call.

use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use crate::credential::{Credential, CredentialExtractor};
use crate::crypto::HmacKey;
use crate::metrics;
use crate::session::{GraphContext, Params, PendingCredential, Session};
use crate::signed_request::{SignatureVerifier, VerifiedPayload};
use crate::token_cache::{is_token_valid, now_unix_seconds, TokenCache, NEVER_EXPIRES};
use crate::transport::{HttpMethod, TransportClient};
use crate::{AuthError, GraphConfig};

/// Resolves sessions for one application.
///
/// Holds the token cache for the process; create one resolver at startup
/// and share it.
pub struct SessionResolver {
    ctx: Arc<GraphContext>,
    extractor: CredentialExtractor,
    verifier: SignatureVerifier,
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver")
            .field("config", &self.ctx.config)
            .field("extractor", &self.extractor)
            .finish_non_exhaustive()
    }
}

impl SessionResolver {
    /// Create a resolver with a fresh token cache sized from `config`.
    pub fn new(
        config: GraphConfig,
        transport: Arc<dyn TransportClient>,
    ) -> Result<Self, AuthError> {
        let cache = Arc::new(TokenCache::new(config.token_cache_capacity));
        Self::with_cache(config, transport, cache)
    }

    /// Create a resolver sharing an existing token cache.
    pub fn with_cache(
        config: GraphConfig,
        transport: Arc<dyn TransportClient>,
        cache: Arc<TokenCache>,
    ) -> Result<Self, AuthError> {
        if config.app_id.is_empty() {
            return Err(AuthError::Configuration("app id must not be empty".to_string()));
        }
        let key = HmacKey::new(config.secret_bytes())
            .map_err(|e| AuthError::Configuration(e.to_string()))?;

        Ok(Self {
            ctx: Arc::new(GraphContext::new(config, transport, cache)),
            extractor: CredentialExtractor::default(),
            verifier: SignatureVerifier::from_key(key),
        })
    }

    /// Replace the cookie matchers.
    pub fn with_extractor(mut self, extractor: CredentialExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &GraphConfig {
        &self.ctx.config
    }

    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.ctx.cache
    }

    /// Resolve a session from a raw `Cookie` header.
    #[instrument(skip_all)]
    pub fn resolve_request(&self, cookie_header: Option<&str>) -> Result<Session, AuthError> {
        let result = self
            .extractor
            .try_extract(cookie_header, &self.ctx.config.app_id)
            .and_then(|credential| self.resolve_credential(credential));
        metrics::record_resolution(&result.as_ref().map(|_| ()));
        result
    }

    /// [`SessionResolver::resolve_request`] with every failure collapsed to
    /// `None`.
    pub fn resolve_optional(&self, cookie_header: Option<&str>) -> Option<Session> {
        match self.resolve_request(cookie_header) {
            Ok(session) => Some(session),
            Err(err) => {
                tracing::debug!(error_code = err.error_code(), error = %err, "no session");
                None
            }
        }
    }

    /// Resolve a session from an explicitly supplied credential.
    pub fn resolve(&self, credential: Credential) -> Result<Session, AuthError> {
        let result = self.resolve_credential(credential);
        metrics::record_resolution(&result.as_ref().map(|_| ()));
        result
    }

    /// Session bound to a known token.
    pub fn resolve_from_access_token(
        &self,
        token: impl Into<String>,
        expires_at: i64,
        user_id: Option<String>,
    ) -> Result<Session, AuthError> {
        self.resolve(Credential::AccessToken {
            token: token.into(),
            expires_at,
            user_id,
        })
    }

    /// Session that will exchange `code` on first use.
    pub fn resolve_from_code(
        &self,
        code: impl Into<String>,
        redirect_uri: impl Into<String>,
        user_id: Option<String>,
    ) -> Session {
        Session::unbound(
            self.ctx.clone(),
            user_id,
            PendingCredential::Code {
                code: code.into(),
                redirect_uri: redirect_uri.into(),
            },
        )
    }

    /// Session signing legacy REST calls with `session_key`.
    pub fn resolve_from_session_key(&self, session_key: impl Into<String>) -> Session {
        Session::unbound(
            self.ctx.clone(),
            None,
            PendingCredential::SessionKey(session_key.into()),
        )
    }

    /// Graph call made without a token, sent to the plain graph host.
    #[instrument(skip(self, params))]
    pub async fn graph_call(
        &self,
        path: &str,
        params: &Params,
        method: HttpMethod,
    ) -> Result<Value, AuthError> {
        self.ctx.graph_request(path, params, method, None).await
    }

    fn resolve_credential(&self, credential: Credential) -> Result<Session, AuthError> {
        match credential {
            Credential::None => Err(AuthError::NoCredential),
            Credential::AccessToken {
                token,
                expires_at,
                user_id,
            } => {
                // The fbs_ blob is unsigned: its uid is a claim, not an identity.
                let session = self.bind_token(token, expires_at, user_id, false)?;
                Ok(session.without_cache_write_back())
            }
            Credential::SessionKey(key) => Ok(self.resolve_from_session_key(key)),
            Credential::OAuthCode(code) => {
                Ok(self.resolve_from_code(code, self.ctx.config.redirect_uri.clone(), None))
            }
            Credential::SignedRequest { signature, payload } => {
                let verified = self.verifier.verify(&signature, &payload)?;
                self.resolve_verified(verified)
            }
        }
    }

    fn resolve_verified(&self, payload: VerifiedPayload) -> Result<Session, AuthError> {
        let now = now_unix_seconds();

        if let Some(user_id) = &payload.user_id {
            if let Some(cached) = self.ctx.cache.lookup_valid(user_id, now) {
                tracing::debug!(user_id = %user_id, "reusing cached token");
                return Ok(Session::bound(
                    self.ctx.clone(),
                    payload.user_id.clone(),
                    cached.token,
                    cached.expires_at,
                ));
            }
        }

        if let Some(token) = payload.access_token {
            let expires_at = match payload.expires {
                None | Some(0) => NEVER_EXPIRES,
                Some(expires) => expires,
            };
            return self.bind_token(token, expires_at, payload.user_id, true);
        }

        match payload.oauth_code {
            Some(code) => Ok(self.resolve_from_code(
                code,
                self.ctx.config.redirect_uri.clone(),
                payload.user_id,
            )),
            None => Err(AuthError::MissingFields("code")),
        }
    }

    /// Bind a token. Only tokens whose user id was verified may be
    /// written back to the cache.
    fn bind_token(
        &self,
        token: String,
        expires_at: i64,
        user_id: Option<String>,
        write_back: bool,
    ) -> Result<Session, AuthError> {
        if !is_token_valid(expires_at, now_unix_seconds()) {
            tracing::debug!(user_id = ?user_id, expires_at, "rejecting expired token");
            return Err(AuthError::TokenExpired);
        }
        if write_back {
            if let Some(user_id) = &user_id {
                self.ctx.cache.insert(user_id, &token, expires_at);
            }
        }
        Ok(Session::bound(self.ctx.clone(), user_id, token, expires_at))
    }
}
