//! Axum extractors for graph sessions.
//!
//! Resolution only parses and verifies the cookie; a code carried by a
//! signed request is exchanged the first time the handler uses the session.
//!
//! # Usage
//!
//! ```ignore
//! use fbsession_axum::{MaybeSession, RequireSession};
//!
//! // 401 with a JSON error body when no valid credential is present
//! async fn profile(RequireSession(session): RequireSession) -> String {
//!     session.me().await.map(|me| me.to_string()).unwrap_or_default()
//! }
//!
//! async fn landing(MaybeSession(session): MaybeSession) -> &'static str {
//!     if session.is_some() { "welcome back" } else { "hello, guest" }
//! }
//! ```

use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use fbsession_core::{Session, SessionResolver};

use crate::error::SessionRejection;

/// Joined `Cookie` header values. HTTP/2 clients may split cookies across
/// several header lines.
fn cookie_header(parts: &Parts) -> Option<String> {
    let values: Vec<&str> = parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join("; "))
    }
}

/// Extractor that requires a session.
///
/// Rejects with the resolver's error (401 for missing or invalid
/// credentials) when no session can be built.
#[derive(Debug)]
pub struct RequireSession(pub Session);

impl Deref for RequireSession {
    type Target = Session;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequireSession
where
    Arc<SessionResolver>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = SessionRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let resolver = Arc::<SessionResolver>::from_ref(state);
        let header = cookie_header(parts);
        let session = resolver.resolve_request(header.as_deref())?;
        Ok(Self(session))
    }
}

/// Extractor for an optional session.
///
/// Any resolution failure yields `None`.
#[derive(Debug)]
pub struct MaybeSession(pub Option<Session>);

impl Deref for MaybeSession {
    type Target = Option<Session>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeSession
where
    Arc<SessionResolver>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let resolver = Arc::<SessionResolver>::from_ref(state);
        let header = cookie_header(parts);
        Ok(Self(resolver.resolve_optional(header.as_deref())))
    }
}
