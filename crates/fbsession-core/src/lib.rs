//! fbsession core - session resolution for graph-backed web applications
//!
//! Classifies cookie credentials, verifies signed requests, exchanges
//! authorization codes under a deadline, caches issued tokens per user and
//! hands out [`Session`]s that make authenticated graph calls through an
//! injected [`TransportClient`].

pub mod config;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod exchange;
pub mod metrics;
pub mod resolver;
pub mod session;
pub mod signed_request;
pub mod token_cache;
pub mod transport;

pub use config::{ConfigError, GraphConfig};
pub use credential::{extract, Credential, CredentialExtractor, CredentialMatcher};
pub use error::*;
pub use exchange::{TokenExchanger, TokenGrant};
pub use resolver::SessionResolver;
pub use session::{Params, PendingCredential, Session, SessionStatus};
pub use signed_request::{sign_signed_request, SignatureVerifier, VerifiedPayload};
pub use token_cache::{CachedTokenEntry, TokenCache, NEVER_EXPIRES};
pub use transport::{HttpMethod, ParsedBody, ResponseFormat, TransportClient, TransportRequest};
