//! fbsession Axum Integration
//!
//! Extractors that resolve a graph [`Session`](fbsession_core::Session) from
//! the request's `Cookie` header.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use axum::{Router, routing::get};
//! use fbsession_axum::RequireSession;
//!
//! async fn whoami(RequireSession(session): RequireSession) -> String {
//!     session.get_identity().await.unwrap_or_default()
//! }
//!
//! let app = Router::new()
//!     .route("/whoami", get(whoami))
//!     .with_state(Arc::new(resolver));
//! ```
//!
//! # Extractors
//!
//! - [`RequireSession`] - Requires a credential (401 if missing or invalid)
//! - [`MaybeSession`] - Optional session (None if missing or invalid)
//!
//! Both read the resolver from state through `FromRef`, so any app state
//! holding an `Arc<SessionResolver>` works.

pub mod error;
pub mod extractors;

pub use error::SessionRejection;
pub use extractors::{MaybeSession, RequireSession};
