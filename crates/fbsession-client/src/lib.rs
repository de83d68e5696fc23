//! fbsession client - HTTP transport for graph sessions
//!
//! Implements [`fbsession_core::TransportClient`] on top of `reqwest`, so a
//! [`fbsession_core::SessionResolver`] can talk to the real graph endpoints.
//!
//! ```ignore
//! use std::sync::Arc;
//! use fbsession_client::{HttpTransport, HttpTransportConfig};
//! use fbsession_core::{GraphConfig, SessionResolver};
//!
//! let transport = HttpTransport::new(HttpTransportConfig::default())?;
//! let resolver = SessionResolver::new(GraphConfig::from_env()?, Arc::new(transport))?;
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod transport;

pub use config::{ConfigError, HttpTransportConfig, HttpTransportConfigBuilder};
pub use error::ClientError;
pub use transport::HttpTransport;
