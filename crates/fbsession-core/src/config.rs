//! Configuration for graph sessions

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::token_cache::DEFAULT_TOKEN_CACHE_CAPACITY;

/// Application credentials and graph endpoints.
#[derive(Clone)]
pub struct GraphConfig {
    /// Application id, also the suffix of the `fbs_`/`fbsr_` cookie names
    pub app_id: String,
    /// Shared secret: HMAC key for signed requests, MD5 salt for legacy calls
    pub app_secret: SecretString,
    /// Host for graph calls made without a token
    pub graph_host: String,
    pub graph_port: u16,
    /// Host for graph calls made with a token, and for the token endpoint
    pub graph_secure_host: String,
    pub graph_secure_port: u16,
    /// Legacy REST endpoint
    pub rest_host: String,
    pub rest_port: u16,
    pub rest_path: String,
    /// Deadline for one code exchange
    pub exchange_timeout: Duration,
    /// Deadline for one graph call
    pub request_timeout: Duration,
    pub token_cache_capacity: usize,
    /// Redirect URI sent with codes taken from signed requests
    pub redirect_uri: String,
}

impl GraphConfig {
    /// Create a config with production endpoints and default timeouts.
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: SecretString::new(app_secret.into().into_boxed_str()),
            graph_host: "graph.facebook.com".to_string(),
            graph_port: 80,
            graph_secure_host: "graph.facebook.com".to_string(),
            graph_secure_port: 443,
            rest_host: "api.facebook.com".to_string(),
            rest_port: 443,
            rest_path: "/method/".to_string(),
            exchange_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            token_cache_capacity: DEFAULT_TOKEN_CACHE_CAPACITY,
            redirect_uri: String::new(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_id = lookup("FB_APP_ID")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("FB_APP_ID"))?;
        let app_secret = lookup("FB_APP_SECRET")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("FB_APP_SECRET"))?;

        let mut config = Self::new(app_id, app_secret);

        if let Some(host) = lookup("FB_GRAPH_HOST") {
            config.graph_host = host;
        }
        if let Some(port) = lookup("FB_GRAPH_PORT") {
            config.graph_port = parse(&port, "FB_GRAPH_PORT")?;
        }
        if let Some(host) = lookup("FB_GRAPH_SECURE_HOST") {
            config.graph_secure_host = host;
        }
        if let Some(port) = lookup("FB_GRAPH_SECURE_PORT") {
            config.graph_secure_port = parse(&port, "FB_GRAPH_SECURE_PORT")?;
        }
        if let Some(host) = lookup("FB_REST_HOST") {
            config.rest_host = host;
        }
        if let Some(port) = lookup("FB_REST_PORT") {
            config.rest_port = parse(&port, "FB_REST_PORT")?;
        }
        if let Some(path) = lookup("FB_REST_PATH") {
            config.rest_path = path;
        }
        if let Some(ms) = lookup("FB_EXCHANGE_TIMEOUT_MS") {
            config.exchange_timeout =
                Duration::from_millis(parse(&ms, "FB_EXCHANGE_TIMEOUT_MS")?);
        }
        if let Some(ms) = lookup("FB_REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(parse(&ms, "FB_REQUEST_TIMEOUT_MS")?);
        }
        if let Some(capacity) = lookup("FB_TOKEN_CACHE_CAPACITY") {
            let capacity: usize = parse(&capacity, "FB_TOKEN_CACHE_CAPACITY")?;
            if capacity == 0 {
                return Err(ConfigError::Invalid("FB_TOKEN_CACHE_CAPACITY"));
            }
            config.token_cache_capacity = capacity;
        }
        if let Some(uri) = lookup("FB_REDIRECT_URI") {
            config.redirect_uri = uri;
        }

        Ok(config)
    }

    /// Shared secret bytes.
    pub fn secret_bytes(&self) -> &[u8] {
        self.app_secret.expose_secret().as_bytes()
    }

    /// Set plain graph host and port
    pub fn with_graph_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.graph_host = host.into();
        self.graph_port = port;
        self
    }

    /// Set secure graph host and port
    pub fn with_graph_secure_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.graph_secure_host = host.into();
        self.graph_secure_port = port;
        self
    }

    /// Set legacy REST host, port and path
    pub fn with_rest_endpoint(
        mut self,
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
    ) -> Self {
        self.rest_host = host.into();
        self.rest_port = port;
        self.rest_path = path.into();
        self
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_token_cache_capacity(mut self, capacity: usize) -> Self {
        self.token_cache_capacity = capacity;
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }
}

impl fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("graph_host", &self.graph_host)
            .field("graph_port", &self.graph_port)
            .field("graph_secure_host", &self.graph_secure_host)
            .field("graph_secure_port", &self.graph_secure_port)
            .field("rest_host", &self.rest_host)
            .field("rest_port", &self.rest_port)
            .field("rest_path", &self.rest_path)
            .field("exchange_timeout", &self.exchange_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("token_cache_capacity", &self.token_cache_capacity)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

fn parse<T: std::str::FromStr>(value: &str, name: &'static str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid(name))
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
