//! HTTP transport configuration

use std::time::Duration;

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("fbsession/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    connect_timeout: Duration,
    request_timeout: Duration,
    user_agent: String,
    pool_idle_timeout: Option<Duration>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pool_idle_timeout: Some(Duration::from_secs(90)),
        }
    }
}

impl HttpTransportConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> HttpTransportConfigBuilder {
        HttpTransportConfigBuilder::default()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Deadline used when a request does not carry its own.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn pool_idle_timeout(&self) -> Option<Duration> {
        self.pool_idle_timeout
    }
}

/// Builder for [`HttpTransportConfig`].
#[derive(Debug, Default)]
pub struct HttpTransportConfigBuilder {
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    user_agent: Option<String>,
    pool_idle_timeout: Option<Option<Duration>>,
}

impl HttpTransportConfigBuilder {
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Idle pooled connections are closed after `timeout`; `None` keeps them.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<HttpTransportConfig, ConfigError> {
        let defaults = HttpTransportConfig::default();

        let connect_timeout = self.connect_timeout.unwrap_or(defaults.connect_timeout);
        if connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("connect_timeout"));
        }
        let request_timeout = self.request_timeout.unwrap_or(defaults.request_timeout);
        if request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("request_timeout"));
        }
        let user_agent = self.user_agent.unwrap_or(defaults.user_agent);
        if user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyUserAgent);
        }

        Ok(HttpTransportConfig {
            connect_timeout,
            request_timeout,
            user_agent,
            pool_idle_timeout: self.pool_idle_timeout.unwrap_or(defaults.pool_idle_timeout),
        })
    }
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    InvalidTimeout(&'static str),

    #[error("user agent must not be empty")]
    EmptyUserAgent,
}
