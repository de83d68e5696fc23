//! Session resolution metrics.
//!
//! Prometheus-compatible counters and histograms for the token cache, the
//! code exchange and session resolution.
//!
//! # Metrics
//!
//! - `fbsession_token_cache_lookups_total` - Counter of cache lookups by result
//! - `fbsession_token_cache_evictions_total` - Counter of FIFO evictions
//! - `fbsession_token_exchanges_total` - Counter of code exchanges by outcome
//! - `fbsession_token_exchange_duration_seconds` - Histogram of exchange latencies
//! - `fbsession_resolutions_total` - Counter of session resolutions by outcome
//!
//! Nothing is recorded unless the host installs a `metrics` recorder.
//!
//! ```ignore
//! use metrics_exporter_prometheus::PrometheusBuilder;
//!
//! PrometheusBuilder::new().install().unwrap();
//! fbsession_core::metrics::describe_metrics();
//! ```

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

use crate::AuthError;

/// Metric name for token cache lookups.
pub const TOKEN_CACHE_LOOKUPS_TOTAL: &str = "fbsession_token_cache_lookups_total";

/// Metric name for token cache evictions.
pub const TOKEN_CACHE_EVICTIONS_TOTAL: &str = "fbsession_token_cache_evictions_total";

/// Metric name for code exchanges.
pub const TOKEN_EXCHANGES_TOTAL: &str = "fbsession_token_exchanges_total";

/// Metric name for the code exchange duration histogram.
pub const TOKEN_EXCHANGE_DURATION_SECONDS: &str = "fbsession_token_exchange_duration_seconds";

/// Metric name for session resolutions.
pub const RESOLUTIONS_TOTAL: &str = "fbsession_resolutions_total";

/// Result of a cache lookup, for metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    Hit,
    Miss,
    Expired,
}

impl CacheLookup {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Expired => "expired",
        }
    }
}

/// Outcome of a code exchange, for metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Success,
    Timeout,
    NetworkError,
    InvalidResponse,
    Cancelled,
}

impl ExchangeOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::NetworkError => "network_error",
            Self::InvalidResponse => "invalid_response",
            Self::Cancelled => "cancelled",
        }
    }
}

pub fn record_cache_lookup(result: CacheLookup) {
    counter!(TOKEN_CACHE_LOOKUPS_TOTAL, "result" => result.as_str()).increment(1);
}

pub fn record_cache_eviction() {
    counter!(TOKEN_CACHE_EVICTIONS_TOTAL).increment(1);
}

/// Record a finished code exchange.
pub fn record_exchange(outcome: ExchangeOutcome, duration_seconds: f64) {
    counter!(TOKEN_EXCHANGES_TOTAL, "outcome" => outcome.as_str()).increment(1);
    histogram!(TOKEN_EXCHANGE_DURATION_SECONDS, "outcome" => outcome.as_str())
        .record(duration_seconds);
}

/// Record a resolution result, labelled `session` or the error code.
pub fn record_resolution(result: &Result<(), &AuthError>) {
    let outcome = match result {
        Ok(()) => "session",
        Err(err) => err.error_code(),
    };
    counter!(RESOLUTIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// Timer guard for a code exchange.
///
/// Records the exchange as cancelled if dropped before an outcome is set,
/// which happens when the caller abandons the exchange future.
#[must_use]
pub struct ExchangeTimer {
    start: Instant,
    recorded: bool,
}

impl ExchangeTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            recorded: false,
        }
    }

    /// Record `outcome` and return the elapsed time.
    pub fn finish(mut self, outcome: ExchangeOutcome) -> Duration {
        let duration = self.start.elapsed();
        record_exchange(outcome, duration.as_secs_f64());
        self.recorded = true;
        duration
    }
}

impl Drop for ExchangeTimer {
    fn drop(&mut self) {
        if !self.recorded {
            record_exchange(
                ExchangeOutcome::Cancelled,
                self.start.elapsed().as_secs_f64(),
            );
        }
    }
}

/// Describe all metrics for registration with a recorder.
///
/// Call this during application startup to register metric descriptions.
pub fn describe_metrics() {
    use metrics::{describe_counter, describe_histogram, Unit};

    describe_counter!(
        TOKEN_CACHE_LOOKUPS_TOTAL,
        Unit::Count,
        "Token cache lookups by result (hit, miss, expired)"
    );

    describe_counter!(
        TOKEN_CACHE_EVICTIONS_TOTAL,
        Unit::Count,
        "Entries evicted from the token cache in insertion order"
    );

    describe_counter!(
        TOKEN_EXCHANGES_TOTAL,
        Unit::Count,
        "Authorization code exchanges by outcome"
    );

    describe_histogram!(
        TOKEN_EXCHANGE_DURATION_SECONDS,
        Unit::Seconds,
        "Duration of authorization code exchanges in seconds"
    );

    describe_counter!(
        RESOLUTIONS_TOTAL,
        Unit::Count,
        "Session resolutions by outcome"
    );
}
