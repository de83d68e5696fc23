//! HTTP transport metrics.
//!
//! # Metrics
//!
//! - `fbsession_http_requests_total` - Counter of requests by method and status
//! - `fbsession_http_request_duration_seconds` - Histogram of request latencies
//!
//! Recorded automatically when a `metrics` recorder is installed.
//!
//! ```ignore
//! use metrics_exporter_prometheus::PrometheusBuilder;
//!
//! PrometheusBuilder::new().install().unwrap();
//! fbsession_client::metrics::describe_metrics();
//! ```

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

/// Metric name for total requests.
pub const REQUESTS_TOTAL: &str = "fbsession_http_requests_total";

/// Metric name for request duration histogram.
pub const REQUEST_DURATION_SECONDS: &str = "fbsession_http_request_duration_seconds";

/// Request status for metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Timeout,
    Cancelled,
}

impl Status {
    /// Get the status as a string for metrics labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Record a request completion.
pub fn record_request(method: &'static str, status: Status, duration_seconds: f64) {
    counter!(
        REQUESTS_TOTAL,
        "method" => method,
        "status" => status.as_str()
    )
    .increment(1);

    histogram!(REQUEST_DURATION_SECONDS, "method" => method).record(duration_seconds);
}

/// Timer guard for automatically recording request duration.
///
/// A timer dropped without an explicit outcome records `cancelled`; that is
/// what happens when the caller's deadline drops the request future.
#[must_use]
pub struct RequestTimer {
    method: &'static str,
    start: Instant,
    recorded: bool,
}

impl RequestTimer {
    /// Start a new request timer.
    pub fn start(method: &'static str) -> Self {
        Self {
            method,
            start: Instant::now(),
            recorded: false,
        }
    }

    /// Record `status` and return the duration.
    pub fn finish(mut self, status: Status) -> Duration {
        let duration = self.start.elapsed();
        record_request(self.method, status, duration.as_secs_f64());
        self.recorded = true;
        duration
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        if !self.recorded {
            record_request(
                self.method,
                Status::Cancelled,
                self.start.elapsed().as_secs_f64(),
            );
        }
    }
}

/// Describe all metrics for registration with a recorder.
pub fn describe_metrics() {
    use metrics::{describe_counter, describe_histogram, Unit};

    describe_counter!(
        REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests made to the graph"
    );

    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Duration of graph HTTP requests in seconds"
    );
}
