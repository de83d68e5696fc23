//! reqwest implementation of [`TransportClient`]

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use fbsession_core::{
    HttpMethod, ParsedBody, ResponseFormat, TransportClient, TransportError, TransportRequest,
};
use reqwest::header::CONTENT_TYPE;
use tracing::instrument;

use crate::config::HttpTransportConfig;
use crate::metrics::{RequestTimer, Status};
use crate::ClientError;

/// Graph transport over a pooled `reqwest::Client`.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    /// Build a transport with its own connection pool.
    pub fn new(config: HttpTransportConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent())
            .pool_idle_timeout(config.pool_idle_timeout())
            .build()?;
        Ok(Self { client, config })
    }

    /// Use an existing client, e.g. one shared with the rest of the host.
    pub fn with_client(client: reqwest::Client, config: HttpTransportConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn effective_timeout(&self, request: &TransportRequest) -> Duration {
        if request.timeout.is_zero() {
            self.config.request_timeout()
        } else {
            request.timeout
        }
    }
}

#[async_trait]
impl TransportClient for HttpTransport {
    #[instrument(
        skip(self, request),
        fields(host = %request.host, path = %request.path_only(), method = %request.method)
    )]
    async fn request(&self, request: TransportRequest) -> Result<ParsedBody, TransportError> {
        let timeout = self.effective_timeout(&request);
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, request.url()).timeout(timeout);
        if let Some(body) = request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body);
        }

        let timer = RequestTimer::start(request.method.as_str());
        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                let err = map_reqwest_error(err, timeout);
                timer.finish(status_for(&err));
                tracing::warn!(error = %err, "graph request failed");
                return Err(err);
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                let err = map_reqwest_error(err, timeout);
                timer.finish(status_for(&err));
                return Err(err);
            }
        };

        let parsed = parse_body(&text, request.format);
        let elapsed = timer.finish(if parsed.is_ok() {
            Status::Success
        } else {
            Status::Error
        });
        tracing::debug!(status = status.as_u16(), ?elapsed, "graph response received");
        parsed
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

fn status_for(err: &TransportError) -> Status {
    match err {
        TransportError::Timeout(_) => Status::Timeout,
        _ => Status::Error,
    }
}

/// Parse a body in the requested format. Graph error bodies arrive with
/// non-2xx statuses and are still returned as documents.
fn parse_body(text: &str, format: ResponseFormat) -> Result<ParsedBody, TransportError> {
    match format {
        ResponseFormat::Json => serde_json::from_str(text)
            .map(ParsedBody::Json)
            .map_err(|e| TransportError::Decode(e.to_string())),
        // The token endpoint answers with JSON on newer API versions.
        ResponseFormat::Query if text.trim_start().starts_with('{') => serde_json::from_str(text)
            .map(ParsedBody::Json)
            .map_err(|e| TransportError::Decode(e.to_string())),
        ResponseFormat::Query => Ok(ParsedBody::Form(
            url::form_urlencoded::parse(text.trim().as_bytes())
                .into_owned()
                .collect::<HashMap<_, _>>(),
        )),
    }
}
