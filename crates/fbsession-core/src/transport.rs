//! Contract for the HTTP collaborator that performs graph requests
//!
//! The session never talks to the network directly. It builds a
//! [`TransportRequest`] and the injected [`TransportClient`] executes it and
//! returns the body parsed in the format the caller asked for.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::TransportError;

/// HTTP method of a graph call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the response body must be parsed. Chosen by the caller per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Structured JSON document.
    Json,
    /// Flat `k=v&k2=v2` map, as returned by the token endpoint.
    Query,
}

/// A single request for the transport to execute.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub host: String,
    pub port: u16,
    /// Path including any query string.
    pub path: String,
    /// Use HTTPS.
    pub secure: bool,
    pub method: HttpMethod,
    /// Form-encoded body, for `POST`.
    pub body: Option<String>,
    pub timeout: Duration,
    pub format: ResponseFormat,
}

impl TransportRequest {
    /// Full URL of the request, including the query string.
    pub fn url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }

    /// Path without its query string, safe to log.
    pub fn path_only(&self) -> &str {
        self.path.split_once('?').map_or(&self.path, |(path, _)| path)
    }
}

// Query strings and bodies carry secrets and tokens; only the route is shown.
impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path_only())
            .field("secure", &self.secure)
            .field("method", &self.method)
            .field("timeout", &self.timeout)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Parsed response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Json(Value),
    Form(HashMap<String, String>),
}

impl ParsedBody {
    /// JSON document, if the body was parsed as JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Form(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Form(_) => None,
        }
    }

    /// Flat map, if the body was parsed as a query string.
    pub fn as_form(&self) -> Option<&HashMap<String, String>> {
        match self {
            Self::Form(map) => Some(map),
            Self::Json(_) => None,
        }
    }

    /// True when the body is a JSON object carrying a top-level `error`.
    pub fn is_error(&self) -> bool {
        match self {
            Self::Json(Value::Object(object)) => object.contains_key("error"),
            Self::Form(map) => map.contains_key("error"),
            Self::Json(_) => false,
        }
    }
}

/// Executes graph requests.
///
/// Implementations must honor `request.timeout` and must stop work on the
/// request when the returned future is dropped.
#[async_trait]
pub trait TransportClient: Send + Sync {
    async fn request(&self, request: TransportRequest) -> Result<ParsedBody, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(path: &str) -> TransportRequest {
        TransportRequest {
            host: "graph.example.com".to_string(),
            port: 443,
            path: path.to_string(),
            secure: true,
            method: HttpMethod::Get,
            body: None,
            timeout: Duration::from_secs(1),
            format: ResponseFormat::Json,
        }
    }

    #[test]
    fn test_url_and_path() {
        let req = request("/me?access_token=secret");
        assert_eq!(req.url(), "https://graph.example.com:443/me?access_token=secret");
        assert_eq!(req.path_only(), "/me");
        assert_eq!(request("/me").path_only(), "/me");
    }

    #[test]
    fn test_debug_omits_query() {
        let debug = format!("{:?}", request("/me?access_token=secret"));
        assert!(!debug.contains("secret"));
        assert!(debug.contains("/me"));
    }

    #[test]
    fn test_error_shaped_bodies() {
        assert!(ParsedBody::Json(json!({"error": {"message": "bad"}})).is_error());
        assert!(!ParsedBody::Json(json!({"id": "1"})).is_error());
        assert!(!ParsedBody::Json(json!([1])).is_error());
        let form = HashMap::from([("error".to_string(), "x".to_string())]);
        assert!(ParsedBody::Form(form).is_error());
    }

    #[test]
    fn test_method_names() {
        assert_eq!(HttpMethod::default(), HttpMethod::Get);
        assert_eq!(HttpMethod::Post.to_string(), "POST");
        assert_eq!(HttpMethod::Delete.as_str(), "DELETE");
    }
}
