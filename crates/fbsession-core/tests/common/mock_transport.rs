//! Scripted in-memory transport for testing

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fbsession_core::crypto::HmacKey;
use fbsession_core::{
    sign_signed_request, ParsedBody, TransportClient, TransportError, TransportRequest,
};
use serde_json::json;

pub const APP_ID: &str = "123";
pub const APP_SECRET: &str = "test-app-secret";

/// What the transport does with the next request.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(ParsedBody),
    Fail(TransportError),
    /// Respond after a delay
    Delayed(Duration, ParsedBody),
    /// Never respond
    Hang,
}

#[derive(Default)]
struct Inner {
    script: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<TransportRequest>>,
    completed: AtomicUsize,
}

/// Transport that records every request and replies from a script.
///
/// Once the script runs out every request gets a `/me`-shaped document.
#[derive(Default, Clone)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(replies: impl IntoIterator<Item = Reply>) -> Self {
        let transport = Self::new();
        transport.inner.script.lock().unwrap().extend(replies);
        transport
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.inner.requests.lock().unwrap().len()
    }

    /// Requests whose reply was actually delivered to a caller
    pub fn completed_count(&self) -> usize {
        self.inner.completed.load(Ordering::SeqCst)
    }

    pub fn requests_to(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.path_only() == path)
            .count()
    }
}

#[async_trait]
impl TransportClient for MockTransport {
    async fn request(&self, request: TransportRequest) -> Result<ParsedBody, TransportError> {
        let reply = {
            self.inner.requests.lock().unwrap().push(request);
            self.inner.script.lock().unwrap().pop_front()
        };

        let result = match reply {
            None => Ok(ParsedBody::Json(json!({"id": "42", "name": "Test User"}))),
            Some(Reply::Respond(body)) => Ok(body),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Delayed(delay, body)) => {
                tokio::time::sleep(delay).await;
                Ok(body)
            }
            Some(Reply::Hang) => std::future::pending().await,
        };

        self.inner.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Token endpoint reply in its flat `access_token=..&expires=..` form.
pub fn grant(token: &str, expires_in: i64) -> ParsedBody {
    ParsedBody::Form(HashMap::from([
        ("access_token".to_string(), token.to_string()),
        ("expires".to_string(), expires_in.to_string()),
    ]))
}

/// `fbsr_<APP_ID>` cookie carrying `payload_json` signed with `secret`.
pub fn signed_cookie(payload_json: &str, secret: &str) -> String {
    let key = HmacKey::new(secret).unwrap();
    format!("fbsr_{APP_ID}={}", sign_signed_request(payload_json, &key))
}
