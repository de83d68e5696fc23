//! End-to-end resolution tests against a scripted transport
//!
//! Covers:
//! - Requests without cookies never reach the transport
//! - A signed request carrying a code resolves unbound and binds on first use
//! - The code exchange deadline wins over a late response, exactly once
//! - Tokens learned from an exchange are reused by later requests
//! - Unsigned `fbs_` cookies never write to the shared token cache

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{grant, signed_cookie, MockTransport, Reply, APP_ID, APP_SECRET};
use fbsession_core::exchange::TOKEN_ENDPOINT_PATH;
use fbsession_core::{
    AuthError, GraphConfig, HttpMethod, Params, ParsedBody, SessionResolver, SessionStatus,
    TokenExchanger, TransportError,
};
use serde_json::json;

fn config() -> GraphConfig {
    GraphConfig::new(APP_ID, APP_SECRET)
        .with_graph_secure_host("graph.test", 443)
        .with_redirect_uri("https://app.test/callback")
}

fn resolver(transport: &MockTransport) -> SessionResolver {
    SessionResolver::new(config(), Arc::new(transport.clone())).unwrap()
}

#[tokio::test]
async fn test_no_cookie_header_never_touches_transport() {
    let transport = MockTransport::new();
    let resolver = resolver(&transport);

    assert_eq!(
        resolver.resolve_request(None).unwrap_err(),
        AuthError::NoCredential
    );
    assert!(resolver.resolve_optional(None).is_none());
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_signed_code_resolves_unbound_then_binds() {
    let transport = MockTransport::with_script([Reply::Respond(grant("user-token", 3600))]);
    let resolver = resolver(&transport);

    let cookie = signed_cookie(
        r#"{"algorithm":"HMAC-SHA256","code":"XYZ","issuedAt":1}"#,
        APP_SECRET,
    );
    let session = resolver.resolve_request(Some(&cookie)).unwrap();
    assert_eq!(session.status().await, SessionStatus::Unbound);
    assert_eq!(transport.request_count(), 0);

    let me = session.me().await.unwrap();
    assert_eq!(me["id"], "42");
    assert_eq!(session.status().await, SessionStatus::Bound);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path_only(), TOKEN_ENDPOINT_PATH);
    assert!(requests[0].path.contains("code=XYZ"));
    assert!(requests[0]
        .path
        .contains("redirect_uri=https%3A%2F%2Fapp.test%2Fcallback"));
    assert_eq!(requests[1].path, "/me?access_token=user-token");
    assert!(requests[1].secure);
}

#[tokio::test]
async fn test_exchanged_token_is_reused_for_same_user() {
    let transport = MockTransport::with_script([Reply::Respond(grant("first-token", 3600))]);
    let resolver = resolver(&transport);
    let cookie = signed_cookie(
        r#"{"algorithm":"HMAC-SHA256","code":"XYZ","issued_at":1,"user_id":"1001"}"#,
        APP_SECRET,
    );

    let first = resolver.resolve_request(Some(&cookie)).unwrap();
    first.graph_get("/me/friends", &Params::new()).await.unwrap();

    let second = resolver.resolve_request(Some(&cookie)).unwrap();
    assert_eq!(second.status().await, SessionStatus::Bound);
    assert_eq!(second.access_token().await.unwrap().0, "first-token");
    second.graph_get("/me/friends", &Params::new()).await.unwrap();

    assert_eq!(transport.requests_to(TOKEN_ENDPOINT_PATH), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exchange_timeout_completes_exactly_once() {
    let transport = MockTransport::with_script([Reply::Delayed(
        Duration::from_millis(100),
        grant("late-token", 3600),
    )]);
    let exchanger = TokenExchanger::new(Arc::new(transport.clone()), &config());

    let started = tokio::time::Instant::now();
    let result = exchanger
        .exchange("XYZ", "", Duration::from_millis(50))
        .await;
    let elapsed = started.elapsed();

    assert_eq!(
        result,
        Err(AuthError::ExchangeTimeout(Duration::from_millis(50)))
    );
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(100));

    // Past the point where the late response would have arrived.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.request_count(), 1);
    assert_eq!(transport.completed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_exchange_fails_session_calls() {
    let transport = MockTransport::with_script([Reply::Hang]);
    let resolver = SessionResolver::new(
        config().with_exchange_timeout(Duration::from_millis(50)),
        Arc::new(transport.clone()),
    )
    .unwrap();
    let session = resolver.resolve_from_code("XYZ", "", None);

    assert_eq!(
        session.api_call("/me", &Params::new(), HttpMethod::Get).await,
        Err(AuthError::Unauthenticated)
    );
    assert_eq!(session.status().await, SessionStatus::Failed);
    assert!(!session.is_valid().await);
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_exchange_network_error_is_distinct() {
    let transport = MockTransport::with_script([Reply::Fail(TransportError::Network(
        "connection reset".to_string(),
    ))]);
    let resolver = resolver(&transport);
    let session = resolver.resolve_from_code("XYZ", "", None);

    assert_eq!(
        session.retrieve_access_token("XYZ", "").await,
        Err(AuthError::ExchangeNetworkError("connection reset".to_string()))
    );
    assert_eq!(session.status().await, SessionStatus::Unbound);
}

#[tokio::test]
async fn test_access_token_cookie_binds_without_exchange() {
    let transport = MockTransport::with_script([Reply::Respond(ParsedBody::Json(
        json!({"id": "2002", "name": "Cookie User"}),
    ))]);
    let resolver = resolver(&transport);

    let cookie = format!("fbs_{APP_ID}=\"access_token=cookie-token&expires=0&uid=2002\"");
    let session = resolver.resolve_request(Some(&cookie)).unwrap();

    assert_eq!(session.get_identity().await.unwrap(), "2002");
    assert_eq!(session.get_identity().await.unwrap(), "2002");
    assert_eq!(transport.request_count(), 1);
    assert!(resolver.token_cache().lookup("2002").is_none());
}

#[tokio::test]
async fn test_unsigned_cookie_cannot_seed_token_for_signed_user() {
    let transport = MockTransport::with_script([Reply::Respond(grant("victim-token", 3600))]);
    let resolver = resolver(&transport);

    let forged = format!("fbs_{APP_ID}=\"access_token=attacker-token&expires=0&uid=1001\"");
    let attacker = resolver.resolve_request(Some(&forged)).unwrap();
    assert_eq!(attacker.status().await, SessionStatus::Bound);
    assert!(resolver.token_cache().is_empty());

    let cookie = signed_cookie(
        r#"{"algorithm":"HMAC-SHA256","code":"VICTIMCODE","issued_at":1,"user_id":"1001"}"#,
        APP_SECRET,
    );
    let victim = resolver.resolve_request(Some(&cookie)).unwrap();
    assert_eq!(victim.status().await, SessionStatus::Unbound);

    victim.me().await.unwrap();
    assert_eq!(victim.access_token().await.unwrap().0, "victim-token");
    assert_eq!(transport.requests_to(TOKEN_ENDPOINT_PATH), 1);
    assert_eq!(
        resolver.token_cache().lookup("1001").unwrap().token,
        "victim-token"
    );
}

#[tokio::test]
async fn test_unsigned_cookie_session_exchange_skips_cache() {
    let transport = MockTransport::with_script([Reply::Respond(grant("exchanged", 3600))]);
    let resolver = resolver(&transport);

    let forged = format!("fbs_{APP_ID}=\"access_token=t&expires=0&uid=1001\"");
    let session = resolver.resolve_request(Some(&forged)).unwrap();
    session
        .retrieve_access_token("CODE", "https://app.test/callback")
        .await
        .unwrap();

    assert_eq!(session.access_token().await.unwrap().0, "exchanged");
    assert!(resolver.token_cache().lookup("1001").is_none());
}

#[tokio::test]
async fn test_tokenless_graph_call_uses_plain_host() {
    let transport = MockTransport::new();
    let resolver = SessionResolver::new(
        config().with_graph_host("plain.graph.test", 8080),
        Arc::new(transport.clone()),
    )
    .unwrap();

    let mut params = Params::new();
    params.insert("fields".to_string(), json!("id,name"));
    let doc = resolver
        .graph_call("/4", &params, HttpMethod::Get)
        .await
        .unwrap();
    assert_eq!(doc["id"], "42");

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.host, "plain.graph.test");
    assert_eq!(request.port, 8080);
    assert!(!request.secure);
    assert_eq!(request.path, "/4?fields=id%2Cname");
    assert!(!request.path.contains("access_token"));
}

#[tokio::test]
async fn test_tampered_cookie_reports_kind_but_collapses_to_none() {
    let transport = MockTransport::new();
    let resolver = resolver(&transport);
    let cookie = signed_cookie(
        r#"{"algorithm":"HMAC-SHA256","code":"XYZ","issued_at":1}"#,
        "not-the-app-secret",
    );

    assert_eq!(
        resolver.resolve_request(Some(&cookie)).unwrap_err(),
        AuthError::InvalidSignature
    );
    assert!(resolver.resolve_optional(Some(&cookie)).is_none());
    assert_eq!(transport.request_count(), 0);
}
