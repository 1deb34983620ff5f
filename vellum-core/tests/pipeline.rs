//! Integration tests for the request pipeline.
//!
//! These tests verify that the ApiClient correctly:
//! - Attaches the bearer credential and refreshes expired tokens before
//!   dispatch
//! - Retries a 401 exactly once after a refresh, then forces logout
//! - Redelivers failed requests per the configured retry policy
//! - Feeds the request tracker and the client event channel

use chrono::Duration;
use std::sync::Arc;
use vellum_core::{
    ApiClient, ApiError, ClientConfig, ClientEvent, ClientEvents, MemoryStore, RetryConfig,
    SessionManager,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn success_body() -> serde_json::Value {
    serde_json::json!({
        "code": 200,
        "success": true,
        "message": "success",
        "data": { "value": 7 }
    })
}

fn refresh_body(token: &str) -> serde_json::Value {
    serde_json::json!({
        "code": 200,
        "success": true,
        "data": { "accessToken": token, "expiresIn": 3600 }
    })
}

#[derive(Debug, serde::Deserialize)]
struct Payload {
    value: u32,
}

fn client_for(server: &MockServer, retry: RetryConfig) -> (Arc<ApiClient>, SessionManager) {
    init_tracing();
    let config = ClientConfig {
        api_base_url: server.uri(),
        retry,
        ..ClientConfig::default()
    };
    let session = SessionManager::new(&config, Arc::new(MemoryStore::new()));
    let events = ClientEvents::new();
    let api = Arc::new(ApiClient::new(config, session.clone(), events));
    (api, session)
}

#[tokio::test]
async fn test_unauthenticated_request_has_no_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/category"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _) = client_for(&server, RetryConfig::default());
    let envelope = api.get::<Payload>("/category", None).await.unwrap();
    assert_eq!(envelope.data.unwrap().value, 7);

    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_valid_token_is_attached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/category"))
        .and(header("authorization", "Bearer live-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .expect(1)
        .mount(&server)
        .await;

    let (api, session) = client_for(&server, RetryConfig::default());
    session.set_token("live-token", Duration::hours(1)).await;

    api.get::<Payload>("/category", None).await.unwrap();
}

#[tokio::test]
async fn test_expired_token_refreshed_once_before_dispatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(refresh_body("renewed")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/category"))
        .and(header("authorization", "Bearer renewed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .expect(1)
        .mount(&server)
        .await;

    let (api, session) = client_for(&server, RetryConfig::default());
    // Expired ten seconds ago.
    session.set_token("stale", Duration::seconds(-10)).await;

    let envelope = api.get::<Payload>("/category", None).await.unwrap();
    assert!(envelope.success);
}

#[tokio::test]
async fn test_refresh_failure_aborts_request_and_expires_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/category"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .expect(0)
        .mount(&server)
        .await;

    let (api, session) = client_for(&server, RetryConfig::default());
    let mut events = api.events().subscribe();
    session.set_token("stale", Duration::seconds(-10)).await;

    let err = api.get::<Payload>("/category", None).await.unwrap_err();
    assert!(matches!(err, ApiError::SessionExpired));
    assert!(session.token().is_none());

    // A notice and the expiry signal both go out.
    let mut saw_expired = false;
    while let Ok(event) = events.try_recv() {
        if event == ClientEvent::SessionExpired {
            saw_expired = true;
        }
    }
    assert!(saw_expired);
}

#[tokio::test]
async fn test_single_401_recovers_after_refresh() {
    let server = MockServer::start().await;
    // First delivery is rejected, the redelivery with the fresh credential
    // succeeds.
    Mock::given(method("GET"))
        .and(path("/category"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/category"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(refresh_body("fresh")))
        .expect(1)
        .mount(&server)
        .await;

    let (api, session) = client_for(&server, RetryConfig::default());
    session.set_token("rejected-by-server", Duration::hours(1)).await;

    let envelope = api.get::<Payload>("/category", None).await.unwrap();
    assert_eq!(envelope.data.unwrap().value, 7);
}

#[tokio::test]
async fn test_double_401_forces_logout_without_second_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/category"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(refresh_body("also-rejected")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (api, session) = client_for(&server, RetryConfig::default());
    let mut events = api.events().subscribe();
    session.set_token("doomed", Duration::hours(1)).await;

    let err = api.get::<Payload>("/category", None).await.unwrap_err();
    assert!(matches!(err, ApiError::SessionExpired));
    assert!(session.token().is_none());

    let mut saw_expired = false;
    while let Ok(event) = events.try_recv() {
        if event == ClientEvent::SessionExpired {
            saw_expired = true;
        }
    }
    assert!(saw_expired);
}

#[tokio::test]
async fn test_transient_failures_redelivered_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/category"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "code": 503, "success": false, "message": "warming up", "data": null
        })))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/category"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .expect(1)
        .mount(&server)
        .await;

    let retry = RetryConfig {
        enabled: true,
        count: 3,
        delay_secs: 0,
    };
    let (api, _) = client_for(&server, retry);

    let envelope = api.get::<Payload>("/category", None).await.unwrap();
    assert!(envelope.success);
}

#[tokio::test]
async fn test_retry_disabled_fails_immediately_with_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/category"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "code": 500, "success": false, "message": "database is on fire", "data": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _) = client_for(&server, RetryConfig::default());

    let err = api.get::<Payload>("/category", None).await.unwrap_err();
    match err {
        ApiError::Http { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "database is on fire");
        }
        other => panic!("expected ApiError::Http, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retries_exhausted_surfaces_final_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/category"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let retry = RetryConfig {
        enabled: true,
        count: 2,
        delay_secs: 0,
    };
    let (api, _) = client_for(&server, retry);
    let mut events = api.events().subscribe();

    let err = api.get::<Payload>("/category", None).await.unwrap_err();
    assert!(matches!(err, ApiError::Http { status: 502, .. }));

    // The terminal failure produced exactly one user-visible notice.
    let mut notices = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ClientEvent::Notice { .. }) {
            notices += 1;
        }
    }
    assert_eq!(notices, 1);
}

#[tokio::test]
async fn test_garbled_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/category"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let (api, _) = client_for(&server, RetryConfig::default());
    let err = api.get::<Payload>("/category", None).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse));
}

#[tokio::test]
async fn test_tracker_settles_after_dispatch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/category"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(success_body())
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let (api, _) = client_for(&server, RetryConfig::default());

    let request = {
        let api = Arc::clone(&api);
        tokio::spawn(async move { api.get::<Payload>("/category", None).await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(api.tracker().pending(), 1);

    assert!(
        api.tracker()
            .wait_for_idle(std::time::Duration::from_secs(5))
            .await
    );
    request.await.unwrap().unwrap();
    assert_eq!(api.tracker().pending(), 0);
}

#[tokio::test]
async fn test_query_parameters_serialized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/category"))
        .and(wiremock::matchers::query_param("page", "2"))
        .and(wiremock::matchers::query_param("keyword", "rust"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _) = client_for(&server, RetryConfig::default());
    let query = serde_json::json!({ "page": 2, "keyword": "rust" });
    api.get::<Payload>("/category", Some(query)).await.unwrap();
}
