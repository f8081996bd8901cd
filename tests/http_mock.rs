//! HTTP transport and auth backend against a local mock server.

use mockito::{Matcher, Server};
use resilient_api::auth::{AuthBackend, HttpAuthBackend, RecordingSessionObserver};
use resilient_api::storage::MemoryStorage;
use resilient_api::transport::{HttpTransport, Transport};
use resilient_api::{ApiClient, ApiRequest, ClientConfig, Error, ErrorKind, Method};
use serde_json::json;
use std::sync::Arc;

fn config_for(url: &str) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.base_url = url.to_string();
    config.timeout_ms = 5_000;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter = false;
    config
}

#[tokio::test]
async fn test_transport_decodes_json_success() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/items")
        .match_header("x-trace", "abc")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("x-request-id", "req-1")
        .with_body(r#"{"items":[1,2]}"#)
        .create_async()
        .await;

    let transport = HttpTransport::new(&config_for(&server.url())).unwrap();
    let req = ApiRequest::new(Method::Get, format!("{}/items", server.url())).with_header("X-Trace", "abc");
    let resp = transport.send(&req).await.unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, json!({"items": [1, 2]}));
    assert_eq!(resp.header("X-Request-Id"), Some("req-1"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_transport_maps_error_status_and_retry_after() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/orders")
        .match_body(Matcher::Json(json!({"qty": 2})))
        .with_status(429)
        .with_header("retry-after", "7")
        .with_body(r#"{"message":"Too many requests"}"#)
        .create_async()
        .await;

    let transport = HttpTransport::new(&config_for(&server.url())).unwrap();
    let req = ApiRequest::new(Method::Post, format!("{}/orders", server.url()))
        .with_body(json!({"qty": 2}));
    let err = transport.send(&req).await.unwrap_err();

    match &err {
        Error::Http {
            status,
            retry_after_ms,
            ..
        } => {
            assert_eq!(*status, 429);
            assert_eq!(*retry_after_ms, Some(7_000));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.user_message(), "Too many requests");
}

#[tokio::test]
async fn test_transport_connection_failure_is_network_error() {
    let transport = HttpTransport::new(&config_for("http://127.0.0.1:1")).unwrap();
    let req = ApiRequest::new(Method::Get, "http://127.0.0.1:1/unreachable");
    let err = transport.send(&req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn test_auth_backend_sign_in() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/auth/login")
        .match_body(Matcher::Json(json!({"email": "ada@example.com", "password": "secret"})))
        .with_status(200)
        .with_body(
            json!({
                "user": {"id": "u1", "email": "ada@example.com", "name": "Ada"},
                "accessToken": "at-1",
                "refreshToken": "rt-1",
                "expiresIn": 900
            })
            .to_string(),
        )
        .create_async()
        .await;

    let transport = Arc::new(HttpTransport::new(&config_for(&server.url())).unwrap());
    let backend = HttpAuthBackend::new(transport, server.url());
    let resp = backend.sign_in("ada@example.com", "secret").await.unwrap();
    assert_eq!(resp.access_token, "at-1");
    assert_eq!(resp.expires_in, 900);
    assert_eq!(resp.user.name, "Ada");
}

#[tokio::test]
async fn test_auth_backend_rejection_is_auth_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/auth/login")
        .with_status(401)
        .with_body(r#"{"message":"Invalid credentials"}"#)
        .create_async()
        .await;

    let transport = Arc::new(HttpTransport::new(&config_for(&server.url())).unwrap());
    let backend = HttpAuthBackend::new(transport, server.url());
    let err = backend.sign_in("ada@example.com", "wrong").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.user_message(), "Invalid credentials");
}

#[tokio::test]
async fn test_auth_backend_refresh() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/auth/refresh")
        .match_body(Matcher::Json(json!({"refreshToken": "rt-1"})))
        .with_status(200)
        .with_body(r#"{"accessToken":"at-2","expiresIn":900}"#)
        .create_async()
        .await;

    let transport = Arc::new(HttpTransport::new(&config_for(&server.url())).unwrap());
    let backend = HttpAuthBackend::new(transport, format!("{}/", server.url()));
    let resp = backend.refresh("rt-1").await.unwrap();
    assert_eq!(resp.access_token, "at-2");
    assert_eq!(resp.refresh_token, None);
}

#[tokio::test]
async fn test_client_end_to_end_with_refresh() {
    let mut server = Server::new_async().await;
    let _login = server
        .mock("POST", "/auth/login")
        .with_status(200)
        .with_body(
            json!({
                "user": {"id": "u1", "email": "ada@example.com", "name": "Ada"},
                "accessToken": "at-1",
                "refreshToken": "rt-1",
                "expiresIn": 900
            })
            .to_string(),
        )
        .create_async()
        .await;
    let stale = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer at-1")
        .match_header("x-client-id", "e2e")
        .match_header("x-correlation-id", Matcher::Any)
        .with_status(401)
        .with_body(r#"{"message":"token expired"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(r#"{"accessToken":"at-2","refreshToken":"rt-2","expiresIn":900}"#)
        .expect(1)
        .create_async()
        .await;
    let fresh = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer at-2")
        .with_status(200)
        .with_body(r#"{"id":"u1"}"#)
        .expect(1)
        .create_async()
        .await;

    let mut config = config_for(&server.url());
    config.client_id = "e2e".into();
    let client = ApiClient::builder(config)
        .storage(Arc::new(MemoryStorage::new()))
        .observer(Arc::new(RecordingSessionObserver::new()))
        .build()
        .unwrap();

    client
        .session()
        .sign_in("ada@example.com", "secret")
        .await
        .unwrap();
    let resp = client.get("/me").await.unwrap();
    assert_eq!(resp.body, json!({"id": "u1"}));

    stale.assert_async().await;
    refresh.assert_async().await;
    fresh.assert_async().await;
    client.shutdown();
}
