//! Session lifecycle through the public API: token reads, refresh races and idle timeout.

mod common;

use common::{harness, harness_with, FakeAuthBackend, ScriptedTransport, T0};
use resilient_api::auth::{AuthTokens, NotificationLevel, TOKENS_KEY};
use resilient_api::clock::ManualClock;
use resilient_api::storage::{MemoryStorage, SecureStorage};
use resilient_api::{get_auth_token, SessionStatus};
use std::time::Duration;

#[tokio::test]
async fn test_get_auth_token_with_empty_storage() {
    let storage = MemoryStorage::new();
    let clock = ManualClock::new(T0);
    assert_eq!(get_auth_token(&storage, &clock).await, None);
}

#[tokio::test]
async fn test_get_auth_token_returns_stale_token() {
    let storage = MemoryStorage::new();
    let clock = ManualClock::new(T0);
    let tokens = AuthTokens {
        access_token: "stale".into(),
        refresh_token: "r".into(),
        expires_at: T0 - 1,
    };
    storage
        .set(TOKENS_KEY, &serde_json::to_string(&tokens).unwrap())
        .await
        .unwrap();

    assert_eq!(get_auth_token(&storage, &clock).await.as_deref(), Some("stale"));
}

#[tokio::test]
async fn test_get_auth_token_degrades_on_storage_failure() {
    let storage = MemoryStorage::new();
    storage.set(TOKENS_KEY, "{not json").await.unwrap();
    let clock = ManualClock::new(T0);
    assert_eq!(get_auth_token(&storage, &clock).await, None);

    storage.set_failing(true);
    assert_eq!(get_auth_token(&storage, &clock).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_race_makes_one_exchange() {
    let h = harness(ScriptedTransport::ok());
    let session = h.client.session();
    session.sign_in("ada@example.com", "secret").await.unwrap();
    h.clock.advance(Duration::from_secs(3_500));

    let (a, b) = tokio::join!(session.refresh_session(), session.refresh_session());
    assert!(a);
    assert!(b);
    assert_eq!(h.backend.refresh_count(), 1);
    assert_eq!(session.access_token().as_deref(), Some("access-refreshed-1"));
    assert_eq!(session.status(), SessionStatus::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_sign_in_failure_notifies_with_server_message() {
    let h = harness(ScriptedTransport::ok());
    let err = h
        .client
        .session()
        .sign_in("ada@example.com", "nope")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(!h.client.session().is_authenticated());
    assert_eq!(
        h.observer.notifications(),
        vec![(NotificationLevel::Error, "Invalid credentials".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_initialize_restores_persisted_session() {
    let first = harness(ScriptedTransport::ok());
    first
        .client
        .session()
        .sign_in("ada@example.com", "secret")
        .await
        .unwrap();
    assert!(first.storage.contains(TOKENS_KEY));

    // A second client over the same storage picks the session up.
    let second = harness(ScriptedTransport::ok());
    for key in [TOKENS_KEY, resilient_api::auth::USER_KEY] {
        let raw = first.storage.get(key).await.unwrap().unwrap();
        second.storage.set(key, &raw).await.unwrap();
    }
    second.client.initialize().await;
    assert!(second.client.session().is_authenticated());
    assert_eq!(
        second.client.session().user().map(|u| u.email),
        Some("ada@example.com".to_string())
    );
    assert!(second.client.session().is_auto_refreshing());
    second.client.shutdown();
    assert!(!second.client.session().is_auto_refreshing());
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_signs_out() {
    let h = harness_with(ScriptedTransport::ok(), FakeAuthBackend::new(), |c| {
        c.session_timeout.enabled = true;
        c.session_timeout.timeout_ms = 60_000;
        c.session_timeout.warning_before_ms = 10_000;
    });
    h.client.session().sign_in("ada@example.com", "secret").await.unwrap();
    h.client.initialize().await;

    let timeout = h.client.session_timeout().expect("idle timeout enabled");
    assert!(timeout.monitor().is_monitoring());
    assert_eq!(timeout.remaining_seconds(), 60);

    h.clock.advance(Duration::from_secs(55));
    assert!(timeout.is_warning());
    h.client.get("/activity").await.unwrap();
    assert!(!timeout.is_warning());
    assert_eq!(h.client.signals().idle_remaining_secs, Some(60));

    h.clock.advance(Duration::from_secs(61));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(timeout.is_expired());
    assert_eq!(h.client.session().status(), SessionStatus::NoSession);
    assert_eq!(h.observer.login_redirects(), 1);
    assert!(!timeout.monitor().is_monitoring());

    h.client.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_applies_to_sign_in_after_initialize() {
    let h = harness_with(ScriptedTransport::ok(), FakeAuthBackend::new(), |c| {
        c.session_timeout.enabled = true;
        c.session_timeout.timeout_ms = 60_000;
        c.session_timeout.warning_before_ms = 10_000;
    });
    h.client.initialize().await;
    let timeout = h.client.session_timeout().expect("idle timeout enabled").clone();
    assert!(!timeout.monitor().is_monitoring());

    h.client.session().sign_in("ada@example.com", "secret").await.unwrap();
    assert!(timeout.monitor().is_monitoring());
    assert_eq!(timeout.remaining_seconds(), 60);

    h.clock.advance(Duration::from_secs(120));
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.client.session().status(), SessionStatus::NoSession);
    assert_eq!(h.observer.login_redirects(), 1);
    assert!(!timeout.monitor().is_monitoring());

    // A later sign-in starts a fresh idle period and is timed out again.
    h.client.session().sign_in("ada@example.com", "secret").await.unwrap();
    assert!(timeout.monitor().is_monitoring());
    assert!(!timeout.is_expired());
    assert_eq!(timeout.remaining_seconds(), 60);

    h.clock.advance(Duration::from_secs(61));
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.client.session().status(), SessionStatus::NoSession);
    assert_eq!(h.observer.login_redirects(), 2);

    h.client.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_stops_idle_monitoring() {
    let h = harness_with(ScriptedTransport::ok(), FakeAuthBackend::new(), |c| {
        c.session_timeout.enabled = true;
    });
    h.client.initialize().await;
    h.client.session().sign_in("ada@example.com", "secret").await.unwrap();
    let timeout = h.client.session_timeout().unwrap().clone();
    assert!(timeout.monitor().is_monitoring());

    h.client.session().sign_out().await;
    assert!(!timeout.monitor().is_monitoring());
    h.client.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_timeout_logout_stops_monitoring() {
    let h = harness_with(ScriptedTransport::ok(), FakeAuthBackend::new(), |c| {
        c.session_timeout.enabled = true;
    });
    h.client.session().sign_in("ada@example.com", "secret").await.unwrap();
    h.client.initialize().await;

    let timeout = h.client.session_timeout().unwrap().clone();
    timeout.logout().await;
    assert!(!timeout.monitor().is_monitoring());
    assert!(!h.client.session().is_authenticated());
    h.client.shutdown();
}
