mod common;

use async_trait::async_trait;
use bridge_traits::{BridgeError, Clock, ManualClock, Navigator, RecordingNavigator};
use common::*;
use core_auth::{AuthError, SessionManager, SessionPhase, SessionSettings};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Nav {}

    #[async_trait]
    impl Navigator for Nav {
        async fn navigate(&self, url: &str) -> bridge_traits::error::Result<()>;
    }
}

struct Harness {
    http: Arc<ScriptedHttp>,
    clock: Arc<ManualClock>,
    events: EventBus,
    session: SessionManager,
}

fn harness_with(navigator: Arc<dyn Navigator>) -> Harness {
    let http = ScriptedHttp::new();
    let clock = Arc::new(ManualClock::new(start_time()));
    let events = bus();
    let session = SessionManager::with_parts(
        http.clone(),
        navigator,
        clock.clone(),
        events.clone(),
        SessionSettings {
            api_prefix: PREFIX.to_string(),
            request_timeout: Duration::from_secs(5),
            refresh_buffer: Duration::from_secs(300),
        },
    );
    Harness {
        http,
        clock,
        events,
        session,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(RecordingNavigator::new()))
}

async fn signed_in(h: &Harness) {
    h.http.respond("GET", "/auth/callback", 200, tokens_body("T", "R", 3600));
    h.http.respond("GET", "/me", 200, profile_body(7, "night-drive"));
    h.session.exchange_callback("abc", "xyz").await.unwrap();
    assert!(h.session.wait_until_settled().await.is_authenticated());
}

#[tokio::test]
async fn test_exchange_stores_tokens_then_loads_profile() {
    let h = harness();
    let mut events = h.events.subscribe();
    h.http.respond("GET", "/auth/callback", 200, tokens_body("T", "R", 3600));
    let gate = h.http.gate("GET", "/me", 200, profile_body(7, "night-drive"));

    h.session.exchange_callback("abc", "xyz").await.unwrap();

    // Token is usable before the profile arrives.
    assert_eq!(h.session.access_token().as_deref(), Some("T"));
    assert!(h.session.auth_loading());
    assert_eq!(h.session.phase(), SessionPhase::Authenticating);
    assert!(!h.session.is_authenticated());

    gate.notify_one();
    let snapshot = h.session.wait_until_settled().await;

    assert!(snapshot.is_authenticated());
    assert_eq!(snapshot.user.as_ref().unwrap().username, "night-drive");
    assert_eq!(
        snapshot.tokens.as_ref().unwrap().expires_at,
        start_time() + chrono::Duration::seconds(3600)
    );

    let callback = &h.http.requests_to("/auth/callback")[0];
    assert!(callback.url.ends_with("/auth/callback?code=abc&state=xyz"));
    let me = &h.http.requests_to("/me")[0];
    assert_eq!(me.headers.get("Authorization").map(String::as_str), Some("Bearer T"));

    let events = drain(&mut events);
    assert!(events.contains(&CoreEvent::Auth(AuthEvent::SignedIn {
        expires_at: (start_time() + chrono::Duration::seconds(3600)).timestamp(),
    })));
    assert!(events.contains(&CoreEvent::Auth(AuthEvent::ProfileLoaded {
        user_id: "7".to_string(),
        username: "night-drive".to_string(),
    })));
}

#[tokio::test]
async fn test_callback_parameters_are_url_encoded() {
    let h = harness();
    h.http.respond("GET", "/auth/callback", 400, serde_json::json!({}));

    let _ = h.session.exchange_callback("a b&c", "s=1").await;

    let callback = &h.http.requests_to("/auth/callback")[0];
    assert!(callback.url.ends_with("?code=a+b%26c&state=s%3D1"));
}

#[tokio::test]
async fn test_exchange_rejection_leaves_store_untouched() {
    let h = harness();
    let mut events = h.events.subscribe();
    let before = h.session.generation();
    h.http.respond("GET", "/auth/callback", 400, serde_json::json!({ "error": "bad code" }));

    let err = h.session.exchange_callback("abc", "xyz").await.unwrap_err();

    assert!(matches!(err, AuthError::AuthExchange { status: Some(400), .. }));
    assert_eq!(h.session.generation(), before);
    assert_eq!(h.session.phase(), SessionPhase::Anonymous);
    assert!(h.http.requests_to("/me").is_empty());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, CoreEvent::Auth(AuthEvent::AuthError { recoverable: false, .. }))));
}

#[tokio::test]
async fn test_exchange_with_incomplete_body_fails() {
    let h = harness();
    h.http.respond(
        "GET",
        "/auth/callback",
        200,
        serde_json::json!({ "access_token": "T", "expires_in": 3600 }),
    );

    let err = h.session.exchange_callback("abc", "xyz").await.unwrap_err();

    match err {
        AuthError::AuthExchange { reason, .. } => assert!(reason.contains("refresh_token")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.session.access_token().is_none());
}

#[tokio::test]
async fn test_exchange_with_out_of_range_expiry_fails() {
    let h = harness();
    h.http.respond(
        "GET",
        "/auth/callback",
        200,
        tokens_body("T", "R", 9_000_000_000_000),
    );

    let err = h.session.exchange_callback("abc", "xyz").await.unwrap_err();

    match err {
        AuthError::AuthExchange { status, reason } => {
            assert_eq!(status, Some(200));
            assert!(reason.contains("expires_in"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.session.access_token().is_none());
    assert!(h.http.requests_to("/me").is_empty());
}

#[tokio::test]
async fn test_exchange_transport_failure() {
    let h = harness();
    h.http.push(
        "GET",
        "/auth/callback",
        Scripted::Fail(BridgeError::OperationFailed("connection refused".into())),
    );

    let err = h.session.exchange_callback("abc", "xyz").await.unwrap_err();

    assert!(matches!(err, AuthError::Transport(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_logout_during_exchange_discards_result() {
    let h = harness();
    let gate = h.http.gate("GET", "/auth/callback", 200, tokens_body("T", "R", 3600));

    let session = h.session.clone();
    let exchange = tokio::spawn(async move { session.exchange_callback("abc", "xyz").await });
    settle().await;

    h.session.logout().await;
    gate.notify_one();

    assert_eq!(exchange.await.unwrap(), Ok(()));
    assert_eq!(h.session.phase(), SessionPhase::Anonymous);
    assert_eq!(h.session.access_token(), None);
    assert!(h.http.requests_to("/me").is_empty());
}

#[tokio::test]
async fn test_superseded_exchange_is_not_an_error() {
    let h = harness();
    let mut events = h.events.subscribe();
    let slow = h.http.gate("GET", "/auth/callback", 200, tokens_body("T1", "R1", 3600));
    h.http.respond("GET", "/auth/callback", 200, tokens_body("T2", "R2", 3600));
    h.http.respond("GET", "/me", 200, profile_body(2, "second"));

    let session = h.session.clone();
    let first = tokio::spawn(async move { session.exchange_callback("c1", "s1").await });
    settle().await;
    h.session.exchange_callback("c2", "s2").await.unwrap();
    assert!(h.session.wait_until_settled().await.is_authenticated());

    slow.notify_one();

    assert_eq!(first.await.unwrap(), Ok(()));
    assert_eq!(h.session.access_token(), Some("T2".to_string()));
    assert_eq!(h.http.requests_to("/me").len(), 1);
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, CoreEvent::Auth(AuthEvent::AuthError { .. }))));
}

#[tokio::test]
async fn test_logout_clears_even_when_revoke_fails() {
    let h = harness();
    signed_in(&h).await;
    let mut events = h.events.subscribe();
    h.http.respond("POST", "/auth/logout", 500, serde_json::json!({}));

    h.session.logout().await;

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase(), SessionPhase::Anonymous);
    assert!(snapshot.user.is_none());
    assert!(!snapshot.auth_loading);

    let revoke = &h.http.requests_to("/auth/logout")[0];
    let body: serde_json::Value = serde_json::from_slice(revoke.body.as_ref().unwrap()).unwrap();
    assert_eq!(body, serde_json::json!({ "access_token": "T" }));

    assert_eq!(drain(&mut events), vec![CoreEvent::Auth(AuthEvent::SignedOut)]);
}

#[tokio::test]
async fn test_logout_survives_transport_failure() {
    let h = harness();
    signed_in(&h).await;
    h.http.push(
        "POST",
        "/auth/logout",
        Scripted::Fail(BridgeError::Timeout(Duration::from_secs(5))),
    );

    h.session.logout().await;

    assert_eq!(h.session.phase(), SessionPhase::Anonymous);
}

#[tokio::test]
async fn test_logout_when_anonymous_skips_revoke() {
    let h = harness();

    h.session.logout().await;

    assert!(h.http.requests().is_empty());
    assert_eq!(h.session.phase(), SessionPhase::Anonymous);
}

#[tokio::test]
async fn test_stale_profile_response_is_discarded() {
    let h = harness();
    h.http.respond("GET", "/auth/callback", 200, tokens_body("T1", "R1", 3600));
    h.http.respond("GET", "/auth/callback", 200, tokens_body("T2", "R2", 3600));
    let first_profile = h.http.gate("GET", "/me", 200, profile_body(1, "first"));
    h.http.respond("GET", "/me", 200, profile_body(2, "second"));

    h.session.exchange_callback("c1", "s1").await.unwrap();
    settle().await;
    h.session.exchange_callback("c2", "s2").await.unwrap();

    let snapshot = h.session.wait_until_settled().await;
    assert_eq!(snapshot.user.as_ref().unwrap().username, "second");

    first_profile.notify_one();
    settle().await;

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.user.as_ref().unwrap().username, "second");
    assert_eq!(snapshot.access_token(), Some("T2"));
}

#[tokio::test]
async fn test_profile_rejection_clears_session() {
    let h = harness();
    let mut events = h.events.subscribe();
    h.http.respond("GET", "/auth/callback", 200, tokens_body("T", "R", 3600));
    h.http.respond("GET", "/me", 401, serde_json::json!({}));

    h.session.exchange_callback("abc", "xyz").await.unwrap();
    let snapshot = h.session.wait_until_settled().await;

    assert_eq!(snapshot.phase(), SessionPhase::Anonymous);
    assert!(h.session.access_token().is_none());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, CoreEvent::Auth(AuthEvent::SessionInvalidated { .. }))));
}

#[tokio::test]
async fn test_profile_server_error_keeps_token() {
    let h = harness();
    let mut events = h.events.subscribe();
    h.http.respond("GET", "/auth/callback", 200, tokens_body("T", "R", 3600));
    h.http.respond("GET", "/me", 500, serde_json::json!({}));

    h.session.exchange_callback("abc", "xyz").await.unwrap();
    let snapshot = h.session.wait_until_settled().await;

    assert_eq!(snapshot.phase(), SessionPhase::AuthenticatedNoProfile);
    assert_eq!(snapshot.access_token(), Some("T"));
    assert!(!snapshot.is_authenticated());
    assert!(drain(&mut events).contains(&CoreEvent::Auth(AuthEvent::ProfileUnavailable {
        status: Some(500),
        message: "HTTP 500".to_string(),
    })));

    // A later retry can still complete the session.
    h.http.respond("GET", "/me", 200, profile_body(7, "night-drive"));
    assert!(h.session.refresh_profile());
    assert!(h.session.wait_until_settled().await.is_authenticated());
}

#[tokio::test]
async fn test_refresh_profile_without_session() {
    let h = harness();
    assert!(!h.session.refresh_profile());
    assert!(!h.session.auth_loading());
}

#[tokio::test]
async fn test_concurrent_refreshes_share_one_request() {
    let h = harness();
    signed_in(&h).await;
    let gate = h.http.gate("POST", "/auth/refresh", 200, tokens_body("T2", "R2", 3600));
    h.http.respond("GET", "/me", 200, profile_body(7, "night-drive"));

    let a = tokio::spawn({
        let session = h.session.clone();
        async move { session.refresh_tokens().await }
    });
    let b = tokio::spawn({
        let session = h.session.clone();
        async move { session.refresh_tokens().await }
    });
    settle().await;
    gate.notify_one();

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert_eq!(a.access_token, "T2");
    assert_eq!(b.access_token, "T2");
    assert_eq!(h.http.requests_to("/auth/refresh").len(), 1);

    let body: serde_json::Value =
        serde_json::from_slice(h.http.requests_to("/auth/refresh")[0].body.as_ref().unwrap()).unwrap();
    assert_eq!(body, serde_json::json!({ "refresh_token": "R" }));
}

#[tokio::test]
async fn test_refresh_keeps_profile_and_refetches() {
    let h = harness();
    signed_in(&h).await;
    h.http.respond("POST", "/auth/refresh", 200, serde_json::json!({ "access_token": "T2" }));
    let gate = h.http.gate("GET", "/me", 200, profile_body(7, "night-drive"));

    let refreshed = h.session.refresh_tokens().await.unwrap();

    assert_eq!(refreshed.refresh_token, "R");
    let snapshot = h.session.snapshot();
    assert!(snapshot.user.is_some());
    assert!(snapshot.auth_loading);

    gate.notify_one();
    assert!(h.session.wait_until_settled().await.is_authenticated());
    let me = h.http.requests_to("/me");
    assert_eq!(
        me.last().unwrap().headers.get("Authorization").map(String::as_str),
        Some("Bearer T2")
    );
}

#[tokio::test]
async fn test_rejected_refresh_token_clears_session() {
    let h = harness();
    signed_in(&h).await;
    h.http.respond("POST", "/auth/refresh", 401, serde_json::json!({}));

    let err = h.session.refresh_tokens().await.unwrap_err();

    assert_eq!(err, AuthError::NotAuthenticated);
    assert_eq!(h.session.phase(), SessionPhase::Anonymous);
}

#[tokio::test]
async fn test_failed_refresh_keeps_tokens() {
    let h = harness();
    signed_in(&h).await;
    h.http.respond("POST", "/auth/refresh", 503, serde_json::json!({}));

    let err = h.session.refresh_tokens().await.unwrap_err();

    assert!(matches!(err, AuthError::TokenRefreshFailed(_)));
    assert_eq!(h.session.access_token().as_deref(), Some("T"));
    assert!(h.session.is_authenticated());
}

#[tokio::test]
async fn test_refresh_with_out_of_range_expiry_keeps_tokens() {
    let h = harness();
    signed_in(&h).await;
    h.http.respond(
        "POST",
        "/auth/refresh",
        200,
        tokens_body("T2", "R2", -9_000_000_000_000),
    );

    let err = h.session.refresh_tokens().await.unwrap_err();

    assert!(matches!(err, AuthError::TokenRefreshFailed(ref reason) if reason.contains("expires_in")));
    assert_eq!(h.session.access_token().as_deref(), Some("T"));
    assert!(h.session.is_authenticated());
}

#[tokio::test]
async fn test_refresh_requires_session() {
    let h = harness();
    assert_eq!(h.session.refresh_tokens().await, Err(AuthError::NotAuthenticated));
    assert_eq!(h.session.valid_access_token().await, Err(AuthError::NotAuthenticated));
}

#[tokio::test]
async fn test_valid_access_token_refreshes_inside_buffer() {
    let h = harness();
    signed_in(&h).await;

    assert_eq!(h.session.valid_access_token().await.unwrap(), "T");
    assert!(h.http.requests_to("/auth/refresh").is_empty());

    h.clock.advance(chrono::Duration::minutes(56));
    h.http.respond("POST", "/auth/refresh", 200, tokens_body("T2", "R2", 3600));
    h.http.respond("GET", "/me", 200, profile_body(7, "night-drive"));

    assert_eq!(h.session.valid_access_token().await.unwrap(), "T2");
    assert_eq!(h.http.requests_to("/auth/refresh").len(), 1);
    assert_eq!(
        h.session.snapshot().tokens.unwrap().expires_at,
        h.clock.now() + chrono::Duration::seconds(3600)
    );
}

#[tokio::test]
async fn test_valid_access_token_falls_back_until_expiry() {
    let h = harness();
    signed_in(&h).await;
    h.clock.advance(chrono::Duration::minutes(58));
    h.http.respond("POST", "/auth/refresh", 502, serde_json::json!({}));

    assert_eq!(h.session.valid_access_token().await.unwrap(), "T");

    h.clock.advance(chrono::Duration::minutes(5));
    h.http.respond("POST", "/auth/refresh", 502, serde_json::json!({}));

    assert!(matches!(
        h.session.valid_access_token().await,
        Err(AuthError::TokenRefreshFailed(_))
    ));
}

#[tokio::test]
async fn test_initiate_login_navigates_to_backend_url() {
    let mut navigator = MockNav::new();
    navigator
        .expect_navigate()
        .withf(|url| url.to_string() == "https://provider.test/authorize?client_id=abc")
        .times(1)
        .returning(|_| Ok(()));

    let h = harness_with(Arc::new(navigator));
    let mut events = h.events.subscribe();
    h.http.respond(
        "GET",
        "/auth/login",
        200,
        serde_json::json!({ "url": "https://provider.test/authorize?client_id=abc" }),
    );

    h.session.initiate_login().await;

    assert_eq!(drain(&mut events), vec![CoreEvent::Auth(AuthEvent::SigningIn)]);
}

#[tokio::test]
async fn test_initiate_login_failure_is_reported_not_navigated() {
    let mut navigator = MockNav::new();
    navigator.expect_navigate().never();

    let h = harness_with(Arc::new(navigator));
    let mut events = h.events.subscribe();
    h.http.respond("GET", "/auth/login", 502, serde_json::json!({}));

    h.session.initiate_login().await;

    let events = drain(&mut events);
    assert!(matches!(
        events.last(),
        Some(CoreEvent::Auth(AuthEvent::AuthError { recoverable: true, .. }))
    ));
    assert_eq!(h.session.phase(), SessionPhase::Anonymous);
}

#[tokio::test]
async fn test_invalidate_token_ignores_superseded_token() {
    let h = harness();
    signed_in(&h).await;

    assert!(!h.session.invalidate_token("old-token", "HTTP 401"));
    assert!(h.session.is_authenticated());

    assert!(h.session.invalidate_token("T", "HTTP 401"));
    assert_eq!(h.session.phase(), SessionPhase::Anonymous);
}

#[tokio::test]
async fn test_invalidate_is_noop_when_anonymous() {
    let h = harness();
    let mut events = h.events.subscribe();
    let before = h.session.generation();

    h.session.invalidate("HTTP 401");

    assert_eq!(h.session.generation(), before);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_subscribers_observe_every_transition() {
    let h = harness();
    let mut rx = h.session.subscribe();
    signed_in(&h).await;

    assert!(rx.has_changed().unwrap());
    assert!(rx.borrow_and_update().is_authenticated());

    h.session.logout().await;
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().phase(), SessionPhase::Anonymous);
}
