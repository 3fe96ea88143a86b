//! Session integration tests
//!
//! Login, logout, identity switches and startup paths, driven through the
//! in-memory provider and store.

mod common;

use assert_matches::assert_matches;
use common::*;
use doc_session::memory::{FaultPoint, MemoryIdentityProvider};
use doc_session::session::{SessionDependent, SessionState, INITIAL_AUTH_FAILED_MESSAGE};
use doc_session::shared::document::LAST_ACCESSED_FIELD;
use doc_session::shared::error::{
    AuthFailureKind, ProviderErrorCode, SessionError, StoreErrorCode, StoreOperation,
};
use doc_session::shared::{AppConfig, Identity};
use doc_session::view::{
    AuthMode, ViewState, BACKEND_MISCONFIGURED_MESSAGE, SAVE_FAILED_MESSAGE,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_sign_in_reaches_dashboard_and_bootstraps_document() {
    let (session, _provider, store) =
        flat_session(MemoryIdentityProvider::new().with_account("u1", "a@b.com", "secret"));

    session.pump().await;
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert_eq!(
        session.view(AuthMode::SignIn),
        ViewState::LoginOrSignup(AuthMode::SignIn)
    );

    session.sign_in("a@b.com", "secret").await.unwrap();

    let expected = Identity::with_email("u1", "a@b.com");
    assert_eq!(session.view(AuthMode::SignIn), ViewState::Dashboard(expected));

    let path = profile_path("u1");
    assert_eq!(path.as_str(), "users/u1/profile");
    assert_eq!(session.documents().current_path(), Some(path.clone()));
    assert!(session.documents().is_subscribed());

    let stats = store.stats(&path);
    assert_eq!(stats.exists_calls, 1);
    assert_eq!(stats.writes, 1);
    assert_eq!(stats.subscribes, 1);

    // the subscription hands back exactly what the bootstrap wrote
    let stored = store.document(&path).unwrap();
    let record = session.documents().status().record.unwrap();
    assert!(record.exists);
    assert_eq!(record.fields, stored);
    assert_eq!(record.fields["userId"], json!("u1"));
    assert_eq!(record.fields["status"], json!("active"));
    assert!(record.fields.contains_key(LAST_ACCESSED_FIELD));
    assert!(!record.has_pending_writes);
}

#[tokio::test]
async fn test_wrong_password_keeps_session_signed_out() {
    let (session, _provider, store) =
        flat_session(MemoryIdentityProvider::new().with_account("u1", "a@b.com", "secret"));
    session.pump().await;

    let result = session.sign_in("a@b.com", "not-it").await;

    assert_eq!(
        result,
        Err(SessionError::AuthFailure {
            kind: AuthFailureKind::WrongPassword
        })
    );
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(session.documents().attached_identity().is_none());
    assert_eq!(store.stats(&profile_path("u1")).exists_calls, 0);
}

#[tokio::test]
async fn test_sign_in_error_kinds_are_translated() {
    let (session, provider, _store) =
        flat_session(MemoryIdentityProvider::new().with_account("u1", "a@b.com", "secret"));
    session.pump().await;

    let unknown = session.sign_in("nobody@b.com", "secret").await.unwrap_err();
    assert_eq!(unknown.auth_kind(), Some(AuthFailureKind::UserNotFound));

    let malformed = session.sign_in("no-at-sign", "secret").await.unwrap_err();
    assert_eq!(malformed.auth_kind(), Some(AuthFailureKind::InvalidEmail));

    provider.fail_next(ProviderErrorCode::NetworkRequestFailed);
    let offline = session.sign_in("a@b.com", "secret").await.unwrap_err();
    assert_eq!(offline.auth_kind(), Some(AuthFailureKind::ProviderUnavailable));

    assert_eq!(session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_empty_password_is_a_wrong_password() {
    let (session, _provider, _store) =
        flat_session(MemoryIdentityProvider::new().with_account("u1", "a@b.com", "secret"));
    session.pump().await;

    let result = session.sign_in("a@b.com", "").await;

    assert_eq!(
        result,
        Err(SessionError::AuthFailure {
            kind: AuthFailureKind::WrongPassword
        })
    );
    assert_eq!(session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_failed_bootstrap_shows_banner_and_can_be_retried() {
    let (session, _provider, store) =
        flat_session(MemoryIdentityProvider::new().with_account("u1", "a@b.com", "secret"));
    session.pump().await;
    store.fail_next(FaultPoint::Write, StoreErrorCode::PermissionDenied);

    session.sign_in("a@b.com", "secret").await.unwrap();

    assert!(session.state().is_authenticated());
    assert!(!session.documents().is_subscribed());
    assert_eq!(
        session.documents().status().error,
        Some(SessionError::store(
            StoreOperation::BootstrapWrite,
            StoreErrorCode::PermissionDenied
        ))
    );
    let summary = session.dashboard().unwrap();
    assert_eq!(summary.banner.as_deref(), Some(SAVE_FAILED_MESSAGE));
    assert!(summary.data.is_none());

    session.retry_documents().await.unwrap();

    assert!(session.documents().is_subscribed());
    let summary = session.dashboard().unwrap();
    assert!(summary.banner.is_none());
    assert!(summary.data.is_some());
    assert!(store.document(&profile_path("u1")).is_some());
}

#[tokio::test]
async fn test_retry_documents_needs_a_signed_in_user() {
    let (session, _provider, _store) = flat_session(MemoryIdentityProvider::new());
    session.pump().await;
    assert_eq!(session.retry_documents().await, Err(SessionError::NotAttached));
}

#[tokio::test]
async fn test_sign_up_creates_account_and_document() {
    let (session, _provider, store) =
        flat_session(MemoryIdentityProvider::new().with_account("u1", "taken@b.com", "secret"));
    session.pump().await;

    let duplicate = session.sign_up("taken@b.com", "another1").await.unwrap_err();
    assert_eq!(duplicate.auth_kind(), Some(AuthFailureKind::EmailAlreadyInUse));

    let weak = session.sign_up("new@b.com", "123").await.unwrap_err();
    assert_eq!(weak.auth_kind(), Some(AuthFailureKind::InvalidCredentialsFormat));

    session.sign_up("new@b.com", "longpass").await.unwrap();
    let identity = session.state().identity().cloned().unwrap();
    assert_eq!(identity.email.as_deref(), Some("new@b.com"));

    let fields = store.document(&profile_path(&identity.id)).unwrap();
    assert_eq!(
        fields["message"],
        json!("Hello, new@b.com! This is your protected content.")
    );
}

#[tokio::test]
async fn test_sign_out_releases_subscription_before_state_changes() {
    let (session, provider, store) =
        flat_session(MemoryIdentityProvider::new().with_account("u1", "a@b.com", "secret"));
    let probe = Arc::new(ReleaseProbe {
        state: session.manager().subscribe(),
        store: Arc::clone(&store),
        path: profile_path("u1"),
        observed: Mutex::new(Vec::new()),
    });
    session
        .manager()
        .register_dependent(Arc::clone(&probe) as Arc<dyn SessionDependent>);

    session.pump().await;
    session.sign_in("a@b.com", "secret").await.unwrap();
    assert_eq!(store.subscriber_count(&profile_path("u1")), 1);

    session.sign_out().await.unwrap();

    let observed = probe.observed.lock().unwrap().clone();
    assert_eq!(observed.len(), 1);
    assert!(observed[0].state_at_release.is_authenticated());
    assert_eq!(observed[0].open_subscriptions, 0);

    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(session.documents().status().record.is_none());
    assert!(provider.current_identity().is_none());
}

#[tokio::test]
async fn test_remote_logout_is_handled_like_sign_out() {
    let (session, provider, store) =
        flat_session(MemoryIdentityProvider::new().with_account("u1", "a@b.com", "secret"));
    session.pump().await;
    session.sign_in("a@b.com", "secret").await.unwrap();

    provider.revoke_session();
    session.pump().await;

    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert_eq!(store.subscriber_count(&profile_path("u1")), 0);
    assert!(!session.documents().is_subscribed());
}

#[tokio::test]
async fn test_identity_switch_moves_subscription() {
    let (session, provider, store) = flat_session(MemoryIdentityProvider::new());
    session.pump().await;

    provider.push_identity(user("alice"));
    session.pump().await;
    assert_eq!(store.subscriber_count(&profile_path("alice")), 1);

    provider.push_identity(user("bob"));
    session.pump().await;

    assert_eq!(store.subscriber_count(&profile_path("alice")), 0);
    assert_eq!(store.subscriber_count(&profile_path("bob")), 1);
    let record = session.documents().status().record.unwrap();
    assert_eq!(record.path, profile_path("bob"));
    assert_eq!(record.fields["userId"], json!("bob"));
}

#[tokio::test]
async fn test_repeated_push_for_same_identity_is_idempotent() {
    let (session, provider, store) = flat_session(MemoryIdentityProvider::new());
    session.pump().await;

    provider.push_identity(user("alice"));
    provider.push_identity(user("alice"));
    session.pump().await;

    let stats = store.stats(&profile_path("alice"));
    assert_eq!(stats.exists_calls, 1);
    assert_eq!(stats.subscribes, 1);
}

#[tokio::test]
async fn test_start_signs_in_anonymously_without_token() {
    let (session, _provider, store) = flat_session(MemoryIdentityProvider::new());

    session.start().await.unwrap();

    let identity = session.state().identity().cloned().unwrap();
    assert!(identity.is_anonymous);
    assert_eq!(identity.display_label(), "Anonymous User");
    assert_eq!(
        store.document(&profile_path(&identity.id)).unwrap()["message"],
        json!("Hello, User! This is your protected content.")
    );
}

#[tokio::test]
async fn test_start_uses_configured_token() {
    let mut config = valid_config();
    config.initial_auth_token = Some("tok-1".to_string());
    let provider = MemoryIdentityProvider::new().with_token("tok-1", user("token-user"));
    let (session, _provider, _store) = flat_session_with(config, provider);

    session.start().await.unwrap();

    assert_eq!(session.state(), SessionState::Authenticated(user("token-user")));
}

#[tokio::test]
async fn test_start_keeps_stored_session() {
    let provider = MemoryIdentityProvider::new().with_stored_session(user("returning"));
    let (session, _provider, _store) = flat_session(provider);

    session.start().await.unwrap();

    assert_eq!(session.state(), SessionState::Authenticated(user("returning")));
    assert!(session.documents().is_subscribed());
}

#[tokio::test]
async fn test_failed_startup_sign_in_is_session_level_error() {
    let mut config = valid_config();
    config.initial_auth_token = Some("unknown-token".to_string());
    let (session, _provider, _store) =
        flat_session_with(config, MemoryIdentityProvider::new());

    let result = session.start().await;

    assert_eq!(result, Err(SessionError::InitialAuthFailed));
    assert_eq!(
        session.state(),
        SessionState::AuthError(INITIAL_AUTH_FAILED_MESSAGE.to_string())
    );
    assert_eq!(
        session.view(AuthMode::SignIn),
        ViewState::AuthError(INITIAL_AUTH_FAILED_MESSAGE.to_string())
    );
}

#[tokio::test]
async fn test_unreachable_provider_at_startup_is_config_error() {
    let provider = MemoryIdentityProvider::new();
    provider.fail_next(ProviderErrorCode::NetworkRequestFailed);
    let (session, provider, _store) = flat_session(provider);

    assert_matches!(session.start().await, Err(SessionError::ConfigInvalid { .. }));
    assert_eq!(session.state(), SessionState::ConfigError);
    assert_eq!(
        session.view(AuthMode::SignIn),
        ViewState::AuthError(BACKEND_MISCONFIGURED_MESSAGE.to_string())
    );

    // terminal until reload
    provider.push_identity(user("late"));
    session.pump().await;
    assert_eq!(session.state(), SessionState::ConfigError);
    assert!(session.documents().attached_identity().is_none());
}

#[tokio::test]
async fn test_auth_error_survives_sign_out_push_but_not_sign_in() {
    let mut config = valid_config();
    config.initial_auth_token = Some("bad".to_string());
    let (session, provider, _store) =
        flat_session_with(config, MemoryIdentityProvider::new());
    let _ = session.start().await;

    provider.revoke_session();
    session.pump().await;
    assert!(session.state().is_terminal());

    provider.push_identity(user("late"));
    session.pump().await;
    assert_eq!(session.state(), SessionState::Authenticated(user("late")));
}

#[tokio::test]
async fn test_invalid_config_never_touches_provider() {
    let (session, provider, _store) =
        flat_session_with(AppConfig::default(), MemoryIdentityProvider::new());

    assert_eq!(provider.listener_count(), 0);
    assert_eq!(session.state(), SessionState::ConfigError);
    assert_eq!(session.view(AuthMode::SignIn), ViewState::ConfigError);

    assert_matches!(session.start().await, Err(SessionError::ConfigInvalid { .. }));
    assert_matches!(
        session.sign_in("a@b.com", "secret").await,
        Err(SessionError::ConfigInvalid { .. })
    );

    provider.push_identity(user("ignored"));
    session.pump().await;
    assert_eq!(session.state(), SessionState::ConfigError);
}

#[tokio::test]
async fn test_shutdown_releases_listener_and_subscription() {
    let (session, provider, store) =
        flat_session(MemoryIdentityProvider::new().with_account("u1", "a@b.com", "secret"));
    session.pump().await;
    session.sign_in("a@b.com", "secret").await.unwrap();
    assert_eq!(provider.listener_count(), 1);

    session.shutdown();
    session.shutdown();

    assert_eq!(provider.listener_count(), 0);
    assert_eq!(store.subscriber_count(&profile_path("u1")), 0);
}

#[tokio::test]
async fn test_dropping_session_removes_listener() {
    let (session, provider, _store) = flat_session(MemoryIdentityProvider::new());
    assert_eq!(provider.listener_count(), 1);
    drop(session);
    assert_eq!(provider.listener_count(), 0);
}

#[tokio::test]
async fn test_dashboard_summary_follows_document() {
    let (session, _provider, _store) =
        flat_session(MemoryIdentityProvider::new().with_account("u1", "a@b.com", "secret"));
    session.pump().await;
    assert!(session.dashboard().is_none());

    session.sign_in("a@b.com", "secret").await.unwrap();

    let summary = session.dashboard().unwrap();
    assert_eq!(summary.user_label, "a@b.com");
    assert_eq!(summary.user_id, "u1");
    assert!(summary.data.unwrap().contains("\"status\": \"active\""));
    assert!(summary.last_synced_at.is_some());
    assert!(summary.banner.is_none());
}
