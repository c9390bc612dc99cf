use std::sync::Arc;
use std::time::Duration;

use course_market::backend::{AuthSession, BackendState, MockBackend, SessionChange};
use course_market::models::Identity;
use course_market::session::SessionStore;
use uuid::Uuid;

fn session_for(id: Uuid, email: &str) -> AuthSession {
    AuthSession {
        identity: Identity {
            id,
            email: email.to_string(),
        },
        access_token: format!("mock-token-{id}"),
        expires_at: None,
    }
}

fn store(backend: &Arc<MockBackend>) -> Arc<SessionStore> {
    Arc::new(SessionStore::new(backend.clone() as BackendState))
}

#[tokio::test]
async fn starts_in_the_loading_state() {
    let backend = Arc::new(MockBackend::new());
    let sessions = store(&backend);

    let state = sessions.current();
    assert!(state.is_loading);
    assert!(state.identity.is_none());
}

#[tokio::test]
async fn initialize_settles_to_absent_when_no_session_exists() {
    let backend = Arc::new(MockBackend::new());
    let sessions = store(&backend);

    sessions.initialize().await;

    let state = sessions.current();
    assert!(!state.is_loading);
    assert!(state.identity.is_none());
}

#[tokio::test]
async fn initialize_restores_a_persisted_session() {
    let backend = Arc::new(MockBackend::new());
    let id = Uuid::new_v4();
    backend.seed_session(session_for(id, "restored@example.com")).await;

    let sessions = store(&backend);
    sessions.initialize().await;

    let state = sessions.current();
    assert_eq!(state.identity.map(|i| i.id), Some(id));
}

#[tokio::test]
async fn failed_restore_fails_closed_to_signed_out() {
    let backend = Arc::new(MockBackend::new());
    let id = Uuid::new_v4();
    backend.seed_session(session_for(id, "ghost@example.com")).await;
    backend.fail_current_session();

    let sessions = store(&backend);
    sessions.initialize().await;

    // Never an indeterminate authenticated state: the restore failed, so the
    // visitor is anonymous.
    let state = sessions.current();
    assert!(!state.is_loading);
    assert!(state.identity.is_none());
}

#[tokio::test]
async fn sign_in_replaces_the_state_and_notifies_subscribers() {
    let backend = Arc::new(MockBackend::new());
    backend.seed_user("learner@example.com", "pw").await;

    let sessions = store(&backend);
    sessions.initialize().await;
    let settled_epoch = sessions.current().epoch;

    let mut rx = sessions.subscribe();
    rx.borrow_and_update();

    let identity = sessions
        .sign_in("learner@example.com", "pw")
        .await
        .expect("sign-in should succeed");

    rx.changed().await.expect("subscriber should be notified");
    let state = rx.borrow_and_update().clone();
    assert_eq!(state.identity.as_ref(), Some(&identity));
    assert!(state.epoch > settled_epoch, "every replacement bumps the epoch");
}

#[tokio::test]
async fn sign_in_with_bad_credentials_leaves_the_session_absent() {
    let backend = Arc::new(MockBackend::new());
    backend.seed_user("learner@example.com", "pw").await;

    let sessions = store(&backend);
    sessions.initialize().await;

    let result = sessions.sign_in("learner@example.com", "wrong").await;
    assert!(result.is_err());
    assert!(sessions.current().identity.is_none());
}

#[tokio::test]
async fn sign_out_transitions_to_absent() {
    let backend = Arc::new(MockBackend::new());
    backend.seed_user("learner@example.com", "pw").await;

    let sessions = store(&backend);
    sessions.initialize().await;
    sessions.sign_in("learner@example.com", "pw").await.unwrap();
    assert!(sessions.current().identity.is_some());

    sessions.sign_out().await.unwrap();
    assert!(sessions.current().identity.is_none());
}

#[tokio::test]
async fn external_expiry_notification_signs_the_session_out() {
    let backend = Arc::new(MockBackend::new());
    backend.seed_user("learner@example.com", "pw").await;

    let sessions = store(&backend);
    sessions.initialize().await;
    tokio::spawn(sessions.clone().run_listener());
    sessions.sign_in("learner@example.com", "pw").await.unwrap();

    let mut rx = sessions.subscribe();
    rx.borrow_and_update();

    // The backend announces an expiry the same way it announces any change.
    backend.push_event(SessionChange::SignedOut);

    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            rx.changed().await.expect("listener should keep publishing");
            if rx.borrow_and_update().identity.is_none() {
                break;
            }
        }
    })
    .await
    .expect("the external sign-out should reach the store");
}

#[tokio::test]
async fn settled_waits_out_the_loading_state() {
    let backend = Arc::new(MockBackend::new());
    let sessions = store(&backend);

    let waiter = {
        let sessions = sessions.clone();
        tokio::spawn(async move { sessions.settled().await })
    };

    sessions.initialize().await;

    let state = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("settled should return once initialized")
        .unwrap();
    assert!(!state.is_loading);
}
