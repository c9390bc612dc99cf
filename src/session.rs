use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::backend::{BackendError, BackendState, SessionChange};
use crate::models::Identity;

/// SessionState
///
/// The current authentication identity plus its loading state. Exactly one of
/// these is live per process; every update replaces the whole value, so a
/// consumer never observes a partially written session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub is_loading: bool,
    /// Generation counter, bumped on every replacement. The role resolver
    /// tags in-flight work with this value to discard stale results.
    pub epoch: u64,
}

impl SessionState {
    fn loading() -> Self {
        Self {
            identity: None,
            is_loading: true,
            epoch: 0,
        }
    }
}

/// SessionStore
///
/// Owns the process-wide session singleton. On initialization it requests the
/// current session from the backend and registers for change notifications;
/// afterwards it exposes the settled `{identity, is_loading}` state to every
/// consumer and republishes each backend change as an authoritative
/// replacement.
///
/// Failure mode: if the initial restore fails, the identity is treated as
/// absent — the store never parks in an indeterminate authenticated state.
pub struct SessionStore {
    backend: BackendState,
    state: watch::Sender<SessionState>,
    epoch: AtomicU64,
}

impl SessionStore {
    pub fn new(backend: BackendState) -> Self {
        let (state, _) = watch::channel(SessionState::loading());
        Self {
            backend,
            state,
            epoch: AtomicU64::new(0),
        }
    }

    /// initialize
    ///
    /// Asks the backend for the current session and settles the store. Call
    /// once at startup, before serving traffic that depends on the session.
    pub async fn initialize(&self) {
        match self.backend.current_session().await {
            Ok(Some(session)) => self.replace(Some(session.identity)),
            Ok(None) => self.replace(None),
            Err(e) => {
                // Fail closed: an unverifiable session is no session.
                tracing::warn!("session restore failed, treating as signed out: {e}");
                self.replace(None);
            }
        }
    }

    /// run_listener
    ///
    /// Applies backend session-change notifications to the store until the
    /// backend drops its event channel. Spawn once; each event fully replaces
    /// the prior state, so a notification arriving mid-propagation of another
    /// can never interleave fields.
    pub async fn run_listener(self: Arc<Self>) {
        let mut events = self.backend.session_events();
        loop {
            match events.recv().await {
                Ok(SessionChange::SignedIn(session))
                | Ok(SessionChange::TokenRefreshed(session)) => {
                    self.replace(Some(session.identity));
                }
                Ok(SessionChange::SignedOut) => self.replace(None),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    // Skipped notifications are harmless: the next event is
                    // still an authoritative whole-state replacement. Resync
                    // from the backend to be safe.
                    tracing::warn!("session listener lagged, missed {missed} events");
                    self.initialize().await;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn replace(&self, identity: Option<Identity>) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(SessionState {
            identity,
            is_loading: false,
            epoch,
        });
    }

    /// The current state, as one atomic snapshot.
    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Subscribes to session replacements. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// settled
    ///
    /// Waits until the store leaves its loading state and returns the
    /// snapshot. Callers that must not wait forever wrap this in a timeout
    /// and fail closed on expiry.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.state.subscribe();
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if !snapshot.is_loading {
                return snapshot;
            }
            if rx.changed().await.is_err() {
                // Store dropped mid-wait; report the last value, which the
                // gate will treat as unauthenticated.
                return snapshot;
            }
        }
    }

    // --- User-driven transitions ---

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let session = self.backend.sign_in(email, password).await?;
        self.replace(Some(session.identity.clone()));
        Ok(session.identity)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let session = self.backend.sign_up(email, password).await?;
        self.replace(Some(session.identity.clone()));
        Ok(session.identity)
    }

    pub async fn sign_out(&self) -> Result<(), BackendError> {
        // State transitions to absent regardless of whether the remote
        // revocation succeeds.
        let result = self.backend.sign_out().await;
        self.replace(None);
        if let Err(ref e) = result {
            tracing::warn!("remote sign-out failed: {e}");
        }
        result
    }
}

/// SessionStoreState
///
/// The shared handle stored in the application state.
pub type SessionStoreState = Arc<SessionStore>;
