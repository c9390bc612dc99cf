use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backend::{BackendError, BackendState};
use crate::models::{Identity, Role, RoleFlags};
use crate::session::SessionStoreState;

/// RoleState
///
/// The resolver's answer for one identity: the validated role (or absent) and
/// whether a resolution is still in flight from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoleState {
    pub role: Option<Role>,
    pub is_loading: bool,
}

impl RoleState {
    pub fn absent() -> Self {
        Self {
            role: None,
            is_loading: false,
        }
    }

    pub fn flags(&self) -> RoleFlags {
        RoleFlags::from_role(self.role)
    }
}

/// ProfileRow
///
/// The single `profiles` row the resolver queries, exactly as the backend
/// returns it. The role arrives as a raw string and is validated here, at the
/// data-access boundary.
#[derive(Debug, Deserialize)]
struct ProfileRow {
    role: String,
}

/// RoleResolver
///
/// Derives the role classification for the current identity by querying its
/// remote profile record. Results are cached keyed by identity id for the
/// session's lifetime and invalidated whenever the identity changes.
///
/// Fail-closed throughout: a failed query, a missing row, an unknown role
/// string or a timed-out backend all resolve to `role = None`. An identity
/// whose role cannot be resolved holds no elevated capability — it is never
/// treated as an admin by default.
pub struct RoleResolver {
    backend: BackendState,
    session: SessionStoreState,
    cache: RwLock<HashMap<Uuid, Role>>,
    /// Safety timeout for the profile query; on expiry the resolution fails
    /// closed instead of leaving the caller waiting on a hung backend.
    timeout: Duration,
}

impl RoleResolver {
    pub fn new(backend: BackendState, session: SessionStoreState, timeout: Duration) -> Self {
        Self {
            backend,
            session,
            cache: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// resolve
    ///
    /// Resolves the role for `identity`. An absent identity resolves
    /// immediately with no backend call. A present identity issues at most
    /// one `profiles` query per session (the cache absorbs repeats).
    ///
    /// Stale-result discipline: the query is tagged with the identity id (and
    /// session epoch) it was issued for; if the process-wide identity has
    /// changed by the time the answer lands, the result is discarded and
    /// never cached, so a slow resolution for a previous identity cannot
    /// surface under a new one.
    pub async fn resolve(&self, identity: Option<&Identity>) -> RoleState {
        let Some(identity) = identity else {
            return RoleState::absent();
        };

        if let Some(role) = self.cache.read().await.get(&identity.id).copied() {
            return RoleState {
                role: Some(role),
                is_loading: false,
            };
        }

        let issued_for = identity.id;
        let issued_epoch = self.session.current().epoch;

        let fetched = self.fetch_role(issued_for).await;

        let current = self.session.current();
        let identity_unchanged = current.epoch == issued_epoch
            || current.identity.as_ref().map(|i| i.id) == Some(issued_for);
        if !identity_unchanged {
            tracing::debug!(
                issued_for = %issued_for,
                "discarding stale role resolution for a superseded identity"
            );
            return RoleState::absent();
        }

        match fetched {
            Some(role) => {
                self.cache.write().await.insert(issued_for, role);
                RoleState {
                    role: Some(role),
                    is_loading: false,
                }
            }
            None => RoleState::absent(),
        }
    }

    /// Resolves the role for whatever identity the session settles on.
    pub async fn resolve_current(&self) -> RoleState {
        let session = self.session.settled().await;
        self.resolve(session.identity.as_ref()).await
    }

    async fn fetch_role(&self, id: Uuid) -> Option<Role> {
        let filters = [("id", id.to_string())];
        let query = self.backend.query_one("profiles", &filters);

        let row = match tokio::time::timeout(self.timeout, query).await {
            Ok(Ok(value)) => value,
            Ok(Err(BackendError::NotFound)) => {
                tracing::warn!(user = %id, "no profile row for identity, role unresolved");
                return None;
            }
            Ok(Err(e)) => {
                tracing::error!(user = %id, "profile query failed: {e}");
                return None;
            }
            Err(_) => {
                tracing::error!(user = %id, "profile query timed out after {:?}", self.timeout);
                return None;
            }
        };

        let profile: ProfileRow = match serde_json::from_value(row) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(user = %id, "malformed profile row: {e}");
                return None;
            }
        };

        match Role::parse(&profile.role) {
            Some(role) => Some(role),
            None => {
                // Unknown values are rejected at this boundary, never carried
                // into the view layer as an unrecognized string.
                tracing::warn!(user = %id, raw = %profile.role, "unrecognized role value");
                None
            }
        }
    }

    /// run_invalidation
    ///
    /// Watches session replacements and clears the cache whenever the
    /// identity changes, including the transition to absent. Spawn once; a
    /// stale role for a previous identity must never be visible for a new
    /// one, even transiently.
    pub async fn run_invalidation(self: Arc<Self>) {
        let mut rx = self.session.subscribe();
        let mut last_identity = rx.borrow().identity.as_ref().map(|i| i.id);
        while rx.changed().await.is_ok() {
            let current = rx.borrow_and_update().identity.as_ref().map(|i| i.id);
            if current != last_identity {
                self.cache.write().await.clear();
                last_identity = current;
            }
        }
    }

    /// Diagnostic view of the cache, used by the test suite to assert that a
    /// discarded stale resolution was never cached.
    pub async fn cached_role(&self, id: Uuid) -> Option<Role> {
        self.cache.read().await.get(&id).copied()
    }
}

/// RoleResolverState
///
/// The shared handle stored in the application state.
pub type RoleResolverState = Arc<RoleResolver>;
