use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use crate::models::{Course, Identity};

/// BackendError
///
/// Failure modes of the hosted backend, as seen from this front end.
/// "No row" on a single-row query is `NotFound`; a rejected mutation or
/// credential check is `Rejected`; everything else (network, 5xx, malformed
/// payloads) is `Remote`.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("record not found")]
    NotFound,
    #[error("backend rejected the request: {0}")]
    Rejected(String),
    #[error("backend request failed: {0}")]
    Remote(String),
}

/// AuthSession
///
/// A session as issued by the hosted auth service: the resolved identity plus
/// the access token used for subsequent queries.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub identity: Identity,
    pub access_token: String,
    /// Unix timestamp after which the token is no longer valid, when known.
    pub expires_at: Option<i64>,
}

/// SessionChange
///
/// Change notifications published by the backend client. Each event is an
/// authoritative replacement of the whole session, never a delta.
#[derive(Debug, Clone)]
pub enum SessionChange {
    SignedIn(AuthSession),
    SignedOut,
    TokenRefreshed(AuthSession),
}

/// BackendClient
///
/// The opaque capability surface of the hosted data/auth backend. Everything
/// this application persists or authenticates goes through this trait; the
/// concrete transport (`HostedBackend`) is swapped for `MockBackend` in tests
/// without touching any caller.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;
    async fn sign_out(&self) -> Result<(), BackendError>;
    /// Restores the previously established session, if any. `Ok(None)` means
    /// there is no session; `Err` means the restore itself failed and the
    /// caller must fail closed to unauthenticated.
    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError>;
    /// Subscribes to session-change notifications. Dropping the receiver is
    /// the unsubscribe.
    fn session_events(&self) -> broadcast::Receiver<SessionChange>;

    /// Fetches exactly one row matching the equality filters.
    async fn query_one(&self, table: &str, filters: &[(&str, String)])
    -> Result<Value, BackendError>;
    /// Fetches all rows matching the equality filters, in the backend's
    /// default order.
    async fn query_many(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<Value>, BackendError>;
    async fn insert(&self, table: &str, row: Value) -> Result<(), BackendError>;
}

/// BackendState
///
/// The concrete type used to share backend access across the application state.
pub type BackendState = Arc<dyn BackendClient>;

// --- Token claims ---

/// Claims
///
/// Payload of a backend-issued access token. This front end never holds the
/// signing secret, so claims are decoded without signature validation — the
/// backend re-validates the token on every query anyway. Decoding locally is
/// only used to recover the identity and notice expiry.
#[derive(Debug, Deserialize)]
struct Claims {
    /// Subject: the user's UUID, shared with the `profiles` table.
    sub: Uuid,
    email: Option<String>,
    /// Expiration timestamp (seconds since epoch).
    exp: i64,
}

fn decode_claims(token: &str) -> Result<Claims, BackendError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    // Expiry is handled explicitly by the caller so that an expired stored
    // token maps to "no session" rather than an error.
    validation.validate_exp = false;
    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| BackendError::Remote(format!("malformed access token: {e}")))
}

// --- The real implementation (hosted HTTP backend) ---

/// HostedBackend
///
/// Concrete `BackendClient` speaking the hosted backend's HTTP surface:
/// `/auth/v1/*` for identity and `/rest/v1/{table}` for declarative queries.
/// The anon key accompanies every request; authenticated requests also carry
/// the session's access token as a bearer credential.
pub struct HostedBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<SessionChange>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: Uuid,
    email: Option<String>,
}

impl HostedBackend {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            session: RwLock::new(None),
            events,
        }
    }

    async fn bearer(&self) -> String {
        // Anonymous queries fall back to the anon key, matching the hosted
        // backend's row-level security model.
        match self.session.read().await.as_ref() {
            Some(s) => s.access_token.clone(),
            None => self.anon_key.clone(),
        }
    }

    async fn install(&self, session: AuthSession) {
        *self.session.write().await = Some(session.clone());
        let _ = self.events.send(SessionChange::SignedIn(session));
    }

    fn session_from_token(access_token: String) -> Result<AuthSession, BackendError> {
        let claims = decode_claims(&access_token)?;
        Ok(AuthSession {
            identity: Identity {
                id: claims.sub,
                email: claims.email.unwrap_or_default(),
            },
            expires_at: Some(claims.exp),
            access_token,
        })
    }

    fn rest_url(&self, table: &str, filters: &[(&str, String)]) -> String {
        let mut url = format!("{}/rest/v1/{}?select=*", self.base_url, table);
        for (column, value) in filters {
            url.push('&');
            url.push_str(column);
            url.push_str("=eq.");
            url.push_str(value);
        }
        url
    }
}

#[async_trait]
impl BackendClient for HostedBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| BackendError::Remote(e.to_string()))?;

        if !response.status().is_success() {
            // Wrong password, unknown user, unconfirmed email — all of these
            // are the backend's call, surfaced as a rejection.
            return Err(BackendError::Rejected(format!(
                "sign-in refused ({})",
                response.status()
            )));
        }

        let payload = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| BackendError::Remote(e.to_string()))?;
        let session = AuthSession {
            identity: Identity {
                id: payload.user.id,
                email: payload.user.email.unwrap_or_default(),
            },
            expires_at: decode_claims(&payload.access_token).ok().map(|c| c.exp),
            access_token: payload.access_token,
        };
        self.install(session.clone()).await;
        Ok(session)
    }

    /// sign_up
    ///
    /// Registers against the hosted auth service, then signs in with the same
    /// credentials to establish the session. The backend provisions the
    /// mirroring `profiles` row (role `user`) on registration.
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let url = format!("{}/auth/v1/signup", self.base_url);
        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| BackendError::Remote(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::Rejected(format!(
                "sign-up refused ({})",
                response.status()
            )));
        }

        self.sign_in(email, password).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        // Local state is cleared first so the session is gone even if the
        // remote revocation fails.
        let previous = self.session.write().await.take();
        let _ = self.events.send(SessionChange::SignedOut);

        if let Some(session) = previous {
            let url = format!("{}/auth/v1/logout", self.base_url);
            self.http
                .post(url)
                .header("apikey", &self.anon_key)
                .bearer_auth(session.access_token)
                .send()
                .await
                .map_err(|e| BackendError::Remote(e.to_string()))?;
        }
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError> {
        let stored = self.session.read().await.clone();
        let Some(session) = stored else {
            return Ok(None);
        };

        // An expired stored token is "no session", not an error; it also
        // notifies subscribers the way an external expiry would.
        let expired = match session.expires_at {
            Some(exp) => exp <= chrono::Utc::now().timestamp(),
            None => match Self::session_from_token(session.access_token.clone()) {
                Ok(decoded) => decoded
                    .expires_at
                    .is_some_and(|exp| exp <= chrono::Utc::now().timestamp()),
                Err(_) => true,
            },
        };
        if expired {
            *self.session.write().await = None;
            let _ = self.events.send(SessionChange::SignedOut);
            return Ok(None);
        }
        Ok(Some(session))
    }

    fn session_events(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }

    async fn query_one(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Value, BackendError> {
        let response = self
            .http
            .get(self.rest_url(table, filters))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer().await)
            // Single-object representation: the backend answers 406 when the
            // filter does not match exactly one row.
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await
            .map_err(|e| BackendError::Remote(e.to_string()))?;

        match response.status().as_u16() {
            200 => response
                .json::<Value>()
                .await
                .map_err(|e| BackendError::Remote(e.to_string())),
            404 | 406 => Err(BackendError::NotFound),
            status => Err(BackendError::Remote(format!(
                "query_one {table} failed with status {status}"
            ))),
        }
    }

    async fn query_many(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<Value>, BackendError> {
        let response = self
            .http
            .get(self.rest_url(table, filters))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer().await)
            .send()
            .await
            .map_err(|e| BackendError::Remote(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::Remote(format!(
                "query_many {table} failed with status {}",
                response.status()
            )));
        }
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| BackendError::Remote(e.to_string()))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<(), BackendError> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer().await)
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await
            .map_err(|e| BackendError::Remote(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            // Constraint violations (duplicate enrollment) land here.
            Err(BackendError::Rejected(format!(
                "insert into {table} refused ({status})"
            )))
        } else {
            Err(BackendError::Remote(format!(
                "insert into {table} failed with status {status}"
            )))
        }
    }
}

// --- The mock implementation (for tests) ---

/// MockBackend
///
/// In-memory `BackendClient` used by the test suite. Holds the same tables
/// the hosted backend exposes (`profiles`, `courses`, `enrollments`) plus
/// failure and delay injection knobs for exercising fail-closed paths and the
/// stale-resolution race.
pub struct MockBackend {
    users: RwLock<HashMap<String, (String, Uuid)>>,
    /// Raw role strings, so tests can inject values outside the closed set.
    profiles: RwLock<HashMap<Uuid, String>>,
    courses: RwLock<Vec<Course>>,
    enrollments: RwLock<HashSet<(Uuid, Uuid)>>,
    restored: RwLock<Option<AuthSession>>,

    fail_current_session: AtomicBool,
    fail_profiles: AtomicBool,
    fail_enrollments: AtomicBool,
    fail_insert: AtomicBool,
    profile_delays: RwLock<HashMap<Uuid, Duration>>,
    profile_queries: AtomicUsize,

    events: broadcast::Sender<SessionChange>,
}

impl MockBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            users: RwLock::new(HashMap::new()),
            profiles: RwLock::new(HashMap::new()),
            courses: RwLock::new(Vec::new()),
            enrollments: RwLock::new(HashSet::new()),
            restored: RwLock::new(None),
            fail_current_session: AtomicBool::new(false),
            fail_profiles: AtomicBool::new(false),
            fail_enrollments: AtomicBool::new(false),
            fail_insert: AtomicBool::new(false),
            profile_delays: RwLock::new(HashMap::new()),
            profile_queries: AtomicUsize::new(0),
            events,
        }
    }

    // --- Seeding ---

    pub async fn seed_user(&self, email: &str, password: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.users
            .write()
            .await
            .insert(email.to_string(), (password.to_string(), id));
        id
    }

    pub async fn seed_profile(&self, id: Uuid, role: &str) {
        self.profiles.write().await.insert(id, role.to_string());
    }

    pub async fn seed_course(&self, title: &str, price: f64) -> Course {
        let course = Course {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            instructor_id: None,
            price,
            image: None,
            rating: None,
            created_at: Some(chrono::Utc::now()),
        };
        self.courses.write().await.push(course.clone());
        course
    }

    pub async fn seed_enrollment(&self, user_id: Uuid, course_id: Uuid) {
        self.enrollments.write().await.insert((user_id, course_id));
    }

    pub async fn seed_session(&self, session: AuthSession) {
        *self.restored.write().await = Some(session);
    }

    // --- Failure / delay injection ---

    pub fn fail_current_session(&self) {
        self.fail_current_session.store(true, Ordering::SeqCst);
    }

    pub fn fail_profiles(&self, fail: bool) {
        self.fail_profiles.store(fail, Ordering::SeqCst);
    }

    pub fn fail_enrollments(&self, fail: bool) {
        self.fail_enrollments.store(fail, Ordering::SeqCst);
    }

    pub fn fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    pub async fn delay_profile(&self, id: Uuid, delay: Duration) {
        self.profile_delays.write().await.insert(id, delay);
    }

    pub fn profile_query_count(&self) -> usize {
        self.profile_queries.load(Ordering::SeqCst)
    }

    /// Simulates an externally originated session change (token refresh,
    /// expiry) the way the hosted backend would announce one.
    pub fn push_event(&self, change: SessionChange) {
        let _ = self.events.send(change);
    }

    fn mock_session(id: Uuid, email: &str) -> AuthSession {
        AuthSession {
            identity: Identity {
                id,
                email: email.to_string(),
            },
            access_token: format!("mock-token-{id}"),
            expires_at: None,
        }
    }

    fn filter<'f>(filters: &'f [(&str, String)], column: &str) -> Option<&'f str> {
        filters
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v.as_str())
    }

    fn filter_uuid(filters: &[(&str, String)], column: &str) -> Result<Uuid, BackendError> {
        Self::filter(filters, column)
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| BackendError::Remote(format!("missing or invalid filter {column}")))
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let session = {
            let users = self.users.read().await;
            match users.get(email) {
                Some((stored, id)) if stored == password => Self::mock_session(*id, email),
                _ => return Err(BackendError::Rejected("invalid credentials".to_string())),
            }
        };
        *self.restored.write().await = Some(session.clone());
        let _ = self.events.send(SessionChange::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        {
            let mut users = self.users.write().await;
            if users.contains_key(email) {
                return Err(BackendError::Rejected("email already registered".to_string()));
            }
            let id = Uuid::new_v4();
            users.insert(email.to_string(), (password.to_string(), id));
            // The hosted backend provisions the profile row on registration.
            self.profiles.write().await.insert(id, "user".to_string());
        }
        self.sign_in(email, password).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        *self.restored.write().await = None;
        let _ = self.events.send(SessionChange::SignedOut);
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError> {
        if self.fail_current_session.load(Ordering::SeqCst) {
            return Err(BackendError::Remote("session restore failed".to_string()));
        }
        Ok(self.restored.read().await.clone())
    }

    fn session_events(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }

    async fn query_one(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Value, BackendError> {
        match table {
            "profiles" => {
                self.profile_queries.fetch_add(1, Ordering::SeqCst);
                let id = Self::filter_uuid(filters, "id")?;
                let delay = self.profile_delays.read().await.get(&id).copied();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if self.fail_profiles.load(Ordering::SeqCst) {
                    return Err(BackendError::Remote("profiles unavailable".to_string()));
                }
                match self.profiles.read().await.get(&id) {
                    Some(role) => Ok(json!({ "id": id, "role": role })),
                    None => Err(BackendError::NotFound),
                }
            }
            "enrollments" => {
                if self.fail_enrollments.load(Ordering::SeqCst) {
                    return Err(BackendError::Remote("enrollments unavailable".to_string()));
                }
                let user_id = Self::filter_uuid(filters, "user_id")?;
                let course_id = Self::filter_uuid(filters, "course_id")?;
                if self.enrollments.read().await.contains(&(user_id, course_id)) {
                    Ok(json!({ "user_id": user_id, "course_id": course_id }))
                } else {
                    Err(BackendError::NotFound)
                }
            }
            "courses" => {
                let id = Self::filter_uuid(filters, "id")?;
                let courses = self.courses.read().await;
                match courses.iter().find(|c| c.id == id) {
                    Some(course) => serde_json::to_value(course)
                        .map_err(|e| BackendError::Remote(e.to_string())),
                    None => Err(BackendError::NotFound),
                }
            }
            other => Err(BackendError::Remote(format!("unknown table {other}"))),
        }
    }

    async fn query_many(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<Value>, BackendError> {
        match table {
            "courses" => {
                let courses = self.courses.read().await;
                courses
                    .iter()
                    .map(|c| serde_json::to_value(c).map_err(|e| BackendError::Remote(e.to_string())))
                    .collect()
            }
            "enrollments" => {
                if self.fail_enrollments.load(Ordering::SeqCst) {
                    return Err(BackendError::Remote("enrollments unavailable".to_string()));
                }
                let user_id = Self::filter_uuid(filters, "user_id")?;
                Ok(self
                    .enrollments
                    .read()
                    .await
                    .iter()
                    .filter(|(u, _)| *u == user_id)
                    .map(|(u, c)| json!({ "user_id": u, "course_id": c }))
                    .collect())
            }
            other => Err(BackendError::Remote(format!("unknown table {other}"))),
        }
    }

    async fn insert(&self, table: &str, row: Value) -> Result<(), BackendError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(BackendError::Remote("insert unavailable".to_string()));
        }
        match table {
            "enrollments" => {
                let parsed: crate::models::Enrollment = serde_json::from_value(row)
                    .map_err(|e| BackendError::Remote(e.to_string()))?;
                let mut enrollments = self.enrollments.write().await;
                if !enrollments.insert((parsed.user_id, parsed.course_id)) {
                    // Composite-key conflict, as the hosted backend reports it.
                    return Err(BackendError::Rejected("duplicate enrollment".to_string()));
                }
                Ok(())
            }
            other => Err(BackendError::Remote(format!("unknown table {other}"))),
        }
    }
}
