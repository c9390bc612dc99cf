use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without an identity. Course reads are public by
/// design; the enroll action is not here — it lives behind the gate.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for monitoring and load balancer checks.
        .route("/health", get(|| async { "ok" }))
        // GET /
        // The landing page: the full course catalog.
        .route("/", get(handlers::get_courses))
        // GET /login + POST /login
        // The sign-in view (every denied navigation redirects here) and the
        // credential submission that replaces the process-wide session.
        .route("/login", get(handlers::sign_in_page).post(handlers::sign_in))
        // GET /register + POST /register
        // Registration via the hosted auth service.
        .route(
            "/register",
            get(handlers::sign_up_page).post(handlers::sign_up),
        )
        // GET /courses/{id}
        // Public course detail; includes the caller's enrollment status when
        // an identity is present.
        .route("/courses/{id}", get(handlers::get_course_details))
        // POST /logout
        // Ends the session. Safe for anonymous callers (no-op).
        .route("/logout", post(handlers::sign_out))
}
