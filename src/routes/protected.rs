use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Protected Router Module
///
/// Routes that require a granted navigation. The router is wrapped in the
/// gate middleware layer (see `create_router`), and every handler here also
/// takes the `Granted` extractor, so a denied or unresolved navigation is
/// redirected to `/login` before any protected content can render.
pub fn protected_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /dashboard
        // The role-differentiated dashboard: learner (default, lists the
        // caller's enrollments), educator, or admin variant, composed after
        // the gate grants.
        .route("/dashboard", get(handlers::get_dashboard))
        // GET /me
        // The current identity with its resolved role and capability flags.
        .route("/me", get(handlers::get_me))
        // POST /courses/{id}/enroll
        // The enroll action. Anonymous callers are redirected to /login, as
        // the original flow navigates them to the sign-in view.
        .route("/courses/{id}/enroll", post(handlers::enroll))
}
