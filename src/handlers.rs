use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    gate::Granted,
    models::{AuthPrompt, Course, CourseView, Credentials, Notice, SessionView},
    views::{self, DashboardView},
};

// --- Public views ---

/// get_courses
///
/// [Public Route] The landing page: every course in the catalog. A backend
/// failure renders as an empty listing (logged at the data-access layer).
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Course catalog", body = [Course]))
)]
pub async fn get_courses(State(state): State<AppState>) -> Json<Vec<Course>> {
    Json(state.catalog.list_courses().await)
}

/// get_course_details
///
/// [Public Route] One course's detail view. Anonymous visitors see
/// `enrolled: false`; a signed-in visitor sees whether an enrollment row
/// exists for them.
#[utoipa::path(
    get,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Course detail", body = CourseView),
        (status = 404, description = "No such course")
    )
)]
pub async fn get_course_details(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CourseView>, StatusCode> {
    let Some(course) = state.catalog.fetch_course(id).await else {
        return Err(StatusCode::NOT_FOUND);
    };

    // Public read: a still-loading session is simply treated as anonymous
    // here; the enroll action itself goes through the gate.
    let enrolled = match state.sessions.current().identity {
        Some(identity) => state.catalog.fetch_enrollment_status(identity.id, id).await,
        None => false,
    };

    Ok(Json(CourseView { course, enrolled }))
}

/// sign_in_page
///
/// [Public Route] The sign-in view — the redirect target for every denied
/// navigation.
#[utoipa::path(
    get,
    path = "/login",
    responses((status = 200, description = "Sign-in prompt", body = AuthPrompt))
)]
pub async fn sign_in_page() -> Json<AuthPrompt> {
    Json(AuthPrompt { prompt: "sign_in" })
}

/// sign_up_page
///
/// [Public Route] The registration view.
#[utoipa::path(
    get,
    path = "/register",
    responses((status = 200, description = "Sign-up prompt", body = AuthPrompt))
)]
pub async fn sign_up_page() -> Json<AuthPrompt> {
    Json(AuthPrompt { prompt: "sign_up" })
}

// --- Session transitions ---

/// sign_in
///
/// [Public Route] Credential submission. Success replaces the process-wide
/// session with the new identity and resolves its role; failure surfaces as a
/// notice, not an error.
#[utoipa::path(
    post,
    path = "/login",
    request_body = Credentials,
    responses(
        (status = 200, description = "Signed in", body = SessionView),
        (status = 401, description = "Credentials refused", body = Notice)
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> Result<Json<SessionView>, (StatusCode, Json<Notice>)> {
    match state.sessions.sign_in(&payload.email, &payload.password).await {
        Ok(identity) => {
            let role = state.roles.resolve(Some(&identity)).await;
            Ok(Json(SessionView {
                identity,
                role: role.role,
                flags: role.flags(),
            }))
        }
        Err(e) => {
            tracing::info!("sign-in refused: {e}");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(Notice::failure("Invalid email or password")),
            ))
        }
    }
}

/// sign_up
///
/// [Public Route] Registration through the hosted auth service. The backend
/// provisions the profile row (role `user`); a fresh session is established
/// on success.
#[utoipa::path(
    post,
    path = "/register",
    request_body = Credentials,
    responses(
        (status = 200, description = "Registered and signed in", body = SessionView),
        (status = 400, description = "Registration refused", body = Notice)
    )
)]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> Result<Json<SessionView>, (StatusCode, Json<Notice>)> {
    match state.sessions.sign_up(&payload.email, &payload.password).await {
        Ok(identity) => {
            let role = state.roles.resolve(Some(&identity)).await;
            Ok(Json(SessionView {
                identity,
                role: role.role,
                flags: role.flags(),
            }))
        }
        Err(e) => {
            tracing::info!("sign-up refused: {e}");
            Err((
                StatusCode::BAD_REQUEST,
                Json(Notice::failure("Registration failed")),
            ))
        }
    }
}

/// sign_out
///
/// [Authenticated Route] Ends the session. The local state transitions to
/// absent even if the remote revocation fails.
#[utoipa::path(
    post,
    path = "/logout",
    responses((status = 204, description = "Signed out"))
)]
pub async fn sign_out(State(state): State<AppState>) -> StatusCode {
    // Remote failures are already logged by the store; the session is gone
    // either way.
    let _ = state.sessions.sign_out().await;
    StatusCode::NO_CONTENT
}

// --- Protected views ---

/// get_dashboard
///
/// [Protected Route] Role-differentiated dashboard. The gate has already
/// granted by the time this runs; composition is a pure function of the role
/// flags. The learner variant lists exactly the courses for which an
/// enrollment row exists for this user.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Composed dashboard", body = DashboardView),
        (status = 303, description = "Anonymous visitor, redirected to /login")
    )
)]
pub async fn get_dashboard(
    granted: Granted,
    State(state): State<AppState>,
) -> Json<DashboardView> {
    let variant = views::compose(&granted.flags);
    let enrollments = state.catalog.fetch_enrollments(granted.identity.id).await;
    Json(DashboardView {
        variant,
        enrollments,
    })
}

/// get_me
///
/// [Protected Route] The current identity, its resolved role and derived
/// capability flags.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current session", body = SessionView),
        (status = 303, description = "Anonymous visitor, redirected to /login")
    )
)]
pub async fn get_me(granted: Granted) -> Json<SessionView> {
    Json(SessionView {
        identity: granted.identity,
        role: granted.role,
        flags: granted.flags,
    })
}

/// enroll
///
/// [Protected Route] Creates one enrollment row for (caller, course).
/// Backend rejection — a duplicate pair included — surfaces as a failure
/// notice, never as an uncaught error.
#[utoipa::path(
    post,
    path = "/courses/{id}/enroll",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Enrolled", body = Notice),
        (status = 303, description = "Anonymous visitor, redirected to /login"),
        (status = 409, description = "Enrollment refused", body = Notice)
    )
)]
pub async fn enroll(
    granted: Granted,
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<Notice>, (StatusCode, Json<Notice>)> {
    if state.catalog.enroll(granted.identity.id, course_id).await {
        Ok(Json(Notice::ok("Successfully enrolled in the course")))
    } else {
        Err((
            StatusCode::CONFLICT,
            Json(Notice::failure("Failed to enroll in the course")),
        ))
    }
}
