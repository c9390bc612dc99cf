use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod backend;
pub mod catalog;
pub mod config;
pub mod gate;
pub mod handlers;
pub mod models;
pub mod role;
pub mod session;
pub mod views;

// Module for routing segregation (Public, Protected).
pub mod routes;
use gate::Granted;
use routes::{protected, public};

// --- Public Re-exports ---

// Makes core state types easily accessible to the binary and the test suite.
pub use backend::{BackendState, HostedBackend, MockBackend};
pub use catalog::CourseCatalog;
pub use config::AppConfig;
pub use role::{RoleResolver, RoleResolverState};
pub use session::{SessionStore, SessionStoreState};

/// ApiDoc
///
/// Auto-generated OpenAPI documentation, aggregating every annotated handler
/// and schema. Served as JSON at `/api-docs/openapi.json` behind the Swagger
/// UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_courses, handlers::get_course_details, handlers::sign_in_page,
        handlers::sign_up_page, handlers::sign_in, handlers::sign_up, handlers::sign_out,
        handlers::get_dashboard, handlers::get_me, handlers::enroll
    ),
    components(
        schemas(
            models::Identity, models::Role, models::RoleFlags, models::Course,
            models::Enrollment, models::Credentials, models::SessionView,
            models::CourseView, models::AuthPrompt, models::Notice,
            views::ViewVariant, views::DashboardView,
        )
    ),
    tags(
        (name = "course-market", description = "Course Marketplace API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, thread-safe container holding every shared service: the
/// process-wide session/role singleton pair, course data access, and the
/// immutable configuration. Views receive all of it read-only.
#[derive(Clone)]
pub struct AppState {
    /// The one Session per browser context, owned here and replaced whole.
    pub sessions: SessionStoreState,
    /// Role resolution with identity-keyed caching and invalidation.
    pub roles: RoleResolverState,
    /// Course/enrollment data access over the backend capability.
    pub catalog: CourseCatalog,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors (the gate in particular) pull individual components from
// the shared AppState.

impl FromRef<AppState> for SessionStoreState {
    fn from_ref(app_state: &AppState) -> SessionStoreState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for RoleResolverState {
    fn from_ref(app_state: &AppState) -> RoleResolverState {
        app_state.roles.clone()
    }
}

impl FromRef<AppState> for CourseCatalog {
    fn from_ref(app_state: &AppState) -> CourseCatalog {
        app_state.catalog.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// gate_middleware
///
/// Route-authorization layer for the protected router. Extracting `Granted`
/// runs the gate's state machine; a denied or unresolved navigation is
/// rejected with a single redirect to `/login` before the handler executes,
/// so no protected content is rendered on denial.
async fn gate_middleware(_granted: Granted, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware,
/// and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: no gate applied.
        .merge(public::public_routes())
        // Protected Routes: behind the authorization gate.
        .merge(
            protected::protected_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), gate_middleware)),
        )
        .with_state(state);

    // 3. Observability and Correlation Layers (applied outermost)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID generation: a unique UUID per request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request tracing: span per request, correlated by id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS (outermost of all)
        .layer(cors)
}

/// trace_span_logger
///
/// Customizes span creation for `TraceLayer`: includes the `x-request-id`
/// header so every log line for one request shares a correlation id.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
