use std::sync::Arc;
use std::time::Duration;

use course_market::{
    AppState,
    backend::{BackendState, HostedBackend},
    catalog::CourseCatalog,
    config::{AppConfig, Env},
    create_router,
    role::{RoleResolver, RoleResolverState},
    session::{SessionStore, SessionStoreState},
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Asynchronous entry point: configuration, logging, backend client, the
/// session/role singleton pair, and the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "course_market=debug,tower_http=info,axum=trace".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            // LOCAL: pretty output for human readability.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // PROD: JSON output for centralized log aggregation.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // The anon key is the one required secret. Its absence does not prevent
    // boot: the application runs degraded, with every backend call failing
    // closed to unauthenticated/empty states.
    if config.is_degraded() {
        tracing::error!(
            "BACKEND_ANON_KEY is not set; starting degraded — all backend calls will fail"
        );
    }

    // 4. Backend Client Initialization (the opaque hosted service)
    let backend =
        Arc::new(HostedBackend::new(&config.backend_url, &config.anon_key)) as BackendState;

    // 5. Session/Role Singleton Assembly
    // One SessionStore per browser context; the resolver shares it for
    // epoch-tagged invalidation.
    let sessions = Arc::new(SessionStore::new(backend.clone())) as SessionStoreState;
    let roles = Arc::new(RoleResolver::new(
        backend.clone(),
        sessions.clone(),
        Duration::from_secs(config.resolve_timeout_secs),
    )) as RoleResolverState;

    // Settle the initial session (fail-closed on restore errors), then keep
    // applying backend change notifications and invalidating cached roles.
    sessions.initialize().await;
    tokio::spawn(sessions.clone().run_listener());
    tokio::spawn(roles.clone().run_invalidation());

    // 6. Unified State Assembly
    let catalog = CourseCatalog::new(backend);
    let app_state = AppState {
        sessions,
        roles,
        catalog,
        config,
    };

    // 7. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind("0.0.0.0:3000").await.unwrap();

    tracing::info!("HTTP server bound successfully.");
    tracing::info!("Listening on 0.0.0.0:3000");
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:3000/swagger-ui");

    axum::serve(listener, app).await.unwrap();
}
