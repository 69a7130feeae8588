/// API Routes definition

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};
use super::static_files;

pub fn create_router(enable_cors: bool, state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/containers", get(handlers::get_containers))
        .route("/api/system", get(handlers::get_system))
        .route("/api/backup/start", post(handlers::start_backup))
        .route("/api/backup/status", get(handlers::backup_status))
        .route("/api/backups", get(handlers::list_backups))
        .route("/api/health", get(handlers::health_check))
        .route("/download/:filename", get(handlers::download_file))
        .with_state(state);

    let mut app = Router::new()
        .merge(api_routes)
        // Serve the embedded dashboard - must be last to act as catch-all
        .fallback(static_files::static_handler)
        // Add tracing middleware
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app
}
