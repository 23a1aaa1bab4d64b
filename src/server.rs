//! HTTP server and routes.

mod handlers;
mod state;

pub use handlers::parse_search;
pub use state::{AppState, join_relative};

use axum::{
    Router,
    routing::{get, post},
};
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/all", get(handlers::api_all))
        .route("/search", get(handlers::api_search))
        .route("/progress", get(handlers::api_progress))
        .route("/access", get(handlers::api_access))
        .route("/scan", post(handlers::api_scan));

    let book_routes = Router::new()
        .route("/{format}", get(handlers::book_read))
        .route("/{format}/pages", get(handlers::book_pages));

    Router::new()
        .nest("/api", api_routes)
        .nest("/book", book_routes)
        .route("/cover/{*path}", get(handlers::cover))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Rescan the library every `interval` on a background task.
///
/// The first pass is left to the caller.
pub fn spawn_periodic_scan(state: AppState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // Skip first immediate tick

        loop {
            ticker.tick().await;
            tracing::debug!("Running scheduled library rescan");

            if !state.start_background_scan() {
                tracing::debug!("Previous scan still running");
            }
        }
    })
}
