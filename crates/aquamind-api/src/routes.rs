//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression,
//! and all endpoint handlers.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use aquamind_core::error::AquaError;

use crate::handlers;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Dashboard on the configured port plus a dev server on port+1.
    let port = state.config.general.port;
    let dev_port = port.saturating_add(1);
    let origins: Vec<HeaderValue> = [port, dev_port]
        .iter()
        .flat_map(|p| [format!("http://127.0.0.1:{p}"), format!("http://localhost:{p}")])
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let catalog_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/roles", get(handlers::list_roles))
        .route("/roles/{id}", get(handlers::get_role))
        .route("/prompts", get(handlers::prompts));

    let session_routes = Router::new()
        .route(
            "/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route("/sessions/import", post(handlers::import_session))
        .route(
            "/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/{id}/transcript", get(handlers::transcript))
        .route("/sessions/{id}/clear", post(handlers::clear_session))
        .route("/sessions/{id}/export", get(handlers::export_session))
        .route("/sessions/{id}/turns", post(handlers::submit_turn))
        .route("/sessions/{id}/role", put(handlers::set_role))
        .route("/sessions/{id}/voice/start", post(handlers::voice_start))
        .route("/sessions/{id}/voice/stop", post(handlers::voice_stop))
        .route("/sessions/{id}/voice/cancel", post(handlers::voice_cancel))
        .route("/sessions/{id}/stream", get(handlers::stream));

    catalog_routes
        .merge(session_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB, enough for an imported transcript
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured port and serve until `shutdown`
/// resolves.
///
/// Binds to 127.0.0.1 (localhost only).
pub async fn start_server<F>(state: AppState, shutdown: F) -> Result<(), AquaError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = format!("127.0.0.1:{}", state.config.general.port);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AquaError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!(addr = %addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AquaError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
