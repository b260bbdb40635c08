use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, documents, health, ingest, orgs, upload};
use crate::state::AppState;

/// Creates the main application router with all routes and middleware.
///
/// This function sets up:
/// - CORS middleware from the configured origin allow-list
/// - Health check endpoint
/// - Chat streaming, ingestion, upload and document/org CRUD endpoints
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state);
    Router::new()
        .route("/health", get(health::health))
        .route("/api/chat", post(chat::chat))
        .route("/api/ingest", post(ingest::ingest))
        .route("/api/upload", post(upload::upload))
        .route(
            "/api/documents",
            get(documents::list_documents).delete(documents::delete_document),
        )
        .route("/api/orgs", get(orgs::list_orgs).post(orgs::create_org))
        .route("/api/orgs/:org_url", get(orgs::get_org))
        .with_state(state)
        // PDF uploads routinely exceed the 2 MB default body limit
        .layer(DefaultBodyLimit::max(32 * 1024 * 1024))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let allowed_origins: Vec<HeaderValue> = state
        .settings
        .server
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}
