//! Route handlers and router assembly.

pub mod documents;
pub mod feedback;
pub mod health;
pub mod validation;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use covenant_core::Lifecycle;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<Lifecycle>,
    /// Owner recorded for uploads without an `x-user-id` header.
    pub default_user: String,
}

/// Assemble the full HTTP surface.
pub fn build_router(state: AppState) -> Router {
    // The lifecycle enforces its own upload cap; the transport limit just
    // needs to sit above it so the handler gets to reject with a reason.
    let body_limit = DefaultBodyLimit::max(16 * 1024 * 1024);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/documents/upload", post(documents::upload))
        .route("/documents/{id}", get(documents::get_document))
        .route("/documents/{id}/analyze", post(documents::analyze))
        .route("/documents/{id}/clean", post(documents::create_clean))
        .route("/feedback/{id}", post(feedback::submit))
        .route("/feedback/{id}/regenerate", post(feedback::regenerate))
        .route("/validation/validate", post(validation::validate))
        .route("/validation/{id}/validate-all", post(validation::validate_all))
        .route("/health", get(health::health))
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
