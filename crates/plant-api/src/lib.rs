//! HTTP surface of Plant Share: the upload pipeline, the photo listings and
//! delete flow, live feeds over WebSocket, and local object serving.

pub mod error;
pub mod feed;
pub mod live;
pub mod middleware;
pub mod objects;
pub mod photos;
pub mod state;
pub mod upload;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{delete, get, post},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// All routes, with state attached. Transport layers (CORS, tracing) are
/// added by the binary.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let public_routes = Router::new()
        .route("/api/upload", post(upload::upload_photo))
        .route("/api/upload/token-param", post(upload::upload_photo_token_param))
        .route("/api/photos", get(photos::list_gallery))
        .route("/api/photos/live", get(live::gallery_live))
        .route("/api/profile/live", get(live::profile_live))
        .route("/v0/b/{bucket}/o/{key}", get(objects::serve_object))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/api/profile/photos", get(photos::list_profile))
        .route("/api/photos/{id}", delete(photos::delete_photo))
        .layer(from_fn(middleware::require_identity));

    public_routes
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// GET /health: liveness check (no auth).
pub async fn health() -> &'static str {
    "ok"
}
