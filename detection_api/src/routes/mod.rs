mod detect;
mod health;
mod info;

pub use detect::{detect, detect_with_visualization};
pub use health::healthcheck;
pub use info::service_info;

use crate::server::SharedState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

/// Upload cap for both multipart and base64 bodies.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/info", get(service_info))
        .route("/detect", post(detect))
        .route("/detect-con-visualizacion", post(detect_with_visualization))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
