use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct TextPayload {
    #[serde(default)]
    pub texto: String,
}

#[derive(Debug, Serialize)]
pub struct TextResult {
    pub resultado: String,
}

pub fn api_routes() -> Router {
    Router::new()
        .route("/mayusculas", post(to_uppercase))
        .route("/minusculas", post(to_lowercase))
        .layer(CorsLayer::permissive())
}

#[instrument]
pub async fn to_uppercase(Json(payload): Json<TextPayload>) -> Json<TextResult> {
    Json(TextResult {
        resultado: payload.texto.to_uppercase(),
    })
}

#[instrument]
pub async fn to_lowercase(Json(payload): Json<TextPayload>) -> Json<TextResult> {
    Json(TextResult {
        resultado: payload.texto.to_lowercase(),
    })
}
