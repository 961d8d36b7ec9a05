use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthStatus {
    status: &'static str,
    modelo_cargado: bool,
}

pub async fn healthcheck(State(state): State<SharedState>) -> impl IntoResponse {
    Json(HealthStatus {
        status: "ok",
        modelo_cargado: state.detector.is_some(),
    })
}
