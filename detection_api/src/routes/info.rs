use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, response::Json};

pub async fn service_info(State(state): State<SharedState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "nombre": "API Detección de Personas",
        "version": "1.0",
        "modelo": "SSD MobileNet v2",
        "dataset": "COCO",
        "tamaño_entrada": state.input_size,
        "endpoints": {
            "/health": "GET - Verifica disponibilidad",
            "/detect": "POST - Detecta personas en imagen",
            "/detect-con-visualizacion": "POST - Detecta y devuelve imagen con dibujos",
            "/info": "GET - Esta información"
        }
    }))
}
