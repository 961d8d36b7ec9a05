use super::MAX_BODY_BYTES;
use crate::{
    codec::{self, CodecError},
    detection::{resolve_threshold, DetectResponse},
    server::SharedState,
};
use axum::{
    extract::{Multipart, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json, RequestExt,
};
use image::RgbImage;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Modelo no cargado")]
    ModelUnavailable,
    #[error("Envía imagen como archivo o base64")]
    MissingImage,
    #[error("No se seleccionó archivo")]
    EmptyFilename,
    #[error("Falta parámetro imagen_base64")]
    MissingBase64Field,
    #[error("Cuerpo JSON inválido: {0}")]
    InvalidJson(String),
    #[error("Error leyendo formulario: {0}")]
    Multipart(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("{0}")]
    Detection(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::ModelUnavailable
            | ApiError::Detection(_)
            | ApiError::Codec(CodecError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({
            "exito": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Deserialize)]
struct Base64Payload {
    imagen_base64: Option<String>,
    umbral: Option<serde_json::Value>,
}

struct DetectRequest {
    image: RgbImage,
    threshold: f32,
}

#[instrument(skip(state, req))]
pub async fn detect(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
    req: Request,
) -> Result<Json<DetectResponse>, ApiError> {
    let detector = state.detector.clone().ok_or(ApiError::ModelUnavailable)?;
    let request = read_request(query, req).await?;

    let detections = detector
        .detect(&request.image, request.threshold)
        .map_err(|e| ApiError::Detection(e.to_string()))?;

    tracing::debug!(total = detections.len(), "detection finished");

    Ok(Json(DetectResponse {
        exito: true,
        total_detecciones: detections.len(),
        umbral_utilizado: request.threshold,
        detecciones: detections,
        imagen_resultado_base64: None,
    }))
}

#[instrument(skip(state, req))]
pub async fn detect_with_visualization(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
    req: Request,
) -> Result<Json<DetectResponse>, ApiError> {
    let detector = state.detector.clone().ok_or(ApiError::ModelUnavailable)?;
    let request = read_request(query, req).await?;

    let detections = detector
        .detect(&request.image, request.threshold)
        .map_err(|e| ApiError::Detection(e.to_string()))?;

    let rendered = state.renderer.render(&request.image, &detections);
    let jpeg = codec::encode_jpeg(&rendered)?;

    Ok(Json(DetectResponse {
        exito: true,
        total_detecciones: detections.len(),
        umbral_utilizado: request.threshold,
        detecciones: detections,
        imagen_resultado_base64: Some(codec::to_base64(&jpeg)),
    }))
}

/// Pulls the image and threshold out of either supported request shape:
/// `multipart/form-data` with a `file` field, or JSON with `imagen_base64`.
/// The `umbral` value may arrive as a form field, JSON field or query
/// parameter; the body value wins when both are present.
async fn read_request(
    query: HashMap<String, String>,
    req: Request,
) -> Result<DetectRequest, ApiError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let multipart = req
            .extract::<Multipart, _>()
            .await
            .map_err(|e| ApiError::Multipart(e.to_string()))?;
        read_multipart(query, multipart).await
    } else if content_type.starts_with("application/json") {
        let body = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| ApiError::InvalidJson(e.to_string()))?;
        read_json(query, &body)
    } else {
        Err(ApiError::MissingImage)
    }
}

async fn read_multipart(
    query: HashMap<String, String>,
    mut multipart: Multipart,
) -> Result<DetectRequest, ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut empty_filename = false;
    let mut form_umbral: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Multipart(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                empty_filename = field.file_name().is_some_and(str::is_empty);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Multipart(e.to_string()))?;
                file_bytes = Some(bytes.to_vec());
            }
            Some("umbral") => {
                form_umbral = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::Multipart(e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or(ApiError::MissingImage)?;
    if empty_filename {
        return Err(ApiError::EmptyFilename);
    }

    let image = codec::decode_image(&bytes)?;
    let raw = form_umbral.or_else(|| query.get("umbral").cloned());

    Ok(DetectRequest {
        image,
        threshold: resolve_threshold(raw.as_deref()),
    })
}

fn read_json(query: HashMap<String, String>, body: &[u8]) -> Result<DetectRequest, ApiError> {
    let payload: Base64Payload =
        serde_json::from_slice(body).map_err(|e| ApiError::InvalidJson(e.to_string()))?;

    let encoded = payload.imagen_base64.ok_or(ApiError::MissingBase64Field)?;
    let image = codec::decode_base64_image(&encoded)?;

    let raw = payload
        .umbral
        .map(|value| match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .or_else(|| query.get("umbral").cloned());

    Ok(DetectRequest {
        image,
        threshold: resolve_threshold(raw.as_deref()),
    })
}

#[cfg(test)]
mod tests {
    use crate::{
        codec,
        model::testing::{FailingBackend, FixedBackend},
        model::InferenceBackend,
        render::BoxRenderer,
        routes::api_routes,
        server::SharedState,
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "test-boundary";

    fn fixed_rows() -> Vec<[f32; 7]> {
        vec![
            [0.0, 1.0, 0.95, 0.1, 0.2, 0.5, 0.6],
            [0.0, 1.0, 0.75, 0.3, 0.3, 0.4, 0.4],
            [0.0, 1.0, 0.40, 0.1, 0.1, 0.2, 0.2],
            [0.0, 3.0, 0.99, 0.1, 0.1, 0.9, 0.9],
        ]
    }

    fn app_with_backend(backend: Option<Box<dyn InferenceBackend>>) -> Router {
        let state = SharedState {
            detector: backend
                .map(|b| Arc::new(crate::detector::PersonDetector::new(b, 300))),
            renderer: Arc::new(BoxRenderer::new()),
            input_size: 300,
        };
        Router::new().merge(api_routes()).with_state(state)
    }

    fn app() -> Router {
        app_with_backend(Some(Box::new(FixedBackend { rows: fixed_rows() })))
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([90, 90, 90]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn multipart_body(file: Option<&[u8]>, filename: &str, umbral: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(data) = file {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        if let Some(value) = umbral {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            body.extend_from_slice(b"Content-Disposition: form-data; name=\"umbral\"\r\n\r\n");
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }

    fn json_request(uri: &str, payload: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&payload).unwrap()))
            .unwrap()
    }

    fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_loaded_model() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["modelo_cargado"], true);
    }

    #[tokio::test]
    async fn health_reports_missing_model() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(app_with_backend(None), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["modelo_cargado"], false);
    }

    #[tokio::test]
    async fn info_describes_the_service() {
        let request = Request::builder()
            .uri("/info")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["modelo"], "SSD MobileNet v2");
        assert_eq!(json["tamaño_entrada"], 300);
        assert!(json["endpoints"]["/detect"].is_string());
    }

    #[tokio::test]
    async fn detect_with_base64_payload_filters_by_class_and_threshold() {
        let payload = serde_json::json!({
            "imagen_base64": codec::to_base64(&png_bytes(200, 100)),
        });
        let (status, json) = send(app(), json_request("/detect", payload)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["exito"], true);
        assert_eq!(json["total_detecciones"], 2);
        assert_eq!(json["umbral_utilizado"], 0.7);
        let detections = json["detecciones"].as_array().unwrap();
        assert_eq!(detections.len(), 2);
        for det in detections {
            assert_eq!(det["clase"], "persona");
            assert_eq!(det["clase_id"], 1);
            assert!(det["confianza"].as_f64().unwrap() >= 0.7);
        }
        assert_eq!(detections[0]["x"], 20);
        assert_eq!(detections[0]["ancho"], 80);
    }

    #[tokio::test]
    async fn detect_with_multipart_file_and_threshold() {
        let body = multipart_body(Some(&png_bytes(200, 100)), "foto.png", Some("0.5"));
        let (status, json) = send(app(), multipart_request("/detect", body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["exito"], true);
        assert_eq!(json["umbral_utilizado"], 0.5);
        assert_eq!(json["total_detecciones"], 2);
    }

    #[tokio::test]
    async fn out_of_range_threshold_uses_default() {
        let payload = serde_json::json!({
            "imagen_base64": codec::to_base64(&png_bytes(64, 64)),
            "umbral": "2.0",
        });
        let (status, json) = send(app(), json_request("/detect", payload)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["umbral_utilizado"], 0.7);
    }

    #[tokio::test]
    async fn numeric_json_threshold_is_honored() {
        let payload = serde_json::json!({
            "imagen_base64": codec::to_base64(&png_bytes(64, 64)),
            "umbral": 0.5,
        });
        let (status, json) = send(app(), json_request("/detect", payload)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["umbral_utilizado"], 0.5);
        assert_eq!(json["total_detecciones"], 2);
    }

    #[tokio::test]
    async fn missing_model_is_a_server_error() {
        let payload = serde_json::json!({
            "imagen_base64": codec::to_base64(&png_bytes(64, 64)),
        });
        let (status, json) = send(app_with_backend(None), json_request("/detect", payload)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["exito"], false);
        assert_eq!(json["error"], "Modelo no cargado");
    }

    #[tokio::test]
    async fn inference_failure_surfaces_the_backend_message() {
        let app = app_with_backend(Some(Box::new(FailingBackend {
            message: "shape mismatch",
        })));
        let payload = serde_json::json!({
            "imagen_base64": codec::to_base64(&png_bytes(64, 64)),
        });
        let (status, json) = send(app, json_request("/detect", payload)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["exito"], false);
        assert!(json["error"].as_str().unwrap().contains("shape mismatch"));
    }

    #[tokio::test]
    async fn non_json_non_multipart_body_is_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/detect")
            .header("content-type", "text/plain")
            .body(Body::from("hola"))
            .unwrap();
        let (status, json) = send(app(), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["exito"], false);
    }

    #[tokio::test]
    async fn json_without_image_field_is_rejected() {
        let (status, json) = send(app(), json_request("/detect", serde_json::json!({}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Falta parámetro imagen_base64");
    }

    #[tokio::test]
    async fn invalid_base64_is_a_distinct_error() {
        let payload = serde_json::json!({ "imagen_base64": "%%%" });
        let (status, json) = send(app(), json_request("/detect", payload)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Error decodificando base64"));
    }

    #[tokio::test]
    async fn undecodable_image_is_rejected() {
        let payload = serde_json::json!({
            "imagen_base64": codec::to_base64(b"not an image"),
        });
        let (status, json) = send(app(), json_request("/detect", payload)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No se pudo decodificar la imagen");
    }

    #[tokio::test]
    async fn multipart_without_file_field_is_rejected() {
        let body = multipart_body(None, "", Some("0.5"));
        let (status, json) = send(app(), multipart_request("/detect", body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["exito"], false);
    }

    #[tokio::test]
    async fn empty_filename_is_rejected() {
        let body = multipart_body(Some(&png_bytes(32, 32)), "", None);
        let (status, json) = send(app(), multipart_request("/detect", body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No se seleccionó archivo");
    }

    #[tokio::test]
    async fn visualization_returns_the_same_detections_plus_an_image() {
        let payload = serde_json::json!({
            "imagen_base64": codec::to_base64(&png_bytes(200, 100)),
        });

        let (status, plain) = send(app(), json_request("/detect", payload.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, visual) =
            send(app(), json_request("/detect-con-visualizacion", payload)).await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(plain["detecciones"], visual["detecciones"]);
        assert_eq!(plain["total_detecciones"], visual["total_detecciones"]);
        assert!(plain.get("imagen_resultado_base64").is_none());

        let rendered = codec::decode_base64_image(
            visual["imagen_resultado_base64"].as_str().unwrap(),
        )
        .unwrap();
        assert_eq!(rendered.dimensions(), (200, 100));
    }
}
