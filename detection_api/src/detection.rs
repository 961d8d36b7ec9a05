use serde::Serialize;

/// COCO class id surfaced by this deployment. Kept as an explicit constant
/// rather than derived from a class list so the wire behavior stays fixed.
pub const PERSON_CLASS_ID: i64 = 1;
pub const PERSON_LABEL: &str = "persona";
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// A single person detection in pixel space. `ancho`/`alto` may be negative
/// when the model emits an inverted box; that is passed through uncorrected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub clase: &'static str,
    pub clase_id: i64,
    pub confianza: f64,
    pub confianza_porcentaje: f64,
    pub x: i32,
    pub y: i32,
    pub ancho: i32,
    pub alto: i32,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub exito: bool,
    pub total_detecciones: usize,
    pub umbral_utilizado: f32,
    pub detecciones: Vec<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imagen_resultado_base64: Option<String>,
}

/// Coerces a raw `umbral` value to a confidence threshold. Unparsable or
/// out-of-range values silently fall back to the default, never an error.
pub fn resolve_threshold(raw: Option<&str>) -> f32 {
    match raw.and_then(|s| s.trim().parse::<f32>().ok()) {
        Some(value) if (0.0..=1.0).contains(&value) => value,
        _ => DEFAULT_THRESHOLD,
    }
}
