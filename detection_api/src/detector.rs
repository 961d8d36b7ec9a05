use crate::detection::{Detection, PERSON_CLASS_ID, PERSON_LABEL};
use crate::model::{InferenceBackend, InferenceError};
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array4, ArrayD};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("{0}")]
    Inference(#[from] InferenceError),
    #[error("unexpected model output shape: {0:?}")]
    OutputShape(Vec<usize>),
}

/// Runs the pre-trained person detector over decoded images. Output order
/// mirrors the tensor row order; no suppression or deduplication happens
/// here, so overlapping boxes for the same person are expected.
pub struct PersonDetector {
    backend: Box<dyn InferenceBackend>,
    input_size: u32,
}

impl PersonDetector {
    pub fn new(backend: Box<dyn InferenceBackend>, input_size: u32) -> Self {
        Self {
            backend,
            input_size,
        }
    }

    pub fn detect(&self, image: &RgbImage, threshold: f32) -> Result<Vec<Detection>, DetectError> {
        let input = image_to_tensor(image, self.input_size);
        let output = self.backend.infer(&input)?;
        collect_detections(&output, image.width(), image.height(), threshold)
    }
}

/// Builds the model input: linear resize to the square input size, RGB
/// channel order, raw 0-255 values, NCHW layout. SSD MobileNet v2 expects
/// unnormalized pixels, unlike most YOLO exports.
fn image_to_tensor(image: &RgbImage, size: u32) -> Array4<f32> {
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        input[[0, 0, y as usize, x as usize]] = r as f32;
        input[[0, 1, y as usize, x as usize]] = g as f32;
        input[[0, 2, y as usize, x as usize]] = b as f32;
    }
    input
}

/// Turns the raw SSD output tensor `[batch, block, i, field]` into pixel
/// space detections. Field 1 is the class id, field 2 the confidence and
/// fields 3-6 the normalized `[x0, y0, x1, y1]` corners.
///
/// Width and height are derived from the rescaled second corner minus the
/// already-rounded first corner, not rescaled independently. Clients
/// depend on the exact pixel values, so the arithmetic order must not
/// change even though it can differ by one pixel from the alternative.
fn collect_detections(
    output: &ArrayD<f32>,
    width: u32,
    height: u32,
    threshold: f32,
) -> Result<Vec<Detection>, DetectError> {
    if output.ndim() != 4 || output.shape()[3] < 7 {
        return Err(DetectError::OutputShape(output.shape().to_vec()));
    }

    let w = width as f64;
    let h = height as f64;
    let rows = output.shape()[2];
    let mut detections = Vec::new();

    for i in 0..rows {
        let class_id = output[[0, 0, i, 1]] as i64;
        let confidence = output[[0, 0, i, 2]] as f64;

        if confidence < threshold as f64 || class_id != PERSON_CLASS_ID {
            continue;
        }

        let x = (output[[0, 0, i, 3]] as f64 * w).round() as i32;
        let y = (output[[0, 0, i, 4]] as f64 * h).round() as i32;
        let ancho = (output[[0, 0, i, 5]] as f64 * w).round() as i32 - x;
        let alto = (output[[0, 0, i, 6]] as f64 * h).round() as i32 - y;

        detections.push(Detection {
            clase: PERSON_LABEL,
            clase_id: class_id,
            confianza: round_to(confidence, 4),
            confianza_porcentaje: round_to(confidence * 100.0, 2),
            x,
            y,
            ancho,
            alto,
        });
    }

    Ok(detections)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
