use ndarray::{Array4, ArrayD};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("failed to load onnx model: {0}")]
    Session(#[from] ort::Error),
    #[error("model declares no outputs")]
    NoOutputs,
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Session(String),
    #[error("invalid tensor shape: {0}")]
    OutputShape(String),
}

/// Seam between the detection pipeline and the inference runtime, so tests
/// can substitute a deterministic backend.
pub trait InferenceBackend: Send + Sync + 'static {
    fn infer(&self, input: &Array4<f32>) -> Result<ArrayD<f32>, InferenceError>;
}

/// ONNX Runtime session wrapper. The session requires `&mut` to run, so
/// concurrent requests serialize on the mutex.
pub struct OrtBackend {
    session: Mutex<Session>,
    output_name: String,
}

impl OrtBackend {
    pub fn load(model_path: &Path) -> Result<Self, ModelLoadError> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        let output_name = session
            .outputs()
            .first()
            .map(|output| output.name().to_owned())
            .ok_or(ModelLoadError::NoOutputs)?;

        Ok(Self {
            session: Mutex::new(session),
            output_name,
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<ArrayD<f32>, InferenceError> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::Session(format!("session mutex poisoned: {}", e)))?;

        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| InferenceError::Session(format!("failed to build tensor: {}", e)))?;

        let input_tensor = ort::inputs![tensor_ref];

        let outputs = session
            .run(input_tensor)
            .map_err(|e| InferenceError::Session(e.to_string()))?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Session(format!("failed to extract tensor: {}", e)))?;

        let ix = shape.to_ixdyn();
        ArrayD::from_shape_vec(ix, data.to_vec())
            .map_err(|e| InferenceError::OutputShape(e.to_string()))
    }
}
