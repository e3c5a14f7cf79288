//! Embedding model interface and ONNX-backed implementation.

use crate::SamplerError;
use ndarray::{Array2, ArrayView3};
use std::path::Path;

#[cfg(feature = "onnx")]
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};

/// Handle to the embedding model being trained.
///
/// The sampler only reads the model's current mapping; the model's parameters
/// are updated externally by the training loop between batches, so embeddings
/// must be recomputed for every batch.
pub trait Embedder {
    /// Map a batch of feature sequences (`[batch, frames, features]`) to one
    /// embedding vector per sequence, preserving input order.
    fn transform(&mut self, sequences: ArrayView3<f32>) -> Result<Array2<f32>, SamplerError>;

    /// Expected embedding dimension
    fn dimension(&self) -> usize;
}

/// ONNX-based embedding model
#[cfg(feature = "onnx")]
pub struct OnnxEmbedder {
    session: Session,
    dimension: usize,
}

#[cfg(feature = "onnx")]
impl OnnxEmbedder {
    /// Create an embedder from an ONNX model file
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `dimension` - Embedding dimension the model outputs
    /// * `n_threads` - Number of threads for inference
    pub fn new(
        model_path: &Path,
        dimension: usize,
        n_threads: usize,
    ) -> Result<Self, SamplerError> {
        if !model_path.exists() {
            return Err(SamplerError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(|e| SamplerError::ModelLoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| SamplerError::ModelLoadError(e.to_string()))?
            .with_intra_threads(n_threads)
            .map_err(|e| SamplerError::ModelLoadError(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| SamplerError::ModelLoadError(e.to_string()))?;

        tracing::info!("Loaded embedding model from {:?}", model_path);

        Ok(Self { session, dimension })
    }
}

#[cfg(feature = "onnx")]
impl Embedder for OnnxEmbedder {
    fn transform(&mut self, sequences: ArrayView3<f32>) -> Result<Array2<f32>, SamplerError> {
        let (batch, frames, features) = sequences.dim();
        if batch == 0 {
            return Err(SamplerError::EmptyBatch);
        }

        // Model expects input shape [batch, frames, features]
        let input_data: Vec<f32> = sequences.iter().copied().collect();
        let input_shape = [batch, frames, features];

        let input_tensor = Value::from_array((input_shape, input_data))
            .map_err(|e: ort::Error| SamplerError::InferenceError(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| SamplerError::InferenceError(e.to_string()))?;

        // Output shape is [batch, embedding_dim]
        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| SamplerError::InferenceError("No output tensor".to_string()))?;

        let tensor = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| SamplerError::InferenceError(e.to_string()))?;

        let data: Vec<f32> = tensor.1.iter().copied().collect();
        if data.is_empty() || data.len() % batch != 0 {
            return Err(SamplerError::InferenceError(format!(
                "Output size {} not divisible into {} embeddings",
                data.len(),
                batch
            )));
        }

        let dimension = data.len() / batch;
        if dimension != self.dimension {
            tracing::warn!(
                "Unexpected embedding dimension: {} (expected {})",
                dimension,
                self.dimension
            );
        }

        Array2::from_shape_vec((batch, dimension), data)
            .map_err(|e| SamplerError::InferenceError(e.to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// Stub implementation when the feature is not enabled
#[cfg(not(feature = "onnx"))]
pub struct OnnxEmbedder {
    dimension: usize,
}

#[cfg(not(feature = "onnx"))]
impl OnnxEmbedder {
    pub fn new(
        _model_path: &Path,
        _dimension: usize,
        _n_threads: usize,
    ) -> Result<Self, SamplerError> {
        Err(SamplerError::FeatureNotEnabled)
    }
}

#[cfg(not(feature = "onnx"))]
impl Embedder for OnnxEmbedder {
    fn transform(&mut self, _sequences: ArrayView3<f32>) -> Result<Array2<f32>, SamplerError> {
        Err(SamplerError::FeatureNotEnabled)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
