//! Semi-hard triplet mining for training speaker embedding models.
//!
//! This crate turns mini-batches of labeled acoustic feature sequences into
//! (anchor, positive, negative) training triplets by:
//! 1. Embedding every sequence in the batch with the current model state
//! 2. Computing the pairwise Euclidean distance matrix over the embeddings
//! 3. For each same-speaker (anchor, positive) pair, picking one negative
//!    uniformly at random among those inside the margin threshold
//!
//! Distances are recomputed from scratch every batch on purpose: the embedding
//! model's parameters change between batches as training progresses, and
//! mining is only informative against the current model state.

pub mod batch;
pub mod config;
pub mod distance;
pub mod embedding;
pub mod features;
pub mod triplet;


pub use batch::{BatchSignature, SignatureEntry, TripletBatch, TripletBatcher};
pub use config::SamplerConfig;
pub use distance::pairwise_euclidean;
pub use embedding::{Embedder, OnnxEmbedder};
pub use features::{BatchSource, FeatureShape, SequenceBatch};
pub use triplet::{Triplet, TripletSampler};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during triplet sampling
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Empty sequence batch")]
    EmptyBatch,

    #[error("Failed to load ONNX model: {0}")]
    ModelLoadError(String),

    #[error("ONNX inference failed: {0}")]
    InferenceError(String),

    #[error("Model not found at path: {0}")]
    ModelNotFound(PathBuf),

    #[error("Feature not enabled: the ONNX embedder requires the 'onnx' feature")]
    FeatureNotEnabled,

    #[error("Batch source failed: {0}")]
    Source(String),
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for SamplerError {
    fn from(e: ort::Error) -> Self {
        SamplerError::InferenceError(e.to_string())
    }
}
