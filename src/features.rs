//! Labeled feature sequence batches and the upstream pipeline contract.
//!
//! Feature sequences are produced by an external extraction pipeline; this
//! module only defines the shape they arrive in and the interface the
//! sampler consumes them through.

use crate::SamplerError;
use ndarray::{Array3, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

/// Fixed per-sequence feature shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureShape {
    /// Number of frames in each sequence window
    pub frames: usize,

    /// Number of feature coefficients per frame
    pub features: usize,
}

/// One mini-batch of fixed-shape feature sequences with speaker labels.
///
/// Sequences are stored as `[batch, frames, features]`; `labels[i]` is the
/// speaker of `sequences[i]`. Lives for one mining iteration only.
#[derive(Debug, Clone)]
pub struct SequenceBatch {
    sequences: Array3<f32>,
    labels: Vec<String>,
}

impl SequenceBatch {
    /// Create a batch, validating that sequences and labels agree
    pub fn new(sequences: Array3<f32>, labels: Vec<String>) -> Result<Self, SamplerError> {
        if sequences.shape()[0] == 0 {
            return Err(SamplerError::EmptyBatch);
        }
        if sequences.shape()[0] != labels.len() {
            return Err(SamplerError::ShapeMismatch(format!(
                "{} sequences but {} labels",
                sequences.shape()[0],
                labels.len()
            )));
        }
        Ok(Self { sequences, labels })
    }

    /// Number of sequences in the batch
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Per-sequence feature shape
    pub fn shape(&self) -> FeatureShape {
        FeatureShape {
            frames: self.sequences.shape()[1],
            features: self.sequences.shape()[2],
        }
    }

    /// View of the stacked sequences as `[batch, frames, features]`
    pub fn sequences(&self) -> ArrayView3<f32> {
        self.sequences.view()
    }

    /// Speaker label per sequence, parallel to `sequences()`
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Z-score normalize each sequence in place, independently of the others.
    ///
    /// Constant sequences are only mean-centered (no division by zero).
    pub fn normalize(&mut self) {
        for mut sequence in self.sequences.axis_iter_mut(Axis(0)) {
            let mean = sequence.mean().unwrap_or(0.0);
            let std = sequence.std(0.0);
            if std > 1e-10 {
                sequence.mapv_inplace(|v| (v - mean) / std);
            } else {
                sequence.mapv_inplace(|v| v - mean);
            }
        }
    }
}

/// Upstream feature batch pipeline.
///
/// One implementation wraps the segment sampler and feature extractor; for a
/// given protocol item (a training-data descriptor) it yields batches of
/// labeled fixed-shape sequences until the item is exhausted.
pub trait BatchSource {
    /// Opaque training-data descriptor consumed by the pipeline
    type Item;

    /// Fixed shape of every sequence this source produces
    fn shape(&self) -> FeatureShape;

    /// Stream the labeled sequence batches derived from one protocol item
    fn from_protocol_item<'a>(
        &'a mut self,
        item: &'a Self::Item,
    ) -> Box<dyn Iterator<Item = Result<SequenceBatch, SamplerError>> + 'a>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_batch_rejects_label_mismatch() {
        let sequences = Array3::zeros((3, 4, 2));
        let labels = vec!["a".to_string(), "b".to_string()];
        let result = SequenceBatch::new(sequences, labels);
        assert!(matches!(result, Err(SamplerError::ShapeMismatch(_))));
    }

    #[test]
    fn test_batch_rejects_empty() {
        let sequences = Array3::zeros((0, 4, 2));
        let result = SequenceBatch::new(sequences, vec![]);
        assert!(matches!(result, Err(SamplerError::EmptyBatch)));
    }

    #[test]
    fn test_batch_shape() {
        let sequences = Array3::zeros((2, 5, 3));
        let labels = vec!["a".to_string(), "b".to_string()];
        let batch = SequenceBatch::new(sequences, labels).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.shape(),
            FeatureShape {
                frames: 5,
                features: 3
            }
        );
    }

    #[test]
    fn test_normalize_zero_mean_unit_std() {
        let mut data = Array3::zeros((1, 2, 2));
        data[[0, 0, 0]] = 1.0;
        data[[0, 0, 1]] = 2.0;
        data[[0, 1, 0]] = 3.0;
        data[[0, 1, 1]] = 4.0;
        let mut batch = SequenceBatch::new(data, vec!["a".to_string()]).unwrap();
        batch.normalize();

        let sequence = batch.sequences();
        let mean: f32 = sequence.iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);

        let var: f32 = sequence.iter().map(|v| v * v).sum::<f32>() / 4.0;
        assert!((var.sqrt() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_normalize_constant_sequence() {
        let data = Array3::from_elem((1, 3, 2), 7.0);
        let mut batch = SequenceBatch::new(data, vec!["a".to_string()]).unwrap();
        batch.normalize();

        // Mean-centered only, no NaN from dividing by zero variance
        assert!(batch.sequences().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_normalize_is_per_sequence() {
        let mut data = Array3::zeros((2, 1, 2));
        data[[0, 0, 0]] = -1.0;
        data[[0, 0, 1]] = 1.0;
        data[[1, 0, 0]] = 99.0;
        data[[1, 0, 1]] = 101.0;
        let mut batch =
            SequenceBatch::new(data, vec!["a".to_string(), "b".to_string()]).unwrap();
        batch.normalize();

        // The second sequence's large offset must not leak into the first
        assert!((batch.sequences()[[0, 0, 0]] + 1.0).abs() < 1e-5);
        assert!((batch.sequences()[[1, 0, 0]] + 1.0).abs() < 1e-5);
    }
}
