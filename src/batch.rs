//! Fixed-size batching of mined triplets for gradient updates.
//!
//! Regroups the individual-triplet stream into stacked arrays the training
//! framework consumes, and exposes the structural schema it validates
//! against.

use crate::embedding::Embedder;
use crate::features::{BatchSource, FeatureShape};
use crate::triplet::{Triplet, TripletSampler};
use crate::SamplerError;
use ndarray::{Array1, Array3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One entry of the structural batch schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignatureEntry {
    Sequence { shape: FeatureShape },
    Boolean,
}

/// Structural schema of the batches this crate emits: three sequence inputs
/// (anchor, positive, negative) and a boolean target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSignature {
    pub inputs: Vec<SignatureEntry>,
    pub target: SignatureEntry,
}

/// One fixed-size batch of stacked triplets.
///
/// `targets` is the constant positive marker per triplet (always 1.0). It
/// carries no information about which negative was chosen; it exists only
/// because the training framework's batch schema requires a target column.
#[derive(Debug, Clone)]
pub struct TripletBatch {
    pub anchors: Array3<f32>,
    pub positives: Array3<f32>,
    pub negatives: Array3<f32>,
    pub targets: Array1<f32>,
}

impl TripletBatch {
    /// Number of triplets in the batch
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn from_triplets(triplets: &[Triplet], shape: FeatureShape) -> Result<Self, SamplerError> {
        let n = triplets.len();
        let dim = (n, shape.frames, shape.features);
        let mut anchors = Array3::zeros(dim);
        let mut positives = Array3::zeros(dim);
        let mut negatives = Array3::zeros(dim);

        for (i, triplet) in triplets.iter().enumerate() {
            for member in [&triplet.anchor, &triplet.positive, &triplet.negative] {
                if member.dim() != (shape.frames, shape.features) {
                    return Err(SamplerError::ShapeMismatch(format!(
                        "triplet sequence has shape {:?}, expected ({}, {})",
                        member.dim(),
                        shape.frames,
                        shape.features
                    )));
                }
            }
            anchors.index_axis_mut(Axis(0), i).assign(&triplet.anchor);
            positives.index_axis_mut(Axis(0), i).assign(&triplet.positive);
            negatives.index_axis_mut(Axis(0), i).assign(&triplet.negative);
        }

        Ok(Self {
            anchors,
            positives,
            negatives,
            targets: Array1::ones(n),
        })
    }
}

/// Regroups an individual-triplet stream into fixed-size [`TripletBatch`]es.
///
/// A trailing group smaller than the batch size is dropped; gradient updates
/// expect full batches.
pub struct TripletBatcher {
    shape: FeatureShape,
    batch_size: usize,
}

impl TripletBatcher {
    /// Create a batcher for sequences of the given shape
    pub fn new(shape: FeatureShape, batch_size: usize) -> Self {
        Self {
            shape,
            batch_size: batch_size.max(1),
        }
    }

    /// Per-sequence shape, unchanged by triplet mining
    pub fn shape(&self) -> FeatureShape {
        self.shape
    }

    /// Structural schema of the emitted batches
    pub fn signature(&self) -> BatchSignature {
        BatchSignature {
            inputs: vec![
                SignatureEntry::Sequence { shape: self.shape },
                SignatureEntry::Sequence { shape: self.shape },
                SignatureEntry::Sequence { shape: self.shape },
            ],
            target: SignatureEntry::Boolean,
        }
    }

    /// Regroup a triplet stream into fixed-size batches
    pub fn batches<'a, I>(
        &'a self,
        triplets: I,
    ) -> impl Iterator<Item = Result<TripletBatch, SamplerError>> + 'a
    where
        I: Iterator<Item = Result<Triplet, SamplerError>> + 'a,
    {
        BatchIter {
            batcher: self,
            triplets,
        }
    }

    /// Mine and batch every triplet derived from one protocol item
    pub fn from_protocol_item<'a, E, R, B>(
        &'a self,
        sampler: &'a mut TripletSampler<E, R>,
        source: &'a mut B,
        item: &'a B::Item,
    ) -> Box<dyn Iterator<Item = Result<TripletBatch, SamplerError>> + 'a>
    where
        E: Embedder + 'a,
        R: Rng + 'a,
        B: BatchSource,
    {
        Box::new(self.batches(sampler.from_protocol_item(source, item)))
    }
}

struct BatchIter<'a, I> {
    batcher: &'a TripletBatcher,
    triplets: I,
}

impl<I> Iterator for BatchIter<'_, I>
where
    I: Iterator<Item = Result<Triplet, SamplerError>>,
{
    type Item = Result<TripletBatch, SamplerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut group = Vec::with_capacity(self.batcher.batch_size);
        while group.len() < self.batcher.batch_size {
            match self.triplets.next() {
                Some(Ok(triplet)) => group.push(triplet),
                Some(Err(e)) => return Some(Err(e)),
                // Stream exhausted; a partial group is dropped
                None => return None,
            }
        }
        Some(TripletBatch::from_triplets(&group, self.batcher.shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn shape() -> FeatureShape {
        FeatureShape {
            frames: 2,
            features: 3,
        }
    }

    fn triplet(value: f32) -> Triplet {
        Triplet {
            anchor: Array2::from_elem((2, 3), value),
            positive: Array2::from_elem((2, 3), value + 0.1),
            negative: Array2::from_elem((2, 3), value + 0.2),
        }
    }

    #[test]
    fn test_batches_of_fixed_size() {
        let batcher = TripletBatcher::new(shape(), 2);
        let stream = (0..5).map(|i| Ok(triplet(i as f32)));

        let batches: Vec<TripletBatch> = batcher
            .batches(stream)
            .collect::<Result<_, _>>()
            .unwrap();

        // 5 triplets at batch size 2: two full batches, the fifth is dropped
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 2));
    }

    #[test]
    fn test_batch_preserves_order_and_values() {
        let batcher = TripletBatcher::new(shape(), 2);
        let stream = (0..2).map(|i| Ok(triplet(i as f32)));

        let batches: Vec<TripletBatch> = batcher
            .batches(stream)
            .collect::<Result<_, _>>()
            .unwrap();

        let batch = &batches[0];
        assert_eq!(batch.anchors[[0, 0, 0]], 0.0);
        assert_eq!(batch.anchors[[1, 0, 0]], 1.0);
        assert!((batch.positives[[1, 0, 0]] - 1.1).abs() < 1e-6);
        assert!((batch.negatives[[1, 0, 0]] - 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_targets_are_constant_positive_marker() {
        let batcher = TripletBatcher::new(shape(), 3);
        let stream = (0..3).map(|i| Ok(triplet(i as f32)));

        let batches: Vec<TripletBatch> = batcher
            .batches(stream)
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(batches[0].targets.iter().all(|&t| t == 1.0));
    }

    #[test]
    fn test_error_propagates_through_batching() {
        let batcher = TripletBatcher::new(shape(), 2);
        let stream = vec![
            Ok(triplet(0.0)),
            Err(SamplerError::InferenceError("forward pass failed".into())),
        ]
        .into_iter();

        let mut batches = batcher.batches(stream);
        assert!(matches!(
            batches.next(),
            Some(Err(SamplerError::InferenceError(_)))
        ));
    }

    #[test]
    fn test_rejects_mismatched_triplet_shape() {
        let batcher = TripletBatcher::new(shape(), 1);
        let wrong = Triplet {
            anchor: Array2::zeros((4, 4)),
            positive: Array2::zeros((4, 4)),
            negative: Array2::zeros((4, 4)),
        };
        let mut batches = batcher.batches(std::iter::once(Ok(wrong)));
        assert!(matches!(
            batches.next(),
            Some(Err(SamplerError::ShapeMismatch(_)))
        ));
    }

    #[test]
    fn test_signature_schema() {
        let batcher = TripletBatcher::new(shape(), 32);
        let signature = batcher.signature();

        assert_eq!(signature.inputs.len(), 3);
        assert!(signature
            .inputs
            .iter()
            .all(|e| *e == SignatureEntry::Sequence { shape: shape() }));
        assert_eq!(signature.target, SignatureEntry::Boolean);
        assert_eq!(batcher.shape(), shape());
    }

    #[test]
    fn test_signature_serializes() {
        let batcher = TripletBatcher::new(shape(), 32);
        let json = serde_json::to_string(&batcher.signature()).unwrap();
        assert!(json.contains("\"type\":\"sequence\""));
        assert!(json.contains("\"type\":\"boolean\""));

        let back: BatchSignature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, batcher.signature());
    }
}
