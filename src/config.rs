//! Configuration for the triplet sampler.

use serde::{Deserialize, Serialize};

/// Configuration for triplet mining and batching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Margin threshold for semi-hard negative mining.
    /// A negative qualifies when its distance from the anchor is strictly
    /// below the anchor-positive distance plus this margin.
    pub margin: f32,

    /// Duration in seconds of each sampled audio segment.
    /// Forwarded to the upstream segment sampler.
    pub duration: f32,

    /// Number of segments sampled per speaker label.
    /// Forwarded to the upstream segment sampler.
    pub per_label: usize,

    /// Number of triplets per emitted training batch
    pub batch_size: usize,

    /// Whether to z-score normalize each feature sequence before embedding
    pub normalize: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            margin: 0.2,
            duration: 3.2,
            per_label: 40,
            batch_size: 32,
            normalize: false,
        }
    }
}

impl SamplerConfig {
    /// Create a config with the specified mining margin
    pub fn with_margin(margin: f32) -> Self {
        Self {
            margin,
            ..Default::default()
        }
    }
}
