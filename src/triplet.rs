//! Semi-hard triplet mining over embedded sequence batches.
//!
//! For every same-speaker (anchor, positive) pair in a batch, a negative is
//! drawn uniformly among the different-speaker sequences whose distance from
//! the anchor is strictly below the anchor-positive distance plus the margin.
//! Pairs with no qualifying negative are skipped; that is expected, not an
//! error.

use crate::config::SamplerConfig;
use crate::distance::pairwise_euclidean;
use crate::embedding::Embedder;
use crate::features::{BatchSource, SequenceBatch};
use crate::SamplerError;
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

/// One mined training triplet.
///
/// Anchor and positive share a speaker label; the negative has a different
/// one, and lies within the mining margin of the anchor.
#[derive(Debug, Clone)]
pub struct Triplet {
    pub anchor: Array2<f32>,
    pub positive: Array2<f32>,
    pub negative: Array2<f32>,
}

/// Mines training triplets from labeled sequence batches.
///
/// Holds the embedding model only through the [`Embedder`] handle and never
/// mutates it; the RNG used for negative selection is injected so mining can
/// be made deterministic in tests.
pub struct TripletSampler<E, R> {
    embedder: E,
    rng: R,
    config: SamplerConfig,
}

impl<E: Embedder, R: Rng> TripletSampler<E, R> {
    /// Create a sampler from an embedding model handle, an RNG, and a config
    pub fn new(embedder: E, rng: R, config: SamplerConfig) -> Self {
        Self {
            embedder,
            rng,
            config,
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Mine all triplets from one batch.
    ///
    /// Embeds every sequence with the current model state, builds the pairwise
    /// distance matrix, and walks every (anchor, positive) combination per
    /// speaker label. Returns zero triplets when no label has two members or
    /// no negative falls inside the margin anywhere.
    pub fn mine_batch(&mut self, batch: &SequenceBatch) -> Result<Vec<Triplet>, SamplerError> {
        let normalized;
        let batch = if self.config.normalize {
            normalized = {
                let mut b = batch.clone();
                b.normalize();
                b
            };
            &normalized
        } else {
            batch
        };

        let embeddings = self.embedder.transform(batch.sequences())?;
        if embeddings.nrows() != batch.len() {
            return Err(SamplerError::ShapeMismatch(format!(
                "embedder returned {} vectors for {} sequences",
                embeddings.nrows(),
                batch.len()
            )));
        }

        let distances = pairwise_euclidean(embeddings.view());

        // Group batch indices by speaker label
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (index, label) in batch.labels().iter().enumerate() {
            groups.entry(label.as_str()).or_default().push(index);
        }

        let sequences = batch.sequences();
        let mut triplets = Vec::new();
        let mut skipped = 0usize;

        for (label, positives) in &groups {
            let negatives: Vec<usize> = batch
                .labels()
                .iter()
                .enumerate()
                .filter(|(_, l)| l.as_str() != *label)
                .map(|(index, _)| index)
                .collect();
            if negatives.is_empty() {
                continue;
            }

            // All C(|positives|, 2) anchor/positive combinations
            for (i, &anchor) in positives.iter().enumerate() {
                for &positive in &positives[i + 1..] {
                    let d = distances[[anchor, positive]];

                    // Semi-hard candidates: strictly inside the margin
                    let candidates: Vec<usize> = negatives
                        .iter()
                        .copied()
                        .filter(|&negative| distances[[anchor, negative]] < d + self.config.margin)
                        .collect();

                    match candidates.choose(&mut self.rng) {
                        Some(&negative) => triplets.push(Triplet {
                            anchor: sequences.index_axis(Axis(0), anchor).to_owned(),
                            positive: sequences.index_axis(Axis(0), positive).to_owned(),
                            negative: sequences.index_axis(Axis(0), negative).to_owned(),
                        }),
                        None => skipped += 1,
                    }
                }
            }
        }

        tracing::debug!(
            "Mined {} triplets from batch of {} ({} pairs without a qualifying negative)",
            triplets.len(),
            batch.len(),
            skipped
        );

        Ok(triplets)
    }

    /// Lazily mine triplets from every batch a source yields for one
    /// protocol item.
    ///
    /// Embedding or source failures terminate the stream with an error; the
    /// caller owns retry policy.
    pub fn from_protocol_item<'a, B>(
        &'a mut self,
        source: &'a mut B,
        item: &'a B::Item,
    ) -> Box<dyn Iterator<Item = Result<Triplet, SamplerError>> + 'a>
    where
        B: BatchSource,
        E: 'a,
        R: 'a,
    {
        Box::new(TripletIter {
            batches: source.from_protocol_item(item),
            sampler: self,
            pending: Vec::new().into_iter(),
        })
    }
}

struct TripletIter<'a, E, R> {
    sampler: &'a mut TripletSampler<E, R>,
    batches: Box<dyn Iterator<Item = Result<SequenceBatch, SamplerError>> + 'a>,
    pending: std::vec::IntoIter<Triplet>,
}

impl<E: Embedder, R: Rng> Iterator for TripletIter<'_, E, R> {
    type Item = Result<Triplet, SamplerError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(triplet) = self.pending.next() {
                return Some(Ok(triplet));
            }
            match self.batches.next()? {
                Ok(batch) => match self.sampler.mine_batch(&batch) {
                    Ok(mined) => self.pending = mined.into_iter(),
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
