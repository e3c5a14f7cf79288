//! Pairwise Euclidean distances between embedding vectors.

use ndarray::{Array2, ArrayView2};

/// Compute the full pairwise Euclidean distance matrix over embedding rows.
///
/// The result is symmetric with a zero diagonal: `D[i][j]` is the distance
/// between `embeddings.row(i)` and `embeddings.row(j)`.
pub fn pairwise_euclidean(embeddings: ArrayView2<f32>) -> Array2<f32> {
    let n = embeddings.nrows();
    let mut distances = Array2::zeros((n, n));

    for i in 0..n {
        for j in (i + 1)..n {
            let d = embeddings
                .row(i)
                .iter()
                .zip(embeddings.row(j).iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt();
            distances[[i, j]] = d;
            distances[[j, i]] = d;
        }
    }

    distances
}
