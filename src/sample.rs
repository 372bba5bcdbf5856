//! Token scoring and ranked top-k sampling.

use rand::Rng;
use rand::distr::{Distribution, StandardUniform};
use rayon::prelude::*;

use crate::ops::dot;

/// A vocabulary entry with its score, used for ranking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub token: usize,
    pub score: f32,
}

/// Score every vocabulary entry against the hidden state.
///
/// The token embedding matrix doubles as the output projection (tied
/// weights), so the score of token `i` is `hidden . wte[i]`.
pub fn score(logits: &mut [f32], hidden: &[f32], wte: &[f32]) {
    let dim = hidden.len();
    logits.par_iter_mut().enumerate().for_each(|(i, l)| {
        *l = dot(hidden, &wte[i * dim..(i + 1) * dim]);
    });
}

/// Returns the `k` highest-scoring entries, best first.
///
/// Equal scores keep the lower token id first.
pub fn top_k(logits: &[f32], k: usize) -> Vec<Candidate> {
    let mut ranked: Vec<Candidate> = logits
        .iter()
        .enumerate()
        .map(|(token, &score)| Candidate { token, score })
        .collect();

    // Sort descending by score (stable)
    ranked.par_sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(k);
    ranked
}

/// Draw a token from a ranked pool, biased toward its front.
///
/// With `r` uniform in [0, 1) the pick is `pool[floor(r^2 * len)]`, so the
/// first quarter of the pool is chosen half of the time. Returns `None` for
/// an empty pool.
pub fn sample<R: Rng + ?Sized>(pool: &[Candidate], rng: &mut R) -> Option<usize> {
    if pool.is_empty() {
        return None;
    }
    let r: f64 = StandardUniform.sample(rng);
    Some(pool[rank_index(r, pool.len())].token)
}

/// Maps a uniform draw `r` in [0, 1) to a position in a pool of `len`.
#[inline]
pub fn rank_index(r: f64, len: usize) -> usize {
    let idx = (r * r * len as f64) as usize;
    idx.min(len.saturating_sub(1))
}
