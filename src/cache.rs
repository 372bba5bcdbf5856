//! Key/value attention cache.
//!
//! Rows are indexed by absolute position and filled strictly in order; a row
//! is only ever read after it was written, and is never overwritten.

use crate::config::Gpt2Config;
use crate::error::{Gpt2Error, Result};

/// Keys and values of one transformer block, each [seq_len * dim].
#[derive(Debug, Clone)]
pub struct LayerCache {
    key: Vec<f32>,
    value: Vec<f32>,
}

/// Per-block caches for one generation session.
#[derive(Debug, Clone)]
pub struct KvCache {
    layers: Vec<LayerCache>,
    dim: usize,
    seq_len: usize,
    /// Number of positions whose rows are written in every block.
    len: usize,
}

impl KvCache {
    /// Allocate zeroed caches for every block.
    pub fn new(config: &Gpt2Config) -> Self {
        let size = config.seq_len * config.dim;
        let layers = (0..config.n_layers)
            .map(|_| LayerCache {
                key: vec![0.0; size],
                value: vec![0.0; size],
            })
            .collect();
        KvCache {
            layers,
            dim: config.dim,
            seq_len: config.seq_len,
            len: 0,
        }
    }

    /// Number of positions already processed.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of positions.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.seq_len
    }

    /// Checks that `slot` is the next position to be written.
    pub fn check_next(&self, slot: usize) -> Result<()> {
        if slot >= self.seq_len {
            return Err(Gpt2Error::ContextOverflow { max: self.seq_len });
        }
        if slot != self.len {
            return Err(Gpt2Error::CacheOrder {
                slot,
                expected: self.len,
            });
        }
        Ok(())
    }

    /// Store the key and value rows of block `layer` at the next position.
    #[inline]
    pub fn write(&mut self, layer: usize, k: &[f32], v: &[f32]) {
        let off = self.len * self.dim;
        let cache = &mut self.layers[layer];
        cache.key[off..off + self.dim].copy_from_slice(k);
        cache.value[off..off + self.dim].copy_from_slice(v);
    }

    /// Key and value rows `0..=len` of block `layer`, including the row
    /// written for the position currently being processed.
    #[inline]
    pub fn rows(&self, layer: usize) -> (&[f32], &[f32]) {
        let end = (self.len + 1) * self.dim;
        let cache = &self.layers[layer];
        (&cache.key[..end], &cache.value[..end])
    }

    /// Mark the current position as complete in every block.
    #[inline]
    pub fn advance(&mut self) {
        self.len += 1;
    }
}
