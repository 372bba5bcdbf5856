//! GPT-2 model configuration and the standard presets.

use crate::error::{Gpt2Error, Result};
use std::fmt;
use std::str::FromStr;

/// Width of every attention head.
pub const HEAD_SIZE: usize = 64;

/// Maximum number of positions (n_ctx).
pub const CONTEXT_SIZE: usize = 1024;

/// Vocabulary size shared by all released GPT-2 checkpoints.
pub const VOCAB_SIZE: usize = 50257;

/// Transformer hyperparameters, aligned with GPT2Config in Hugging Face Transformers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gpt2Config {
    /// Embedding dimension (n_embd)
    pub dim: usize,
    /// Number of transformer blocks (n_layer)
    pub n_layers: usize,
    /// Number of attention heads (n_head)
    pub n_heads: usize,
    /// Vocabulary size (vocab_size)
    pub vocab_size: usize,
    /// Maximum context length (n_positions)
    pub seq_len: usize,
}

impl Gpt2Config {
    /// Builds a config and checks that the heads tile the embedding exactly.
    pub fn new(
        dim: usize,
        n_layers: usize,
        n_heads: usize,
        vocab_size: usize,
        seq_len: usize,
    ) -> Result<Self> {
        if n_heads == 0 || dim != n_heads * HEAD_SIZE {
            return Err(Gpt2Error::InvalidConfig(format!(
                "dim {dim} must equal n_heads {n_heads} x {HEAD_SIZE}"
            )));
        }
        if n_layers == 0 || vocab_size == 0 || seq_len == 0 {
            return Err(Gpt2Error::InvalidConfig(format!(
                "n_layers={n_layers}, vocab_size={vocab_size}, seq_len={seq_len} must be nonzero"
            )));
        }
        Ok(Gpt2Config {
            dim,
            n_layers,
            n_heads,
            vocab_size,
            seq_len,
        })
    }

    /// Returns the head size.
    #[inline]
    pub fn head_size(&self) -> usize {
        HEAD_SIZE
    }

    /// Returns the MLP inner dimension (n_inner = 4 * n_embd).
    #[inline]
    pub fn hidden_dim(&self) -> usize {
        4 * self.dim
    }
}

/// The released GPT-2 model sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Small,
    Medium,
    Large,
}

impl Preset {
    /// Returns the (dim, n_layers, n_heads) triple of this preset.
    pub fn dims(self) -> (usize, usize, usize) {
        match self {
            Preset::Small => (768, 12, 12),
            Preset::Medium => (1024, 24, 16),
            Preset::Large => (1280, 36, 20),
        }
    }

    /// Full config for this preset with the standard vocabulary and context.
    pub fn config(self) -> Gpt2Config {
        let (dim, n_layers, n_heads) = self.dims();
        Gpt2Config {
            dim,
            n_layers,
            n_heads,
            vocab_size: VOCAB_SIZE,
            seq_len: CONTEXT_SIZE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Preset::Small => "124M",
            Preset::Medium => "355M",
            Preset::Large => "774M",
        }
    }
}

impl FromStr for Preset {
    type Err = Gpt2Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "124M" => Ok(Preset::Small),
            // Older download scripts name the medium model "335M".
            "355M" | "335M" => Ok(Preset::Medium),
            "774M" => Ok(Preset::Large),
            other => Err(Gpt2Error::UnknownPreset(other.to_string())),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
