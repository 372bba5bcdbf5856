//! Runtime state buffers for GPT-2 inference.

use crate::cache::KvCache;
use crate::config::Gpt2Config;

/// Runtime buffers for one sequence, aligned with forward pass states.
#[derive(Debug, Clone)]
pub struct Gpt2State {
    /// Current hidden state (hidden_states)
    pub x: Vec<f32>,
    /// LayerNorm output feeding attention or MLP
    pub xb: Vec<f32>,
    /// Fused query/key/value projection [3 * dim]
    pub qkv: Vec<f32>,
    /// Concatenated head outputs before projection
    pub att_out: Vec<f32>,
    /// Temp buffer for projection outputs
    pub xb2: Vec<f32>,
    /// MLP hidden activation [4 * dim]
    pub hb: Vec<f32>,
    /// Output logits, one score per vocabulary entry
    pub logits: Vec<f32>,
    /// Attention key/value cache
    pub cache: KvCache,
}

impl Gpt2State {
    /// Allocate inference buffers based on config.
    pub fn new(config: &Gpt2Config) -> Self {
        let dim = config.dim;

        Gpt2State {
            x: vec![0.0; dim],
            xb: vec![0.0; dim],
            qkv: vec![0.0; 3 * dim],
            att_out: vec![0.0; dim],
            xb2: vec![0.0; dim],
            hb: vec![0.0; config.hidden_dim()],
            logits: vec![0.0; config.vocab_size],
            cache: KvCache::new(config),
        }
    }

    /// Number of positions already run through the model.
    #[inline]
    pub fn pos(&self) -> usize {
        self.cache.len()
    }
}
