//! GPT-2 model forward pass.

use crate::config::Gpt2Config;
use crate::error::{Gpt2Error, Result};
use crate::ops::{accum, dot, gelu, layer_norm, matmul, softmax};
use crate::state::Gpt2State;
use crate::weights::{Gpt2LayerWeights, Gpt2Weights};
use rayon::prelude::*;
use std::path::Path;
use tracing::info;

/// Load weights for `config` from a directory of tensor files.
pub fn load_model<P: AsRef<Path>>(dir: P, config: &Gpt2Config) -> Result<Gpt2Weights> {
    let dir = dir.as_ref();
    info!(
        dir = %dir.display(),
        dim = config.dim,
        layers = config.n_layers,
        heads = config.n_heads,
        "loading model"
    );
    let weights = Gpt2Weights::load(dir, config)?;
    info!(blocks = weights.layers.len(), "model loaded");
    Ok(weights)
}

/// Perform a single-position forward pass, aligned with GPT2Model.forward.
///
/// Computes the hidden state at `slot` for `context[slot]`, writing that
/// position's keys and values into the cache. Slots must be run in order,
/// starting at 0; any other slot is rejected before the cache is touched.
/// Returns the final-normed hidden state.
pub fn forward<'a>(
    context: &[usize],
    slot: usize,
    config: &Gpt2Config,
    state: &'a mut Gpt2State,
    weights: &Gpt2Weights,
) -> Result<&'a [f32]> {
    state.cache.check_next(slot)?;
    let token = *context.get(slot).ok_or(Gpt2Error::SlotOutOfRange {
        slot,
        len: context.len(),
    })?;
    if token >= config.vocab_size {
        return Err(Gpt2Error::TokenOutOfRange {
            token,
            vocab_size: config.vocab_size,
        });
    }

    let dim = config.dim;

    // Token + position embedding
    let wte = weights.token_embedding(token, dim);
    let wpe = weights.position_embedding(slot, dim);
    for i in 0..dim {
        state.x[i] = wte[i] + wpe[i];
    }

    // Transformer blocks
    for (l, layer_weights) in weights.layers.iter().enumerate() {
        attention(l, slot, config, state, layer_weights);
        mlp(state, layer_weights);
    }
    state.cache.advance();

    // Final norm
    let x_clone = state.x.clone();
    layer_norm(&mut state.x, &x_clone, &weights.lnf_g, &weights.lnf_b);

    Ok(&state.x)
}

/// Causal self-attention for one block, aligned with GPT2Attention.forward.
fn attention(
    layer_idx: usize,
    slot: usize,
    config: &Gpt2Config,
    state: &mut Gpt2State,
    layer_weights: &Gpt2LayerWeights,
) {
    let dim = config.dim;
    let head_size = config.head_size();
    let scale = 1.0 / (head_size as f32).sqrt();

    // Input norm
    layer_norm(
        &mut state.xb,
        &state.x,
        &layer_weights.ln1_g,
        &layer_weights.ln1_b,
    );

    // Fused QKV projection
    matmul(
        &mut state.qkv,
        &state.xb,
        &layer_weights.attn_qkv_w,
        &layer_weights.attn_qkv_b,
    );

    // Cache K and V
    state
        .cache
        .write(layer_idx, &state.qkv[dim..2 * dim], &state.qkv[2 * dim..]);

    // Multi-head attention over positions 0..=slot (parallelized)
    let q = &state.qkv[..dim];
    let (keys, values) = state.cache.rows(layer_idx);

    state
        .att_out
        .par_chunks_mut(head_size)
        .enumerate()
        .for_each(|(h, out)| {
            let h_off = h * head_size;
            let q = &q[h_off..h_off + head_size];

            // Attention scores
            let mut att: Vec<f32> = (0..=slot)
                .map(|t| {
                    let k_off = t * dim + h_off;
                    dot(q, &keys[k_off..k_off + head_size]) * scale
                })
                .collect();

            softmax(&mut att);

            // Weighted sum of values
            out.fill(0.0);
            for (t, &a) in att.iter().enumerate() {
                let v_off = t * dim + h_off;
                let v = &values[v_off..v_off + head_size];
                for i in 0..head_size {
                    out[i] += a * v[i];
                }
            }
        });

    // Output projection
    matmul(
        &mut state.xb2,
        &state.att_out,
        &layer_weights.attn_proj_w,
        &layer_weights.attn_proj_b,
    );

    // Residual add
    accum(&mut state.x, &state.xb2);
}

/// Feed-forward block, aligned with GPT2MLP.forward.
fn mlp(state: &mut Gpt2State, layer_weights: &Gpt2LayerWeights) {
    // Input norm
    layer_norm(
        &mut state.xb,
        &state.x,
        &layer_weights.ln2_g,
        &layer_weights.ln2_b,
    );

    // Expand and activate
    matmul(
        &mut state.hb,
        &state.xb,
        &layer_weights.mlp_fc_w,
        &layer_weights.mlp_fc_b,
    );
    gelu(&mut state.hb);

    // Project back
    matmul(
        &mut state.xb2,
        &state.hb,
        &layer_weights.mlp_proj_w,
        &layer_weights.mlp_proj_b,
    );

    // Residual add
    accum(&mut state.x, &state.xb2);
}
