//! Model weights for GPT-2.
//!
//! Every tensor lives in its own headerless file of little-endian `f32`s,
//! named after the TensorFlow checkpoint variable it was exported from.
//! Matrices (`.t` files) are stored transposed, one row per output unit.

use crate::config::Gpt2Config;
use crate::error::{Gpt2Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Weights for a single transformer block.
#[derive(Debug, Clone)]
pub struct Gpt2LayerWeights {
    /// Pre-attention LayerNorm scale (ln_1.weight)
    pub ln1_g: Vec<f32>,
    /// Pre-attention LayerNorm shift (ln_1.bias)
    pub ln1_b: Vec<f32>,
    /// Fused query/key/value projection [3 * dim, dim] (attn.c_attn.weight)
    pub attn_qkv_w: Vec<f32>,
    /// Fused query/key/value bias (attn.c_attn.bias)
    pub attn_qkv_b: Vec<f32>,
    /// Attention output projection [dim, dim] (attn.c_proj.weight)
    pub attn_proj_w: Vec<f32>,
    /// Attention output bias (attn.c_proj.bias)
    pub attn_proj_b: Vec<f32>,
    /// Pre-MLP LayerNorm scale (ln_2.weight)
    pub ln2_g: Vec<f32>,
    /// Pre-MLP LayerNorm shift (ln_2.bias)
    pub ln2_b: Vec<f32>,
    /// MLP expansion [4 * dim, dim] (mlp.c_fc.weight)
    pub mlp_fc_w: Vec<f32>,
    /// MLP expansion bias (mlp.c_fc.bias)
    pub mlp_fc_b: Vec<f32>,
    /// MLP projection [dim, 4 * dim] (mlp.c_proj.weight)
    pub mlp_proj_w: Vec<f32>,
    /// MLP projection bias (mlp.c_proj.bias)
    pub mlp_proj_b: Vec<f32>,
}

/// All model parameters, aligned with GPT2Model weights in Transformers.
#[derive(Debug, Clone)]
pub struct Gpt2Weights {
    /// Token embeddings [vocab_size, dim] (wte.weight), also the output projection
    pub wte: Vec<f32>,
    /// Position embeddings [seq_len, dim] (wpe.weight)
    pub wpe: Vec<f32>,
    /// Transformer blocks (h)
    pub layers: Vec<Gpt2LayerWeights>,
    /// Final LayerNorm scale (ln_f.weight)
    pub lnf_g: Vec<f32>,
    /// Final LayerNorm shift (ln_f.bias)
    pub lnf_b: Vec<f32>,
}

impl Gpt2Weights {
    /// Load all tensors from a model directory.
    ///
    /// Blocks are read in parallel; the call returns only once every file is
    /// loaded, and fails as a whole if any of them is missing or malformed.
    pub fn load<P: AsRef<Path>>(dir: P, config: &Gpt2Config) -> Result<Self> {
        let dir = dir.as_ref();
        let dim = config.dim;

        let wte = read_tensor(dir, "wte.dat", config.vocab_size * dim)?;
        let wpe = read_tensor(dir, "wpe.dat", config.seq_len * dim)?;
        let lnf_g = read_tensor(dir, "lnf_g.dat", dim)?;
        let lnf_b = read_tensor(dir, "lnf_b.dat", dim)?;

        let layers = (0..config.n_layers)
            .into_par_iter()
            .map(|l| Gpt2LayerWeights::load(dir, l, config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Gpt2Weights {
            wte,
            wpe,
            layers,
            lnf_g,
            lnf_b,
        })
    }

    /// Token embedding row for `token`.
    #[inline]
    pub fn token_embedding(&self, token: usize, dim: usize) -> &[f32] {
        &self.wte[token * dim..(token + 1) * dim]
    }

    /// Position embedding row for `pos`.
    #[inline]
    pub fn position_embedding(&self, pos: usize, dim: usize) -> &[f32] {
        &self.wpe[pos * dim..(pos + 1) * dim]
    }
}

impl Gpt2LayerWeights {
    fn load(dir: &Path, l: usize, config: &Gpt2Config) -> Result<Self> {
        let dim = config.dim;
        let hdim = config.hidden_dim();
        let t = |name: &str, count: usize| read_tensor(dir, &format!("h{l}_{name}"), count);

        let layer = Gpt2LayerWeights {
            ln1_g: t("ln1_g.dat", dim)?,
            ln1_b: t("ln1_b.dat", dim)?,
            attn_qkv_w: t("attn_cattn_w.t", 3 * dim * dim)?,
            attn_qkv_b: t("attn_cattn_b.dat", 3 * dim)?,
            attn_proj_w: t("attn_cproj_w.t", dim * dim)?,
            attn_proj_b: t("attn_cproj_b.dat", dim)?,
            ln2_g: t("ln2_g.dat", dim)?,
            ln2_b: t("ln2_b.dat", dim)?,
            mlp_fc_w: t("mlp_cfc_w.t", hdim * dim)?,
            mlp_fc_b: t("mlp_cfc_b.dat", hdim)?,
            mlp_proj_w: t("mlp_cproj_w.t", dim * hdim)?,
            mlp_proj_b: t("mlp_cproj_b.dat", dim)?,
        };
        debug!(layer = l, "loaded block weights");
        Ok(layer)
    }
}

/// Read a tensor file and check it holds exactly `count` values.
fn read_tensor(dir: &Path, name: &str, count: usize) -> Result<Vec<f32>> {
    let path = dir.join(name);
    let values = read_f32_file(&path)?;
    if values.len() != count {
        return Err(Gpt2Error::Load {
            path,
            reason: format!("expected {count} values, found {}", values.len()),
        });
    }
    Ok(values)
}

/// Decode a headerless little-endian `f32` file into an owned vector.
pub fn read_f32_file(path: &Path) -> Result<Vec<f32>> {
    let bytes = fs::read(path).map_err(|e| load_error(path, e.to_string()))?;
    if bytes.len() % 4 != 0 {
        return Err(load_error(
            path,
            format!("length {} is not a multiple of 4", bytes.len()),
        ));
    }
    let mut values = vec![0f32; bytes.len() / 4];
    LittleEndian::read_f32_into(&bytes, &mut values);
    Ok(values)
}

fn load_error(path: &Path, reason: String) -> Gpt2Error {
    Gpt2Error::Load {
        path: PathBuf::from(path),
        reason,
    }
}
