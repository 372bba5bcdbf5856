//! Generation session: one growing context and its attention cache.

use crate::config::Gpt2Config;
use crate::error::{Gpt2Error, Result};
use crate::model::forward;
use crate::sample::{Candidate, sample, score, top_k};
use crate::state::Gpt2State;
use crate::weights::Gpt2Weights;
use rand::Rng;
use tracing::debug;

/// Default size of the candidate pool.
pub const DEFAULT_TOP_K: usize = 20;

/// Sampling options for a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Number of highest-scoring tokens the next token is drawn from
    pub top_k: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Result of one generation step.
#[derive(Debug, Clone)]
pub struct Step {
    /// Ranked candidate pool, best first
    pub candidates: Vec<Candidate>,
    /// Token drawn from the pool and appended to the context
    pub token: usize,
}

/// A single sequence being generated against a loaded model.
///
/// The session exclusively owns its cache; the model is shared read-only.
pub struct Session<'m> {
    config: &'m Gpt2Config,
    weights: &'m Gpt2Weights,
    options: SessionOptions,
    state: Gpt2State,
    context: Vec<usize>,
}

impl<'m> Session<'m> {
    pub fn new(
        config: &'m Gpt2Config,
        weights: &'m Gpt2Weights,
        options: SessionOptions,
    ) -> Result<Self> {
        if options.top_k == 0 {
            return Err(Gpt2Error::InvalidConfig(
                "candidate pool size must be at least 1".into(),
            ));
        }
        Ok(Session {
            config,
            weights,
            options,
            state: Gpt2State::new(config),
            context: Vec::with_capacity(config.seq_len),
        })
    }

    /// Tokens processed so far, prompt first.
    pub fn context(&self) -> &[usize] {
        &self.context
    }

    /// Final-normed hidden state of the last processed position.
    pub fn hidden(&self) -> Option<&[f32]> {
        (!self.context.is_empty()).then_some(self.state.x.as_slice())
    }

    /// Append prompt tokens and run the model over each of them in order.
    pub fn feed(&mut self, tokens: &[usize]) -> Result<()> {
        if self.context.is_empty() && tokens.is_empty() {
            return Err(Gpt2Error::EmptyPrompt);
        }
        if self.context.len() + tokens.len() > self.config.seq_len {
            return Err(Gpt2Error::ContextOverflow {
                max: self.config.seq_len,
            });
        }
        if let Some(&token) = tokens.iter().find(|&&t| t >= self.config.vocab_size) {
            return Err(Gpt2Error::TokenOutOfRange {
                token,
                vocab_size: self.config.vocab_size,
            });
        }

        self.context.extend_from_slice(tokens);
        for slot in self.state.pos()..self.context.len() {
            forward(&self.context, slot, self.config, &mut self.state, self.weights)?;
        }
        debug!(positions = self.context.len(), "prompt processed");
        Ok(())
    }

    /// Rank the vocabulary for the next position without advancing.
    pub fn candidates(&mut self) -> Result<Vec<Candidate>> {
        if self.context.is_empty() {
            return Err(Gpt2Error::EmptyPrompt);
        }
        score(&mut self.state.logits, &self.state.x, &self.weights.wte);
        Ok(top_k(&self.state.logits, self.options.top_k))
    }

    /// Draw the next token, append it, and run the model at its position.
    ///
    /// Fails with [`Gpt2Error::ContextOverflow`] once the context window is
    /// full; the session is left unchanged in that case.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Step> {
        if self.context.len() >= self.config.seq_len {
            return Err(Gpt2Error::ContextOverflow {
                max: self.config.seq_len,
            });
        }
        let candidates = self.candidates()?;
        let token = sample(&candidates, rng).ok_or_else(|| {
            Gpt2Error::InvalidConfig("candidate pool is empty".into())
        })?;

        self.context.push(token);
        let slot = self.context.len() - 1;
        forward(&self.context, slot, self.config, &mut self.state, self.weights)?;

        debug!(slot, token, "generated token");
        Ok(Step { candidates, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tiny_model() -> (Gpt2Config, Gpt2Weights) {
        let config = Gpt2Config::new(64, 1, 1, 5, 4).unwrap();
        let dim = config.dim;
        let hdim = config.hidden_dim();
        let ramp = |n: usize, s: f32| (0..n).map(|i| ((i % 7) as f32 - 3.0) * s).collect::<Vec<_>>();
        let layer = crate::weights::Gpt2LayerWeights {
            ln1_g: vec![1.0; dim],
            ln1_b: vec![0.0; dim],
            attn_qkv_w: ramp(3 * dim * dim, 0.01),
            attn_qkv_b: vec![0.0; 3 * dim],
            attn_proj_w: ramp(dim * dim, 0.01),
            attn_proj_b: vec![0.0; dim],
            ln2_g: vec![1.0; dim],
            ln2_b: vec![0.0; dim],
            mlp_fc_w: ramp(hdim * dim, 0.01),
            mlp_fc_b: vec![0.0; hdim],
            mlp_proj_w: ramp(dim * hdim, 0.01),
            mlp_proj_b: vec![0.0; dim],
        };
        let weights = Gpt2Weights {
            wte: ramp(config.vocab_size * dim, 0.1),
            wpe: ramp(config.seq_len * dim, 0.05),
            layers: vec![layer],
            lnf_g: vec![1.0; dim],
            lnf_b: vec![0.0; dim],
        };
        (config, weights)
    }

    #[test]
    fn test_session_rejects_zero_top_k() {
        let (config, weights) = tiny_model();
        assert!(Session::new(&config, &weights, SessionOptions { top_k: 0 }).is_err());
    }

    #[test]
    fn test_feed_validates_prompt() {
        let (config, weights) = tiny_model();
        let mut session = Session::new(&config, &weights, SessionOptions::default()).unwrap();
        assert!(matches!(session.feed(&[]), Err(Gpt2Error::EmptyPrompt)));
        assert!(matches!(
            session.feed(&[0, 9]),
            Err(Gpt2Error::TokenOutOfRange { token: 9, .. })
        ));
        assert!(matches!(
            session.feed(&[0, 1, 2, 3, 4]),
            Err(Gpt2Error::ContextOverflow { max: 4 })
        ));
        assert!(session.context().is_empty());
        assert!(session.hidden().is_none());
    }

    #[test]
    fn test_step_stops_at_context_limit() {
        let (config, weights) = tiny_model();
        let mut session = Session::new(&config, &weights, SessionOptions::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        session.feed(&[1, 2]).unwrap();

        session.step(&mut rng).unwrap();
        let last = session.step(&mut rng).unwrap();
        assert_eq!(session.context().len(), 4);
        assert_eq!(session.context()[3], last.token);
        // Pool is clamped to the vocabulary.
        assert_eq!(last.candidates.len(), 5);

        assert!(matches!(
            session.step(&mut rng),
            Err(Gpt2Error::ContextOverflow { max: 4 })
        ));
        assert_eq!(session.context().len(), 4);
    }
}
