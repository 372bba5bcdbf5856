//! GPT-2 inference library in Rust
//!
//! A minimal implementation of GPT-2 inference, aligned with GPT2Model in
//! Hugging Face Transformers: one sequence, one position at a time, with an
//! incrementally filled key/value cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod ops;
pub mod sample;
pub mod session;
pub mod state;
pub mod tokenizer;
pub mod weights;

pub use cache::KvCache;
pub use config::{Gpt2Config, Preset};
pub use error::{Gpt2Error, Result};
pub use model::{forward, load_model};
pub use sample::{Candidate, rank_index, sample, score, top_k};
pub use session::{Session, SessionOptions, Step};
pub use state::Gpt2State;
pub use tokenizer::{Tokenizer, load_tokenizer};
pub use weights::{Gpt2LayerWeights, Gpt2Weights};
