//! Error types for GPT-2 inference.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Gpt2Error {
    #[error("Failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("Unknown model preset: {0}")]
    UnknownPreset(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Token {token} out of range for vocabulary of {vocab_size}")]
    TokenOutOfRange { token: usize, vocab_size: usize },

    #[error("Context overflow: at most {max} positions fit in the context window")]
    ContextOverflow { max: usize },

    #[error("Slot {slot} is past the end of a context of length {len}")]
    SlotOutOfRange { slot: usize, len: usize },

    #[error("Forward pass at slot {slot} out of order, next slot is {expected}")]
    CacheOrder { slot: usize, expected: usize },

    #[error("Prompt produced no tokens")]
    EmptyPrompt,
}

pub type Result<T> = std::result::Result<T, Gpt2Error>;
