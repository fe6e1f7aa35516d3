use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("failed to load model from {path}")]
    ModelLoad { path: PathBuf },

    #[error("failed to create inference context")]
    ContextCreate,

    #[error("KV cache is full")]
    CacheFull,

    #[error("decode failed")]
    Decode,

    #[error("encode failed")]
    Encode,

    #[error("no logits available at output index {0}")]
    NoLogits(i32),

    #[error("context window full: {used} of {capacity} positions used")]
    WindowFull { used: usize, capacity: usize },

    #[error("embedding dimension mismatch: got {got}, expected {expected}")]
    EmbeddingDim { got: usize, expected: usize },
}

pub type Result<T> = std::result::Result<T, SessionError>;
