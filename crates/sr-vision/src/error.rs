use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the multimodal pipeline. Each stage of image
/// evaluation fails distinctly so callers can tell a bad projector from
/// a bad image from a bad prompt.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("failed to load multimodal projector from {path}")]
    Projector { path: PathBuf },

    #[error("projector {path} does not support image input")]
    Unsupported { path: PathBuf },

    #[error("failed to encode image segment")]
    Alloc,

    #[error("failed to load image from {0}")]
    ImageLoad(PathBuf),

    #[error("failed to tokenize multimodal prompt")]
    Tokenize,

    #[error("prompt has {markers} media markers but {images} images were supplied")]
    MarkerMismatch { markers: usize, images: usize },

    #[error("failed to evaluate multimodal prompt")]
    Eval,
}

pub type Result<T> = std::result::Result<T, VisionError>;
