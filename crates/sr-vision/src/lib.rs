//! Multimodal prompt evaluation: image loading, prompt chunking, and
//! mixed text/image decoding into a session context.

pub mod chunks;
pub mod error;
mod eval;
pub mod vision;

pub use chunks::Chunk;
pub use error::{Result, VisionError};
pub use vision::VisionContext;
