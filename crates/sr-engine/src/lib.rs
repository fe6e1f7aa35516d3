pub mod batch;
pub mod engine;
pub mod log;
pub mod sim;
pub mod types;

pub use batch::{Batch, BatchItem};
pub use engine::Engine;
pub use sim::SimEngine;
pub use types::{
    ContextParams, DecodeStatus, EncodedImage, ModelInfo, ModelParams, PerfData, Pos, RawBitmap,
    RawContext, RawModel, RawVision, SeqId, Token,
};
