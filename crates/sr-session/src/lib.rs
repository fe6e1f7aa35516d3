//! Session management over a pluggable inference engine.
//!
//! The layering: [`Backend`] brackets engine init/shutdown and loads
//! [`Model`]s; a model creates [`Context`]s; contexts decode token
//! batches and expose the KV cache. [`Session`] sits on top with a
//! full generation loop (prefix caching, context shifting, stop
//! strings), and [`speculative`]/[`embedding`] add draft-and-verify
//! decoding and embedding extraction.

pub mod backend;
pub mod batch;
pub mod context;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod model;
pub mod speculative;

pub use backend::Backend;
pub use context::Context;
pub use embedding::embed;
pub use error::{Result, SessionError};
pub use generate::{FinishReason, GenerateOptions, GenerateOutput, GenerateStats, Session};
pub use model::{Model, TokenizeFit};
pub use speculative::{sync_draft, verify_round, SpeculativeResult};

pub use sr_engine::log;
pub use sr_engine::{ContextParams, ModelInfo, ModelParams, PerfData, Pos, SeqId, Token};
