//! Plain data types shared across the engine boundary.

/// Token id in the engine's vocabulary.
pub type Token = i32;

/// Absolute position within a sequence's KV cache.
pub type Pos = i32;

/// Sequence id within one context.
pub type SeqId = i32;

/// Opaque handle to a loaded model, minted by an [`Engine`](crate::Engine).
///
/// Outside the engine crate these ids are only reachable through the
/// owning RAII wrapper, so a handle that exists is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawModel(u64);

/// Opaque handle to an inference context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawContext(u64);

/// Opaque handle to a vision (multimodal projector) context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawVision(u64);

/// Opaque handle to a decoded image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawBitmap(u64);

macro_rules! impl_raw {
    ($($ty:ident),*) => {
        $(impl $ty {
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            pub fn id(self) -> u64 {
                self.0
            }
        })*
    };
}

impl_raw!(RawModel, RawContext, RawVision, RawBitmap);

/// Metadata describing a loaded model.
///
/// Querying an absent model yields the zero-valued default record rather
/// than an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelInfo {
    /// Embedding (hidden state) dimension.
    pub n_embd: i32,
    /// Context length the model was trained with.
    pub n_ctx_train: i32,
    /// Number of transformer layers.
    pub n_layer: i32,
    /// Number of attention heads.
    pub n_head: i32,
    /// Total byte size of the weights.
    pub model_size: u64,
    /// Total parameter count.
    pub n_params: u64,
    /// True for encoder-capable models (BERT-style embedding models).
    pub has_encoder: bool,
    /// Human-readable model description.
    pub description: String,
    /// Chat template shipped with the model, if any.
    pub chat_template: Option<String>,
}

/// Performance counters accumulated by a context since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerfData {
    /// Model load time in milliseconds.
    pub load_ms: f64,
    /// Cumulative prompt-evaluation time in milliseconds.
    pub prompt_ms: f64,
    /// Cumulative single-token evaluation time in milliseconds.
    pub eval_ms: f64,
    /// Number of prompt tokens evaluated.
    pub prompt_tokens: i32,
    /// Number of generation tokens evaluated.
    pub eval_tokens: i32,
}

/// Model loading parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    /// Layers to offload to the GPU. `0` = CPU-only, `-1` = offload all.
    pub n_gpu_layers: i32,
    /// Memory-map the model file instead of reading it into RAM.
    pub use_mmap: bool,
    /// Lock model memory to prevent the OS from swapping it out.
    pub use_mlock: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_gpu_layers: 0,
            use_mmap: true,
            use_mlock: false,
        }
    }
}

/// Context creation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextParams {
    /// Context window size. `0` = use the model's training context.
    pub n_ctx: u32,
    /// Maximum batch size for prompt processing. `0` = engine default.
    pub n_batch: u32,
    /// Threads for single-token generation. `0` = auto-detect.
    pub n_threads: i32,
    /// Threads for batch processing. `0` = same as `n_threads`.
    pub n_threads_batch: i32,
    /// Enable embedding extraction mode.
    pub embeddings: bool,
    /// Flash attention selection, forwarded verbatim to the engine.
    /// `-1` = leave the engine default.
    pub flash_attn: i32,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            n_ctx: 2048,
            n_batch: 512,
            n_threads: 4,
            n_threads_batch: 0,
            embeddings: false,
            flash_attn: -1,
        }
    }
}

/// Tri-state outcome of a decode or encode call.
///
/// `CacheFull` is kept distinct from `Error` so callers can evict or
/// shift the window and retry instead of aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    Ok,
    CacheFull,
    Error,
}

/// An image segment produced by the vision encoder at tokenize time.
///
/// Owns everything evaluation needs, so the source bitmap can be freed
/// as soon as tokenization finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    n_pos: usize,
    digest: u64,
}

impl EncodedImage {
    pub fn new(n_pos: usize, digest: u64) -> Self {
        Self { n_pos, digest }
    }

    /// Number of KV-cache positions this segment occupies when evaluated.
    pub fn n_positions(&self) -> usize {
        self.n_pos
    }

    /// Engine-defined content digest (useful for caching and tests).
    pub fn digest(&self) -> u64 {
        self.digest
    }
}
