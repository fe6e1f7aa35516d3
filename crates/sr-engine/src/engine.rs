//! The inference-engine collaborator surface.

use std::path::Path;

use crate::batch::Batch;
use crate::types::{
    ContextParams, DecodeStatus, EncodedImage, ModelInfo, ModelParams, PerfData, Pos, RawBitmap,
    RawContext, RawModel, RawVision, SeqId, Token,
};

/// Trait for pluggable inference engines.
///
/// This models the external compute engine and its vocabulary: forward
/// passes, tokenizer internals, model-file parsing, and image decoding
/// all happen behind this seam. The session layer owns handle lifecycle,
/// batch construction, and error typing on top of it.
///
/// Contract notes:
///
/// - `init` must be called once before any other method and `shutdown`
///   once after every handle has been freed. Re-entrant pairs are a
///   caller bug, not enforced here.
/// - Every `*_free` method is a no-op on unknown ids so a misbehaving
///   caller cannot crash the engine.
/// - `tokenize` and `token_piece` keep the collaborator's raw size-probe
///   convention: a negative return is the negated required buffer size.
/// - A context must not be driven by more than one in-flight
///   decode/encode at a time; the session layer enforces this through
///   exclusive ownership.
pub trait Engine: Send + Sync {
    // -- process state --

    fn init(&self);
    fn shutdown(&self);

    /// Build/feature description string.
    fn system_info(&self) -> String;

    // -- model lifecycle --

    fn model_load(&self, path: &Path, params: &ModelParams) -> Option<RawModel>;
    fn model_free(&self, model: RawModel);

    /// Metadata record; zero-valued default for an unknown model.
    fn model_info(&self, model: RawModel) -> ModelInfo;

    // -- context lifecycle --

    fn context_new(&self, model: RawModel, params: &ContextParams) -> Option<RawContext>;
    fn context_free(&self, ctx: RawContext);

    // -- vocabulary --

    /// Tokenize `text` into `out`. Returns the token count, or the
    /// negated required capacity when `out` is too small.
    fn tokenize(
        &self,
        model: RawModel,
        text: &str,
        out: &mut [Token],
        add_special: bool,
        parse_special: bool,
    ) -> i32;

    /// Render one token into `out`. Returns the byte count written, or
    /// the negated required capacity when `out` is too small.
    fn token_piece(&self, model: RawModel, token: Token, out: &mut [u8]) -> i32;

    /// End-of-generation classification. Unknown models report `true`
    /// (the safe default: stop generating).
    fn token_is_eog(&self, model: RawModel, token: Token) -> bool;

    fn token_bos(&self, model: RawModel) -> Token;
    fn token_eos(&self, model: RawModel) -> Token;
    fn vocab_len(&self, model: RawModel) -> usize;

    // -- decode / encode --

    fn decode(&self, ctx: RawContext, batch: &Batch) -> DecodeStatus;

    /// Encoder path. Does not touch the KV cache.
    fn encode(&self, ctx: RawContext, batch: &Batch) -> DecodeStatus;

    /// Logits for the output row at batch index `idx`; `-1` = the last
    /// computed output. `None` if the row produced no logits.
    fn logits(&self, ctx: RawContext, idx: i32) -> Option<Vec<f32>>;

    /// Embedding vector for the output row at batch index `idx`.
    fn embeddings(&self, ctx: RawContext, idx: i32) -> Option<Vec<f32>>;

    /// Pooled embeddings for a whole sequence.
    fn embeddings_seq(&self, ctx: RawContext, seq: SeqId) -> Option<Vec<f32>>;

    // -- KV memory --

    fn memory_clear(&self, ctx: RawContext);

    /// Remove cached positions `[p0, p1)` for `seq`. `seq < 0` = all
    /// sequences, `p0 < 0` normalizes to `0`, `p1 < 0` to unbounded.
    /// Returns whether the removal succeeded.
    fn memory_seq_rm(&self, ctx: RawContext, seq: SeqId, p0: Pos, p1: Pos) -> bool;

    /// Shift cached positions in `[p0, p1)` by `delta`.
    fn memory_seq_add(&self, ctx: RawContext, seq: SeqId, p0: Pos, p1: Pos, delta: Pos);

    /// Highest occupied position for `seq`, or `-1` when empty.
    fn memory_seq_pos_max(&self, ctx: RawContext, seq: SeqId) -> Pos;

    // -- context properties --

    fn set_threads(&self, ctx: RawContext, n_threads: i32, n_threads_batch: i32);
    fn set_embeddings(&self, ctx: RawContext, enabled: bool);
    fn set_causal_attn(&self, ctx: RawContext, causal: bool);
    fn set_warmup(&self, ctx: RawContext, warmup: bool);

    // -- performance --

    fn perf(&self, ctx: RawContext) -> PerfData;
    fn perf_reset(&self, ctx: RawContext);

    // -- multimodal --

    fn vision_init(
        &self,
        mmproj: &Path,
        model: RawModel,
        n_threads: i32,
        use_gpu: bool,
    ) -> Option<RawVision>;
    fn vision_free(&self, vision: RawVision);
    fn vision_supported(&self, vision: RawVision) -> bool;

    /// The placeholder marker that stands in for one image in a prompt.
    fn media_marker(&self) -> String {
        "<__media__>".to_string()
    }

    fn bitmap_load(&self, vision: RawVision, path: &Path) -> Option<RawBitmap>;
    fn bitmap_free(&self, bitmap: RawBitmap);

    /// Run the vision encoder over a bitmap, producing a self-contained
    /// image segment. The bitmap may be freed afterwards.
    fn encode_bitmap(&self, vision: RawVision, bitmap: RawBitmap) -> Option<EncodedImage>;

    /// Evaluate an encoded image segment into the context at `pos`.
    /// Image rows never produce logits.
    fn decode_image(
        &self,
        ctx: RawContext,
        image: &EncodedImage,
        seq: SeqId,
        pos: Pos,
    ) -> DecodeStatus;
}
