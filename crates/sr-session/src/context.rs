//! Owned inference context with cursor-tracked decoding.

use std::sync::Arc;

use sr_engine::{Batch, DecodeStatus, Engine, PerfData, Pos, RawContext, RawModel, SeqId, Token};
use sr_sampler::SamplerChain;
use tracing::trace;

use crate::batch;
use crate::error::{Result, SessionError};

/// An inference context. Frees the engine-side handle on drop.
///
/// The context tracks a position cursor: `decode` and `decode_one`
/// append at the cursor and advance it, while the `*_at` variants leave
/// it alone so callers can manage positions explicitly.
pub struct Context {
    engine: Arc<dyn Engine>,
    raw: RawContext,
    model: RawModel,
    pos: Pos,
    n_ctx: u32,
    n_batch: u32,
}

impl Context {
    pub(crate) fn from_raw(
        engine: Arc<dyn Engine>,
        raw: RawContext,
        model: RawModel,
        n_ctx: u32,
        n_batch: u32,
    ) -> Self {
        Self {
            engine,
            raw,
            model,
            pos: 0,
            n_ctx,
            n_batch,
        }
    }

    /// Current position cursor.
    pub fn pos(&self) -> Pos {
        self.pos
    }

    /// Move the cursor. Callers that evaluate through side channels
    /// (image segments) use this to keep the cursor honest.
    pub fn set_pos(&mut self, pos: Pos) {
        self.pos = pos;
    }

    /// Context window capacity in positions.
    pub fn n_ctx(&self) -> u32 {
        self.n_ctx
    }

    /// Maximum tokens per decode call.
    pub fn n_batch(&self) -> u32 {
        self.n_batch
    }

    pub fn raw(&self) -> RawContext {
        self.raw
    }

    fn submit(&mut self, batch: &Batch) -> Result<()> {
        match self.engine.decode(self.raw, batch) {
            DecodeStatus::Ok => Ok(()),
            DecodeStatus::CacheFull => Err(SessionError::CacheFull),
            DecodeStatus::Error => Err(SessionError::Decode),
        }
    }

    /// Decode `tokens` at the cursor and advance it.
    pub fn decode(&mut self, tokens: &[Token]) -> Result<()> {
        self.decode_at(tokens, self.pos)?;
        self.pos += tokens.len() as Pos;
        Ok(())
    }

    /// Decode one token at the cursor and advance it.
    pub fn decode_one(&mut self, token: Token) -> Result<()> {
        self.decode(std::slice::from_ref(&token))
    }

    /// Decode `tokens` starting at `start`. The cursor is untouched.
    pub fn decode_at(&mut self, tokens: &[Token], start: Pos) -> Result<()> {
        if tokens.is_empty() {
            return Err(SessionError::InvalidArgument("empty token batch"));
        }
        trace!(n = tokens.len(), start, "decode");
        self.submit(&batch::positioned(tokens, start))
    }

    /// Decode at the cursor requesting logits for every row, advancing
    /// the cursor.
    pub fn decode_all_logits(&mut self, tokens: &[Token]) -> Result<()> {
        self.decode_all_logits_at(tokens, self.pos)?;
        self.pos += tokens.len() as Pos;
        Ok(())
    }

    /// Decode at `start` requesting logits for every row.
    pub fn decode_all_logits_at(&mut self, tokens: &[Token], start: Pos) -> Result<()> {
        if tokens.is_empty() {
            return Err(SessionError::InvalidArgument("empty token batch"));
        }
        self.submit(&batch::positioned_all_logits(tokens, start))
    }

    /// Run the encoder over `tokens`. Leaves the KV cache and cursor
    /// untouched.
    pub fn encode(&mut self, tokens: &[Token]) -> Result<()> {
        if tokens.is_empty() {
            return Err(SessionError::InvalidArgument("empty token batch"));
        }
        match self.engine.encode(self.raw, &batch::encoder(tokens)) {
            DecodeStatus::Ok => Ok(()),
            DecodeStatus::CacheFull => Err(SessionError::CacheFull),
            DecodeStatus::Error => Err(SessionError::Encode),
        }
    }

    /// Logits for output row `idx` of the last decode; `-1` = the last
    /// row that produced logits.
    pub fn logits_at(&self, idx: i32) -> Result<Vec<f32>> {
        self.engine
            .logits(self.raw, idx)
            .ok_or(SessionError::NoLogits(idx))
    }

    /// Embedding vector for output row `idx`, if that row produced one.
    pub fn embeddings_at(&self, idx: i32) -> Option<Vec<f32>> {
        self.engine.embeddings(self.raw, idx)
    }

    /// Pooled embedding for `seq`, if available.
    pub fn embeddings_seq(&self, seq: SeqId) -> Option<Vec<f32>> {
        self.engine.embeddings_seq(self.raw, seq)
    }

    /// Sample the next token from output row `idx`.
    pub fn sample(&self, chain: &mut SamplerChain, idx: i32) -> Result<Token> {
        let logits = self.logits_at(idx)?;
        Ok(chain.sample(&logits))
    }

    // -- KV memory --

    /// Drop every cached position and reset the cursor.
    pub fn clear_memory(&mut self) {
        self.engine.memory_clear(self.raw);
        self.pos = 0;
    }

    /// Remove cached positions `[p0, p1)` for `seq`. Negative `seq`
    /// targets all sequences; negative bounds extend to the ends.
    pub fn remove_range(&self, seq: SeqId, p0: Pos, p1: Pos) -> bool {
        self.engine.memory_seq_rm(self.raw, seq, p0, p1)
    }

    /// Shift cached positions in `[p0, p1)` by `delta`.
    pub fn shift_range(&self, seq: SeqId, p0: Pos, p1: Pos, delta: Pos) {
        self.engine.memory_seq_add(self.raw, seq, p0, p1, delta);
    }

    /// Highest occupied position for `seq`, `-1` when empty.
    pub fn max_position(&self, seq: SeqId) -> Pos {
        self.engine.memory_seq_pos_max(self.raw, seq)
    }

    /// Discard everything from `p0` onward and park the cursor there.
    pub fn truncate(&mut self, p0: Pos) -> Result<()> {
        if p0 < 0 {
            return Err(SessionError::InvalidArgument("negative truncation point"));
        }
        if !self.remove_range(0, p0, -1) {
            return Err(SessionError::Decode);
        }
        self.pos = p0;
        Ok(())
    }

    /// Slide the window: drop the first `n` positions and shift the
    /// rest down so the sequence stays contiguous from zero.
    pub fn shift_window(&mut self, n: Pos) -> Result<()> {
        if n <= 0 || n >= self.pos {
            return Err(SessionError::InvalidArgument("shift amount out of range"));
        }
        if !self.remove_range(0, 0, n) {
            return Err(SessionError::Decode);
        }
        self.shift_range(0, n, -1, -n);
        self.pos -= n;
        Ok(())
    }

    // -- runtime properties --

    pub fn set_threads(&self, n_threads: i32, n_threads_batch: i32) {
        self.engine.set_threads(self.raw, n_threads, n_threads_batch);
    }

    pub fn set_embeddings_mode(&self, enabled: bool) {
        self.engine.set_embeddings(self.raw, enabled);
    }

    pub fn set_causal_attention(&self, causal: bool) {
        self.engine.set_causal_attn(self.raw, causal);
    }

    /// While set, decodes run as throwaway passes that produce no
    /// output rows.
    pub fn set_warmup(&self, warmup: bool) {
        self.engine.set_warmup(self.raw, warmup);
    }

    /// One throwaway decode to page in weights and compile kernels.
    /// Always leaves the cache empty and counters reset.
    pub fn warmup(&mut self) -> Result<()> {
        self.warmup_full(1)
    }

    /// Warmup with a batch of `n` tokens, exercising the prompt path.
    /// Clamped to one batch; always leaves the cache empty.
    pub fn warmup_full(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(SessionError::InvalidArgument("zero warmup length"));
        }
        let n = n.min(self.n_batch as usize).min(self.n_ctx as usize);
        let tokens = vec![self.engine.token_bos(self.model); n];
        self.set_warmup(true);
        let result = self.decode_at(&tokens, 0);
        self.set_warmup(false);
        self.clear_memory();
        self.perf_reset();
        result
    }

    // -- performance --

    pub fn perf(&self) -> PerfData {
        self.engine.perf(self.raw)
    }

    pub fn perf_reset(&self) {
        self.engine.perf_reset(self.raw);
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.engine.context_free(self.raw);
    }
}
