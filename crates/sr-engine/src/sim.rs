//! Deterministic in-memory engine.
//!
//! `SimEngine` implements the full [`Engine`] surface without any model
//! weights: the vocabulary is byte-level and logits/embeddings are hash
//! functions of (model, token, position). That makes every decode
//! reproducible, which is what the session-layer tests key off.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::debug;

use crate::batch::Batch;
use crate::engine::Engine;
use crate::types::{
    ContextParams, DecodeStatus, EncodedImage, ModelInfo, ModelParams, PerfData, Pos, RawBitmap,
    RawContext, RawModel, RawVision, SeqId, Token,
};

/// Byte tokens 0..=255, then BOS and EOS.
const SIM_VOCAB: usize = 258;
const TOK_BOS: Token = 256;
const TOK_EOS: Token = 257;

/// Embedding width reported by every sim model.
const SIM_EMBD: usize = 32;

/// KV positions one encoded image occupies.
const IMAGE_CELLS: usize = 16;

fn mix(mut x: u64) -> u64 {
    // splitmix64 finalizer
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

fn score(model: u64, token: Token, pos: Pos, slot: u64) -> f32 {
    let h = mix(model)
        .wrapping_add(mix(token as u64))
        .wrapping_add(mix(pos as u64 ^ 0x5bd1_e995))
        .wrapping_add(mix(slot));
    ((mix(h) >> 40) as f32) / (1u32 << 24) as f32
}

fn sim_logits(model: u64, token: Token, pos: Pos) -> Vec<f32> {
    (0..SIM_VOCAB as u64)
        .map(|v| {
            let s = score(model, token, pos, v);
            // Keep EOS strictly below every byte token so greedy
            // decoding never ends a stream on its own.
            if v == TOK_EOS as u64 {
                s - 1.0
            } else {
                s
            }
        })
        .collect()
}

fn sim_embedding(model: u64, token: Token, pos: Pos) -> Vec<f32> {
    (0..SIM_EMBD as u64)
        .map(|v| score(model, token, pos, v ^ 0xe1bd) - 0.5)
        .collect()
}

struct SimModel {
    path: PathBuf,
    size: u64,
    has_encoder: bool,
}

struct OutputRow {
    seq: SeqId,
    logits: Option<Vec<f32>>,
    embedding: Option<Vec<f32>>,
}

struct SimContext {
    model: u64,
    n_ctx: u32,
    seqs: HashMap<SeqId, BTreeSet<Pos>>,
    /// Output rows from the most recent decode/encode, by batch index.
    outputs: BTreeMap<usize, OutputRow>,
    embeddings_on: bool,
    warmup: bool,
    perf: PerfData,
}

impl SimContext {
    fn occupied_total(&self) -> usize {
        self.seqs.values().map(BTreeSet::len).sum()
    }
}

struct SimVision {
    supported: bool,
}

#[derive(Default)]
struct SimState {
    next_id: u64,
    models: HashMap<u64, SimModel>,
    ctxs: HashMap<u64, SimContext>,
    visions: HashMap<u64, SimVision>,
    /// Live bitmap id -> content digest.
    bitmaps: HashMap<u64, u64>,
    bitmaps_loaded: u64,
    bitmaps_freed: u64,
}

impl SimState {
    fn mint(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory [`Engine`] with deterministic outputs.
#[derive(Default)]
pub struct SimEngine {
    state: Mutex<SimState>,
}

impl SimEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bitmaps loaded but not yet freed. Leak detector for tests.
    pub fn live_bitmaps(&self) -> u64 {
        let state = self.state.lock();
        state.bitmaps_loaded - state.bitmaps_freed
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Engine for SimEngine {
    fn init(&self) {
        crate::log::emit("sim: backend initialized\n");
    }

    fn shutdown(&self) {
        crate::log::emit("sim: backend shut down\n");
    }

    fn system_info(&self) -> String {
        "sim-engine | deterministic in-memory backend | byte-level vocab".to_string()
    }

    fn model_load(&self, path: &Path, params: &ModelParams) -> Option<RawModel> {
        let size = fs::metadata(path).ok()?.len();
        let name = file_name(path);
        let has_encoder = name.contains("encoder");
        let mut state = self.state.lock();
        let id = state.mint();
        state.models.insert(
            id,
            SimModel {
                path: path.to_path_buf(),
                size,
                has_encoder,
            },
        );
        debug!(model = id, path = %path.display(), gpu_layers = params.n_gpu_layers, "model loaded");
        crate::log::emit(&format!("sim: loaded model {name}\n"));
        Some(RawModel::new(id))
    }

    fn model_free(&self, model: RawModel) {
        self.state.lock().models.remove(&model.id());
    }

    fn model_info(&self, model: RawModel) -> ModelInfo {
        let state = self.state.lock();
        match state.models.get(&model.id()) {
            Some(m) => ModelInfo {
                n_embd: SIM_EMBD as i32,
                n_ctx_train: 4096,
                n_layer: 4,
                n_head: 4,
                model_size: m.size,
                n_params: 1_000_000,
                has_encoder: m.has_encoder,
                description: format!("sim: {}", file_name(&m.path)),
                chat_template: None,
            },
            None => ModelInfo::default(),
        }
    }

    fn context_new(&self, model: RawModel, params: &ContextParams) -> Option<RawContext> {
        let mut state = self.state.lock();
        if !state.models.contains_key(&model.id()) {
            return None;
        }
        let n_ctx = if params.n_ctx == 0 { 4096 } else { params.n_ctx };
        let id = state.mint();
        state.ctxs.insert(
            id,
            SimContext {
                model: model.id(),
                n_ctx,
                seqs: HashMap::new(),
                outputs: BTreeMap::new(),
                embeddings_on: params.embeddings,
                warmup: false,
                perf: PerfData::default(),
            },
        );
        Some(RawContext::new(id))
    }

    fn context_free(&self, ctx: RawContext) {
        self.state.lock().ctxs.remove(&ctx.id());
    }

    fn tokenize(
        &self,
        model: RawModel,
        text: &str,
        out: &mut [Token],
        add_special: bool,
        _parse_special: bool,
    ) -> i32 {
        if !self.state.lock().models.contains_key(&model.id()) {
            return 0;
        }
        let mut tokens: Vec<Token> = Vec::with_capacity(text.len() + 1);
        if add_special {
            tokens.push(TOK_BOS);
        }
        tokens.extend(text.bytes().map(Token::from));
        let n = tokens.len();
        if out.len() < n {
            return -(n as i32);
        }
        out[..n].copy_from_slice(&tokens);
        n as i32
    }

    fn token_piece(&self, model: RawModel, token: Token, out: &mut [u8]) -> i32 {
        if !self.state.lock().models.contains_key(&model.id()) {
            return 0;
        }
        let piece: &[u8] = match token {
            TOK_BOS => b"<s>",
            TOK_EOS => b"</s>",
            t if (0..256).contains(&t) => return write_byte(t as u8, out),
            _ => return 0,
        };
        if out.len() < piece.len() {
            return -(piece.len() as i32);
        }
        out[..piece.len()].copy_from_slice(piece);
        piece.len() as i32
    }

    fn token_is_eog(&self, model: RawModel, token: Token) -> bool {
        if !self.state.lock().models.contains_key(&model.id()) {
            return true;
        }
        token == TOK_EOS
    }

    fn token_bos(&self, _model: RawModel) -> Token {
        TOK_BOS
    }

    fn token_eos(&self, _model: RawModel) -> Token {
        TOK_EOS
    }

    fn vocab_len(&self, model: RawModel) -> usize {
        if self.state.lock().models.contains_key(&model.id()) {
            SIM_VOCAB
        } else {
            0
        }
    }

    fn decode(&self, ctx: RawContext, batch: &Batch) -> DecodeStatus {
        let mut state = self.state.lock();
        let Some(c) = state.ctxs.get_mut(&ctx.id()) else {
            return DecodeStatus::Error;
        };
        let n = batch.len();
        if n == 0 {
            return DecodeStatus::Error;
        }
        if c.occupied_total() + n > c.n_ctx as usize {
            return DecodeStatus::CacheFull;
        }
        // Reject duplicate (seq, pos) pairs within one batch.
        let mut fresh: BTreeSet<(SeqId, Pos)> = BTreeSet::new();
        for item in batch.items() {
            for &seq in &item.seq_ids {
                if !fresh.insert((seq, item.pos)) {
                    return DecodeStatus::Error;
                }
            }
        }
        for &(seq, pos) in &fresh {
            c.seqs.entry(seq).or_default().insert(pos);
        }
        let model = c.model;
        let warmup = c.warmup;
        let embeddings_on = c.embeddings_on;
        c.outputs.clear();
        if !warmup {
            for (i, item) in batch.items().iter().enumerate() {
                if !item.output {
                    continue;
                }
                let seq = item.seq_ids.first().copied().unwrap_or(0);
                c.outputs.insert(
                    i,
                    OutputRow {
                        seq,
                        logits: Some(sim_logits(model, item.token, item.pos)),
                        embedding: embeddings_on
                            .then(|| sim_embedding(model, item.token, item.pos)),
                    },
                );
            }
        }
        if n > 1 {
            c.perf.prompt_tokens += n as i32;
        } else {
            c.perf.eval_tokens += 1;
        }
        DecodeStatus::Ok
    }

    fn encode(&self, ctx: RawContext, batch: &Batch) -> DecodeStatus {
        let mut state = self.state.lock();
        let Some(c) = state.ctxs.get_mut(&ctx.id()) else {
            return DecodeStatus::Error;
        };
        if batch.is_empty() {
            return DecodeStatus::Error;
        }
        let model = c.model;
        c.outputs.clear();
        for (i, item) in batch.items().iter().enumerate() {
            let seq = item.seq_ids.first().copied().unwrap_or(0);
            c.outputs.insert(
                i,
                OutputRow {
                    seq,
                    logits: None,
                    embedding: Some(sim_embedding(model, item.token, item.pos)),
                },
            );
        }
        c.perf.prompt_tokens += batch.len() as i32;
        DecodeStatus::Ok
    }

    fn logits(&self, ctx: RawContext, idx: i32) -> Option<Vec<f32>> {
        let state = self.state.lock();
        let c = state.ctxs.get(&ctx.id())?;
        if idx < 0 {
            return c.outputs.values().rev().find_map(|r| r.logits.clone());
        }
        c.outputs.get(&(idx as usize))?.logits.clone()
    }

    fn embeddings(&self, ctx: RawContext, idx: i32) -> Option<Vec<f32>> {
        let state = self.state.lock();
        let c = state.ctxs.get(&ctx.id())?;
        if idx < 0 {
            return c.outputs.values().rev().find_map(|r| r.embedding.clone());
        }
        c.outputs.get(&(idx as usize))?.embedding.clone()
    }

    fn embeddings_seq(&self, ctx: RawContext, seq: SeqId) -> Option<Vec<f32>> {
        let state = self.state.lock();
        let c = state.ctxs.get(&ctx.id())?;
        let rows: Vec<&Vec<f32>> = c
            .outputs
            .values()
            .filter(|r| r.seq == seq)
            .filter_map(|r| r.embedding.as_ref())
            .collect();
        if rows.is_empty() {
            return None;
        }
        let mut pooled = vec![0.0f32; SIM_EMBD];
        for row in &rows {
            for (acc, v) in pooled.iter_mut().zip(row.iter()) {
                *acc += v;
            }
        }
        let n = rows.len() as f32;
        for v in &mut pooled {
            *v /= n;
        }
        Some(pooled)
    }

    fn memory_clear(&self, ctx: RawContext) {
        if let Some(c) = self.state.lock().ctxs.get_mut(&ctx.id()) {
            c.seqs.clear();
            c.outputs.clear();
        }
    }

    fn memory_seq_rm(&self, ctx: RawContext, seq: SeqId, p0: Pos, p1: Pos) -> bool {
        let mut state = self.state.lock();
        let Some(c) = state.ctxs.get_mut(&ctx.id()) else {
            return false;
        };
        let p0 = p0.max(0);
        let p1 = if p1 < 0 { Pos::MAX } else { p1 };
        if p0 > p1 {
            return false;
        }
        let targets: Vec<SeqId> = if seq < 0 {
            c.seqs.keys().copied().collect()
        } else {
            vec![seq]
        };
        for s in targets {
            if let Some(set) = c.seqs.get_mut(&s) {
                set.retain(|&p| p < p0 || p >= p1);
            }
        }
        true
    }

    fn memory_seq_add(&self, ctx: RawContext, seq: SeqId, p0: Pos, p1: Pos, delta: Pos) {
        let mut state = self.state.lock();
        let Some(c) = state.ctxs.get_mut(&ctx.id()) else {
            return;
        };
        let p0 = p0.max(0);
        let p1 = if p1 < 0 { Pos::MAX } else { p1 };
        let targets: Vec<SeqId> = if seq < 0 {
            c.seqs.keys().copied().collect()
        } else {
            vec![seq]
        };
        for s in targets {
            if let Some(set) = c.seqs.get_mut(&s) {
                let shifted: BTreeSet<Pos> = set
                    .iter()
                    .filter_map(|&p| {
                        if p >= p0 && p < p1 {
                            let np = p + delta;
                            (np >= 0).then_some(np)
                        } else {
                            Some(p)
                        }
                    })
                    .collect();
                *set = shifted;
            }
        }
    }

    fn memory_seq_pos_max(&self, ctx: RawContext, seq: SeqId) -> Pos {
        let state = self.state.lock();
        state
            .ctxs
            .get(&ctx.id())
            .and_then(|c| c.seqs.get(&seq))
            .and_then(|set| set.iter().next_back().copied())
            .unwrap_or(-1)
    }

    fn set_threads(&self, _ctx: RawContext, _n_threads: i32, _n_threads_batch: i32) {}

    fn set_embeddings(&self, ctx: RawContext, enabled: bool) {
        if let Some(c) = self.state.lock().ctxs.get_mut(&ctx.id()) {
            c.embeddings_on = enabled;
        }
    }

    fn set_causal_attn(&self, _ctx: RawContext, _causal: bool) {}

    fn set_warmup(&self, ctx: RawContext, warmup: bool) {
        if let Some(c) = self.state.lock().ctxs.get_mut(&ctx.id()) {
            c.warmup = warmup;
        }
    }

    fn perf(&self, ctx: RawContext) -> PerfData {
        self.state
            .lock()
            .ctxs
            .get(&ctx.id())
            .map(|c| c.perf)
            .unwrap_or_default()
    }

    fn perf_reset(&self, ctx: RawContext) {
        if let Some(c) = self.state.lock().ctxs.get_mut(&ctx.id()) {
            c.perf = PerfData::default();
        }
    }

    fn vision_init(
        &self,
        mmproj: &Path,
        model: RawModel,
        _n_threads: i32,
        _use_gpu: bool,
    ) -> Option<RawVision> {
        if !mmproj.exists() {
            return None;
        }
        let supported = !file_name(mmproj).contains("text-only");
        let mut state = self.state.lock();
        if !state.models.contains_key(&model.id()) {
            return None;
        }
        let id = state.mint();
        state.visions.insert(id, SimVision { supported });
        Some(RawVision::new(id))
    }

    fn vision_free(&self, vision: RawVision) {
        self.state.lock().visions.remove(&vision.id());
    }

    fn vision_supported(&self, vision: RawVision) -> bool {
        self.state
            .lock()
            .visions
            .get(&vision.id())
            .map(|v| v.supported)
            .unwrap_or(false)
    }

    fn bitmap_load(&self, vision: RawVision, path: &Path) -> Option<RawBitmap> {
        let bytes = fs::read(path).ok()?;
        let mut state = self.state.lock();
        if !state.visions.contains_key(&vision.id()) {
            return None;
        }
        let digest = bytes.iter().fold(mix(bytes.len() as u64), |acc, &b| {
            mix(acc ^ u64::from(b))
        });
        let id = state.mint();
        state.bitmaps.insert(id, digest);
        state.bitmaps_loaded += 1;
        Some(RawBitmap::new(id))
    }

    fn bitmap_free(&self, bitmap: RawBitmap) {
        let mut state = self.state.lock();
        if state.bitmaps.remove(&bitmap.id()).is_some() {
            state.bitmaps_freed += 1;
        }
    }

    fn encode_bitmap(&self, vision: RawVision, bitmap: RawBitmap) -> Option<EncodedImage> {
        let state = self.state.lock();
        if !state.visions.contains_key(&vision.id()) {
            return None;
        }
        let digest = *state.bitmaps.get(&bitmap.id())?;
        Some(EncodedImage::new(IMAGE_CELLS, digest))
    }

    fn decode_image(
        &self,
        ctx: RawContext,
        image: &EncodedImage,
        seq: SeqId,
        pos: Pos,
    ) -> DecodeStatus {
        let mut state = self.state.lock();
        let Some(c) = state.ctxs.get_mut(&ctx.id()) else {
            return DecodeStatus::Error;
        };
        let n = image.n_positions();
        if c.occupied_total() + n > c.n_ctx as usize {
            return DecodeStatus::CacheFull;
        }
        let set = c.seqs.entry(seq).or_default();
        for p in pos..pos + n as Pos {
            set.insert(p);
        }
        // Image evaluation produces no logits.
        c.outputs.clear();
        c.perf.prompt_tokens += n as i32;
        DecodeStatus::Ok
    }
}

fn write_byte(b: u8, out: &mut [u8]) -> i32 {
    if out.is_empty() {
        return -1;
    }
    out[0] = b;
    1
}
