//! High-level generation session with prompt-prefix caching.

use std::time::Instant;

use sr_engine::{ContextParams, Pos, Token};
use sr_sampler::{build_chain, SamplerChain, SamplerOptions};
use tracing::debug;

use crate::context::Context;
use crate::error::{Result, SessionError};
use crate::model::Model;

/// Per-call generation settings.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Maximum number of tokens to generate.
    pub max_tokens: usize,
    /// Sampling configuration.
    pub sampling: SamplerOptions,
    /// Stop strings. Generation halts when one appears in the output;
    /// the stop string itself is trimmed.
    pub stop: Vec<String>,
    /// Slide the context window when it fills instead of failing.
    pub context_shift: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            sampling: SamplerOptions::default(),
            stop: Vec::new(),
            context_shift: true,
        }
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// End-of-generation token or a stop string.
    Stop,
    /// `max_tokens` reached.
    Length,
}

/// Timing and token counts for one generation call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerateStats {
    pub prompt_tokens: i32,
    pub eval_tokens: i32,
    /// Prompt tokens served from the KV cache of the previous call.
    pub cached_tokens: i32,
    pub prompt_ms: f64,
    pub eval_ms: f64,
    pub tokens_per_second: f64,
}

/// The result of one generation call.
#[derive(Debug, Clone)]
pub struct GenerateOutput {
    pub text: String,
    pub finish: FinishReason,
    pub stats: GenerateStats,
}

/// A conversation-style generation session over one model and context.
///
/// Consecutive calls reuse the KV cache for the longest common token
/// prefix between prompts, so appending to a conversation only pays
/// for the new turn.
pub struct Session {
    model: Model,
    ctx: Context,
    /// Tokens currently materialized in the KV cache, in order.
    cache: Vec<Token>,
    sampler: Option<(SamplerOptions, SamplerChain)>,
}

impl Session {
    pub fn new(model: Model, params: &ContextParams) -> Result<Self> {
        let ctx = model.new_context(params)?;
        Ok(Self {
            model,
            ctx,
            cache: Vec::new(),
            sampler: None,
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// Make room for `needed` more positions, sliding the window if
    /// allowed. Drops at least a quarter of the window per shift.
    fn make_room(&mut self, needed: usize, context_shift: bool) -> Result<()> {
        let n_ctx = i64::from(self.ctx.n_ctx());
        let pos = i64::from(self.ctx.pos());
        if pos + needed as i64 <= n_ctx {
            return Ok(());
        }
        if !context_shift {
            return Err(SessionError::WindowFull {
                used: pos as usize,
                capacity: n_ctx as usize,
            });
        }
        let n = (pos + needed as i64 - n_ctx).max(n_ctx / 4);
        if n >= pos {
            return Err(SessionError::WindowFull {
                used: pos as usize,
                capacity: n_ctx as usize,
            });
        }
        debug!(drop = n, pos, "sliding context window");
        self.ctx.shift_window(n as Pos)?;
        self.cache.drain(..n as usize);
        Ok(())
    }

    /// Reconcile the KV cache with `prompt`, returning the tokens that
    /// still need decoding.
    fn reuse_prefix(&mut self, prompt: &[Token]) -> Result<usize> {
        let mut prefix = common_prefix_len(&self.cache, prompt);
        // Re-decode at least the final prompt token so fresh logits
        // exist even on a full cache hit.
        prefix = prefix.min(prompt.len().saturating_sub(1));
        if prefix == 0 {
            self.ctx.clear_memory();
            self.cache.clear();
        } else if prefix < self.cache.len() {
            self.ctx.truncate(prefix as Pos)?;
            self.cache.truncate(prefix);
        }
        Ok(prefix)
    }

    /// Generate a completion for `prompt`.
    pub fn generate(&mut self, prompt: &str, opts: &GenerateOptions) -> Result<GenerateOutput> {
        if prompt.is_empty() {
            return Err(SessionError::InvalidArgument("empty prompt"));
        }
        let prompt_tokens = self.model.tokenize(prompt, true, true);
        if prompt_tokens.is_empty() {
            return Err(SessionError::InvalidArgument("prompt tokenized to nothing"));
        }

        // Reuse the cached chain only when the options are unchanged,
        // and clear its penalty history either way so every request
        // starts from a clean window.
        let mut chain = match self.sampler.take() {
            Some((cached, mut chain)) if cached == opts.sampling => {
                chain.reset();
                chain
            }
            _ => build_chain(&opts.sampling),
        };

        self.ctx.perf_reset();
        let prefix = self.reuse_prefix(&prompt_tokens)?;
        debug!(
            prompt = prompt_tokens.len(),
            cached = prefix,
            "starting generation"
        );

        // Prompt phase: decode the uncached suffix in n_batch chunks.
        let prompt_start = Instant::now();
        let n_batch = self.ctx.n_batch() as usize;
        for chunk in prompt_tokens[prefix..].chunks(n_batch) {
            self.make_room(chunk.len(), opts.context_shift)?;
            self.ctx.decode(chunk)?;
            self.cache.extend_from_slice(chunk);
        }
        let prompt_elapsed = prompt_start.elapsed();

        let max_stop = opts.stop.iter().map(String::len).max().unwrap_or(0);
        let mut text = String::new();
        let mut finish = FinishReason::Length;
        let mut eval_tokens = 0i32;

        let eval_start = Instant::now();
        for _ in 0..opts.max_tokens {
            let token = {
                let logits = self.ctx.logits_at(-1)?;
                chain.sample(&logits)
            };
            if self.model.token_is_eog(token) {
                finish = FinishReason::Stop;
                break;
            }

            let piece = self.model.token_to_piece(token);
            text.push_str(&piece);
            if trim_at_stop(&mut text, &opts.stop, piece.len() + max_stop) {
                finish = FinishReason::Stop;
                break;
            }

            self.make_room(1, opts.context_shift)?;
            self.ctx.decode_one(token)?;
            self.cache.push(token);
            eval_tokens += 1;
        }
        let eval_elapsed = eval_start.elapsed();
        self.sampler = Some((opts.sampling, chain));

        let perf = self.ctx.perf();
        // Engines that do not time themselves report zero; fall back to
        // wall-clock measurements.
        let prompt_ms = if perf.prompt_ms > 0.0 {
            perf.prompt_ms
        } else {
            prompt_elapsed.as_secs_f64() * 1000.0
        };
        let eval_ms = if perf.eval_ms > 0.0 {
            perf.eval_ms
        } else {
            eval_elapsed.as_secs_f64() * 1000.0
        };
        let tokens_per_second = if eval_ms > 0.0 {
            f64::from(eval_tokens) / (eval_ms / 1000.0)
        } else {
            0.0
        };

        Ok(GenerateOutput {
            text,
            finish,
            stats: GenerateStats {
                prompt_tokens: perf.prompt_tokens,
                eval_tokens,
                cached_tokens: prefix as i32,
                prompt_ms,
                eval_ms,
                tokens_per_second,
            },
        })
    }
}

/// Length of the longest common prefix of two token slices.
pub fn common_prefix_len(a: &[Token], b: &[Token]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Scan the tail of `text` for a stop string, truncating at the first
/// match. Only the last `window` bytes need checking since earlier text
/// was already scanned.
fn trim_at_stop(text: &mut String, stops: &[String], window: usize) -> bool {
    if stops.is_empty() {
        return false;
    }
    let from = floor_char_boundary(text, text.len().saturating_sub(window));
    let hit = stops
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text[from..].find(s.as_str()).map(|i| from + i))
        .min();
    match hit {
        Some(i) => {
            text.truncate(i);
            true
        }
        None => false,
    }
}

fn floor_char_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}
