//! Draft-and-verify decoding with a smaller helper model.
//!
//! A round drafts up to `n_draft` tokens greedily from the draft
//! context, then verifies them against the target model in a single
//! all-logits decode. Accepted tokens cost one target pass instead of
//! one per token; the first divergence is replaced by the target's own
//! pick.

use sr_engine::{Pos, Token};
use sr_sampler::SamplerChain;
use tracing::debug;

use crate::context::Context;
use crate::error::{Result, SessionError};
use crate::model::Model;

/// Outcome of one draft-and-verify round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeculativeResult {
    /// Committed tokens, in order. The final entry has not been decoded
    /// into either context yet; feed it back before the next round.
    pub tokens: Vec<Token>,
    /// How many tokens the draft model proposed.
    pub drafted: usize,
    /// How many proposals the target accepted.
    pub accepted: usize,
    /// The target selected an end-of-generation token; `tokens` stops
    /// just before it.
    pub hit_eog: bool,
}

/// Rebuild the draft context so its cache holds exactly `tokens`.
pub fn sync_draft(draft: &mut Context, tokens: &[Token]) -> Result<()> {
    draft.clear_memory();
    if tokens.is_empty() {
        return Err(SessionError::InvalidArgument("empty draft history"));
    }
    let n_batch = draft.n_batch() as usize;
    for chunk in tokens.chunks(n_batch) {
        draft.decode(chunk)?;
    }
    Ok(())
}

/// Run one speculative round.
///
/// Both contexts must hold the same token history, with fresh logits
/// from their last decode. Afterwards both are truncated to the
/// accepted prefix; the caller decodes `result.tokens[accepted..]` into
/// both before calling again.
pub fn verify_round(
    model: &Model,
    target: &mut Context,
    draft_model: &Model,
    draft: &mut Context,
    chain: &mut SamplerChain,
    n_draft: usize,
) -> Result<SpeculativeResult> {
    if n_draft == 0 {
        return Err(SessionError::InvalidArgument("zero draft length"));
    }
    let start = target.pos();

    // The target's next-token distribution predates the drafted batch,
    // so capture it now.
    let pre = target.logits_at(-1)?;

    let mut drafted: Vec<Token> = Vec::with_capacity(n_draft);
    for _ in 0..n_draft {
        let logits = draft.logits_at(-1)?;
        let proposal = argmax(&logits);
        if draft_model.token_is_eog(proposal) {
            break;
        }
        draft.decode_one(proposal)?;
        drafted.push(proposal);
    }

    let mut tokens = Vec::with_capacity(drafted.len() + 1);
    let mut accepted = 0usize;
    let mut next = chain.sample(&pre);
    let mut hit_eog = model.token_is_eog(next);

    if !drafted.is_empty() {
        target.decode_all_logits(&drafted)?;
        for (i, &proposal) in drafted.iter().enumerate() {
            if hit_eog || proposal != next {
                break;
            }
            tokens.push(next);
            accepted += 1;
            next = chain.sample(&target.logits_at(i as i32)?);
            hit_eog = model.token_is_eog(next);
        }
    }
    if !hit_eog {
        // Divergence correction, or the bonus token on full acceptance.
        tokens.push(next);
    }

    let keep = start + accepted as Pos;
    target.truncate(keep)?;
    draft.truncate(keep)?;

    debug!(
        drafted = drafted.len(),
        accepted, hit_eog, "speculative round"
    );
    Ok(SpeculativeResult {
        tokens,
        drafted: drafted.len(),
        accepted,
        hit_eog,
    })
}

pub(crate) fn argmax(logits: &[f32]) -> Token {
    let mut best = 0usize;
    for (i, &v) in logits.iter().enumerate() {
        if v > logits[best] {
            best = i;
        }
    }
    best as Token
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use sr_engine::{ContextParams, ModelParams, SimEngine};
    use sr_sampler::{GreedySampler, SamplerChain};
    use std::io::Write;
    use std::sync::Arc;

    fn write_model(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"weights")
            .unwrap();
        path
    }

    fn greedy_chain() -> SamplerChain {
        SamplerChain::with(vec![Box::new(GreedySampler::new())])
    }

    #[test]
    fn self_speculation_accepts_every_draft() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Backend::init(Arc::new(SimEngine::new()));
        let model = backend
            .load_model(&write_model(&dir, "m.gguf"), &ModelParams::default())
            .unwrap();

        let params = ContextParams::default();
        let mut target = model.new_context(&params).unwrap();
        let mut draft = model.new_context(&params).unwrap();

        let history = [1, 2, 3];
        target.decode(&history).unwrap();
        sync_draft(&mut draft, &history).unwrap();

        let mut chain = greedy_chain();
        let result =
            verify_round(&model, &mut target, &model, &mut draft, &mut chain, 4).unwrap();

        // Draft and target share weights, so every proposal matches and
        // a bonus token rides along.
        assert_eq!(result.drafted, 4);
        assert_eq!(result.accepted, 4);
        assert!(!result.hit_eog);
        assert_eq!(result.tokens.len(), 5);
        assert_eq!(target.pos(), 3 + 4);
        assert_eq!(draft.pos(), 3 + 4);
    }

    #[test]
    fn divergence_commits_the_target_pick() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Backend::init(Arc::new(SimEngine::new()));
        let model = backend
            .load_model(&write_model(&dir, "big.gguf"), &ModelParams::default())
            .unwrap();
        let draft_model = backend
            .load_model(&write_model(&dir, "small.gguf"), &ModelParams::default())
            .unwrap();

        let params = ContextParams::default();
        let mut target = model.new_context(&params).unwrap();
        let mut draft = draft_model.new_context(&params).unwrap();

        let history = [1, 2, 3];
        target.decode(&history).unwrap();
        sync_draft(&mut draft, &history).unwrap();

        let mut chain = greedy_chain();
        let result =
            verify_round(&model, &mut target, &draft_model, &mut draft, &mut chain, 4).unwrap();

        assert!(result.accepted <= result.drafted);
        assert!(!result.hit_eog);
        // The committed stream always ends with a token of the target's
        // own choosing.
        assert_eq!(result.tokens.len(), result.accepted + 1);
        assert_eq!(target.pos(), 3 + result.accepted as Pos);
        assert_eq!(draft.pos(), 3 + result.accepted as Pos);
    }

    #[test]
    fn rounds_chain_through_committed_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Backend::init(Arc::new(SimEngine::new()));
        let model = backend
            .load_model(&write_model(&dir, "m.gguf"), &ModelParams::default())
            .unwrap();

        let params = ContextParams::default();
        let mut target = model.new_context(&params).unwrap();
        let mut draft = model.new_context(&params).unwrap();

        target.decode(&[1, 2, 3]).unwrap();
        sync_draft(&mut draft, &[1, 2, 3]).unwrap();

        let mut chain = greedy_chain();
        let first =
            verify_round(&model, &mut target, &model, &mut draft, &mut chain, 2).unwrap();
        let pending = &first.tokens[first.accepted..];
        target.decode(pending).unwrap();
        draft.decode(pending).unwrap();

        let second =
            verify_round(&model, &mut target, &model, &mut draft, &mut chain, 2).unwrap();
        assert_eq!(second.accepted, 2);
        assert_eq!(target.pos(), draft.pos());
    }
}
