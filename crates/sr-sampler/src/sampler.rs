//! Core sampling abstractions.

/// Token id within a model's vocabulary.
pub type TokenId = i32;

/// One vocabulary entry under consideration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub token: TokenId,
    pub logit: f32,
}

/// A single transformation stage over the candidate list.
///
/// Stages may rescale logits, drop entries, or reorder the list; the
/// chain treats the front entry of the final list as the selection.
pub trait Sampler: Send {
    /// Short identifier for diagnostics.
    fn name(&self) -> &str;

    /// Transform the candidate list in place.
    fn apply(&mut self, candidates: &mut Vec<Candidate>);

    /// Observe a token that was actually emitted. Stateful stages
    /// (penalties) extend their window here.
    fn accept(&mut self, _token: TokenId) {}

    /// Clear any accumulated state.
    fn reset(&mut self) {}
}

/// An ordered pipeline of samplers applied to one logit vector.
#[derive(Default)]
pub struct SamplerChain {
    stages: Vec<Box<dyn Sampler>>,
}

impl SamplerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(stages: Vec<Box<dyn Sampler>>) -> Self {
        Self { stages }
    }

    pub fn push(&mut self, stage: Box<dyn Sampler>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run the full pipeline over `logits` and return the selected
    /// token. Every stage's `accept` sees the selection.
    pub fn sample(&mut self, logits: &[f32]) -> TokenId {
        let mut candidates: Vec<Candidate> = logits
            .iter()
            .enumerate()
            .map(|(i, &logit)| Candidate {
                token: i as TokenId,
                logit,
            })
            .collect();
        for stage in &mut self.stages {
            stage.apply(&mut candidates);
        }
        let token = candidates.first().map(|c| c.token).unwrap_or(0);
        for stage in &mut self.stages {
            stage.accept(token);
        }
        token
    }

    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }
}

/// Sort candidates by logit, highest first. Ties break on token id for
/// determinism.
pub(crate) fn sort_by_logit(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.logit
            .partial_cmp(&a.logit)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.token.cmp(&b.token))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::GreedySampler;

    #[test]
    fn empty_chain_returns_first_token() {
        let mut chain = SamplerChain::new();
        assert_eq!(chain.sample(&[0.1, 0.9, 0.5]), 0);
    }

    #[test]
    fn chain_applies_stages_in_order() {
        let mut chain = SamplerChain::with(vec![Box::new(GreedySampler)]);
        assert_eq!(chain.sample(&[0.1, 0.9, 0.5]), 1);
    }
}
