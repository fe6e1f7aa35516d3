use crate::sampler::{sort_by_logit, Candidate, Sampler};

/// Keeps only the top K tokens by logit value, discarding the rest.
pub struct TopKSampler {
    k: usize,
}

impl TopKSampler {
    /// Create a new top-K sampler that retains the `k` highest-logit tokens.
    pub fn new(k: usize) -> Self {
        Self { k }
    }
}

impl Sampler for TopKSampler {
    fn name(&self) -> &str {
        "top_k"
    }

    fn apply(&mut self, candidates: &mut Vec<Candidate>) {
        if self.k == 0 || self.k >= candidates.len() {
            return;
        }
        sort_by_logit(candidates);
        candidates.truncate(self.k);
    }
}
