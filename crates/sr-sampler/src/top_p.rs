use crate::sampler::{sort_by_logit, Candidate, Sampler};

/// Nucleus sampling: keeps the smallest set of tokens whose cumulative
/// probability exceeds the threshold `p`.
pub struct TopPSampler {
    p: f32,
}

impl TopPSampler {
    /// Create a new top-p (nucleus) sampler with the given probability threshold.
    pub fn new(p: f32) -> Self {
        Self { p }
    }
}

impl Sampler for TopPSampler {
    fn name(&self) -> &str {
        "top_p"
    }

    fn apply(&mut self, candidates: &mut Vec<Candidate>) {
        if candidates.is_empty() || self.p >= 1.0 {
            return;
        }

        sort_by_logit(candidates);

        // Compute softmax probabilities.
        let max_logit = candidates[0].logit;
        let exps: Vec<f32> = candidates
            .iter()
            .map(|c| (c.logit - max_logit).exp())
            .collect();
        let sum: f32 = exps.iter().sum();

        // Find the cutoff index: keep tokens until cumulative probability exceeds p.
        let mut cumulative = 0.0f32;
        let mut cutoff = candidates.len();
        for (i, &e) in exps.iter().enumerate() {
            cumulative += e / sum;
            if cumulative > self.p {
                cutoff = i + 1;
                break;
            }
        }

        // Always keep at least one token.
        if cutoff == 0 {
            cutoff = 1;
        }

        candidates.truncate(cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_tail_below_threshold() {
        let mut s = TopPSampler::new(0.5);
        let mut c = vec![
            Candidate { token: 0, logit: 10.0 },
            Candidate { token: 1, logit: 0.0 },
            Candidate { token: 2, logit: -10.0 },
        ];
        s.apply(&mut c);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].token, 0);
    }

    #[test]
    fn p_of_one_keeps_everything() {
        let mut s = TopPSampler::new(1.0);
        let mut c = vec![
            Candidate { token: 0, logit: 1.0 },
            Candidate { token: 1, logit: 0.0 },
        ];
        s.apply(&mut c);
        assert_eq!(c.len(), 2);
    }
}
