use crate::sampler::{Candidate, Sampler};

/// Drops tokens whose probability falls below `p` times the probability
/// of the most likely token.
///
/// Works directly in logit space: a probability ratio of `p` is a logit
/// gap of `ln(p)`, so the cutoff is `max_logit + ln(p)`.
pub struct MinPSampler {
    p: f32,
}

impl MinPSampler {
    /// Create a new min-p sampler with the given relative threshold.
    pub fn new(p: f32) -> Self {
        Self { p }
    }
}

impl Sampler for MinPSampler {
    fn name(&self) -> &str {
        "min_p"
    }

    fn apply(&mut self, candidates: &mut Vec<Candidate>) {
        if candidates.is_empty() || self.p <= 0.0 || self.p >= 1.0 {
            return;
        }
        let max_logit = candidates
            .iter()
            .map(|c| c.logit)
            .fold(f32::NEG_INFINITY, f32::max);
        let cutoff = max_logit + self.p.ln();
        candidates.retain(|c| c.logit >= cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_tokens_far_below_the_leader() {
        let mut s = MinPSampler::new(0.5);
        // ln(0.5) ~= -0.693: the cutoff sits just below the leader.
        let mut c = vec![
            Candidate { token: 0, logit: 0.0 },
            Candidate { token: 1, logit: -0.5 },
            Candidate { token: 2, logit: -3.0 },
        ];
        s.apply(&mut c);
        assert_eq!(c.len(), 2);
        assert!(c.iter().all(|x| x.token != 2));
    }

    #[test]
    fn disabled_threshold_is_a_no_op() {
        let mut s = MinPSampler::new(0.0);
        let mut c = vec![
            Candidate { token: 0, logit: 0.0 },
            Candidate { token: 1, logit: -100.0 },
        ];
        s.apply(&mut c);
        assert_eq!(c.len(), 2);
    }
}
