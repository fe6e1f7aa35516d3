use std::collections::VecDeque;

use crate::sampler::{Candidate, Sampler, TokenId};

/// Penalizes tokens that appeared in the recent output window.
///
/// Three penalties combine per candidate, based on how often the token
/// occurs in the window:
/// - `repeat`: positive logits are divided by it, negative logits
///   multiplied (1.0 = off).
/// - `freq`: subtracted once per occurrence.
/// - `presence`: subtracted once if the token occurred at all.
pub struct PenaltiesSampler {
    last_n: usize,
    repeat: f32,
    freq: f32,
    presence: f32,
    window: VecDeque<TokenId>,
}

impl PenaltiesSampler {
    pub fn new(last_n: usize, repeat: f32, freq: f32, presence: f32) -> Self {
        Self {
            last_n,
            repeat,
            freq,
            presence,
            window: VecDeque::with_capacity(last_n),
        }
    }
}

impl Sampler for PenaltiesSampler {
    fn name(&self) -> &str {
        "penalties"
    }

    fn apply(&mut self, candidates: &mut Vec<Candidate>) {
        if self.window.is_empty() {
            return;
        }
        for c in candidates.iter_mut() {
            let count = self.window.iter().filter(|&&t| t == c.token).count();
            if count == 0 {
                continue;
            }
            if self.repeat != 1.0 {
                if c.logit > 0.0 {
                    c.logit /= self.repeat;
                } else {
                    c.logit *= self.repeat;
                }
            }
            c.logit -= count as f32 * self.freq;
            c.logit -= self.presence;
        }
    }

    fn accept(&mut self, token: TokenId) {
        if self.last_n == 0 {
            return;
        }
        self.window.push_back(token);
        while self.window.len() > self.last_n {
            self.window.pop_front();
        }
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn repeated_token_is_penalized() {
        let mut s = PenaltiesSampler::new(8, 2.0, 0.5, 0.25);
        s.accept(3);
        s.accept(3);

        let mut c = vec![
            Candidate { token: 3, logit: 4.0 },
            Candidate { token: 5, logit: 1.0 },
        ];
        s.apply(&mut c);
        // 4.0 / 2.0 - 2 * 0.5 - 0.25
        assert_relative_eq!(c[0].logit, 0.75);
        assert_relative_eq!(c[1].logit, 1.0);
    }

    #[test]
    fn window_slides_past_old_tokens() {
        let mut s = PenaltiesSampler::new(2, 2.0, 0.0, 0.0);
        s.accept(1);
        s.accept(2);
        s.accept(3);

        let mut c = vec![Candidate { token: 1, logit: 4.0 }];
        s.apply(&mut c);
        assert_relative_eq!(c[0].logit, 4.0);
    }

    #[test]
    fn reset_clears_the_window() {
        let mut s = PenaltiesSampler::new(8, 2.0, 0.0, 0.0);
        s.accept(7);
        s.reset();

        let mut c = vec![Candidate { token: 7, logit: 4.0 }];
        s.apply(&mut c);
        assert_relative_eq!(c[0].logit, 4.0);
    }
}
