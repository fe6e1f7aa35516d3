use crate::sampler::{Candidate, Sampler};

/// Scales all logits by dividing by a temperature value.
///
/// Higher temperatures produce more uniform distributions (more random),
/// while lower temperatures sharpen the distribution (more deterministic).
pub struct TemperatureSampler {
    temperature: f32,
}

impl TemperatureSampler {
    /// Create a new temperature sampler with the given temperature.
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }
}

impl Sampler for TemperatureSampler {
    fn name(&self) -> &str {
        "temperature"
    }

    fn apply(&mut self, candidates: &mut Vec<Candidate>) {
        // Clamp temperature to a very small positive value if it is <= 0.
        let temp = if self.temperature <= 0.0 {
            1e-7
        } else {
            self.temperature
        };

        for c in candidates.iter_mut() {
            c.logit /= temp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn divides_logits_by_temperature() {
        let mut s = TemperatureSampler::new(0.5);
        let mut c = vec![
            Candidate { token: 0, logit: 1.0 },
            Candidate { token: 1, logit: -2.0 },
        ];
        s.apply(&mut c);
        assert_relative_eq!(c[0].logit, 2.0);
        assert_relative_eq!(c[1].logit, -4.0);
    }
}
