//! Token sampling for language-model generation.
//!
//! Samplers transform a candidate list (token id + logit pairs); a
//! [`SamplerChain`] applies them in order and returns the surviving
//! front token. [`SamplerOptions`] builds the standard chain layout.

pub mod min_p;
pub mod options;
pub mod penalties;
pub mod sampler;
pub mod select;
pub mod temperature;
pub mod top_k;
pub mod top_p;

pub use min_p::MinPSampler;
pub use options::{build_chain, SamplerOptions};
pub use penalties::PenaltiesSampler;
pub use sampler::{Candidate, Sampler, SamplerChain, TokenId};
pub use select::{DistSampler, GreedySampler, SEED_AUTO};
pub use temperature::TemperatureSampler;
pub use top_k::TopKSampler;
pub use top_p::TopPSampler;
