//! Benchmark parameter types, rendered as Criterion benchmark identifiers.

use std::fmt;

/// Parameters for a canonicalisation benchmark run.
#[derive(Clone, Debug)]
pub struct CanonicalBenchParams {
    /// Nodes per graph.
    pub node_count: usize,
    /// Independent probability of each edge.
    pub edge_probability: f64,
}

impl fmt::Display for CanonicalBenchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n={},p={}", self.node_count, self.edge_probability)
    }
}

/// Parameters for a reverse-sampling benchmark run.
#[derive(Clone, Debug)]
pub struct SamplingBenchParams {
    /// Conditioning vectors sampled together.
    pub batch: usize,
    /// Diffusion timesteps.
    pub timesteps: usize,
}

impl fmt::Display for SamplingBenchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch={},T={}", self.batch, self.timesteps)
    }
}
