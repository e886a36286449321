//! Seeded synthetic inputs.

use neugraph_core::{Graph, STATS_DIM, StatsVector};
use rand::{Rng, SeedableRng, rngs::SmallRng};

use crate::error::BenchSetupError;

/// Configuration of an Erdős–Rényi `G(n, p)` graph.
#[derive(Clone, Copy, Debug)]
pub struct RandomGraphConfig {
    /// Number of nodes.
    pub node_count: usize,
    /// Independent probability of each unordered pair being an edge.
    pub edge_probability: f64,
    /// RNG seed.
    pub seed: u64,
}

/// Samples a `G(n, p)` graph.
///
/// # Errors
/// Returns [`BenchSetupError::InvalidProbability`] when the probability is
/// outside `[0, 1]`.
///
/// # Examples
/// ```
/// use neugraph_benches::source::{RandomGraphConfig, random_graph};
///
/// let config = RandomGraphConfig { node_count: 5, edge_probability: 1.0, seed: 3 };
/// let graph = random_graph(&config)?;
/// assert_eq!(graph.edge_count(), 10);
/// # Ok::<(), neugraph_benches::error::BenchSetupError>(())
/// ```
pub fn random_graph(config: &RandomGraphConfig) -> Result<Graph, BenchSetupError> {
    let p = config.edge_probability;
    if !(0.0..=1.0).contains(&p) {
        return Err(BenchSetupError::InvalidProbability(p));
    }
    let mut rng = SmallRng::seed_from_u64(config.seed);
    let n = config.node_count;
    let pairs = (0..n).flat_map(|u| (u.saturating_add(1)..n).map(move |v| (u, v)));
    let edges: Vec<(usize, usize)> = pairs.filter(|_| rng.gen_bool(p)).collect();
    Ok(Graph::from_edges(n, edges)?)
}

/// Draws `count` conditioning vectors with node counts in `3..=max_nodes`,
/// edge counts up to the complete graph, and uniform remaining fields.
#[must_use]
pub fn random_stats(count: usize, max_nodes: u16, seed: u64) -> Vec<StatsVector> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let upper = max_nodes.max(3);
    (0..count)
        .map(|_| {
            let nodes = rng.gen_range(3..=upper);
            let max_edges = u32::from(nodes).saturating_mul(u32::from(nodes).saturating_sub(1)) >> 1;
            let edges = rng.gen_range(0..=max_edges);
            let mut values = [0.0_f32; STATS_DIM];
            for (index, value) in values.iter_mut().enumerate() {
                *value = match index {
                    0 => f32::from(nodes),
                    1 => f32::from(u16::try_from(edges).unwrap_or(u16::MAX)),
                    _ => rng.r#gen::<f32>(),
                };
            }
            StatsVector::new(values)
        })
        .collect()
}
