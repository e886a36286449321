//! Shared test utilities for `neugraph-core`.

use neugraph_test_support::ci::property_test_profile::ProptestRunProfile;
use proptest::test_runner::Config as ProptestConfig;
use rand::{SeedableRng, rngs::SmallRng};

use crate::{
    canonical::{EncodingParams, canonicalize},
    graph::Graph,
    sample::{STATS_DIM, Sample, StatsVector},
};

/// Builds a standard proptest configuration from the shared CI profile.
///
/// This keeps property suites aligned on the same `PROGTEST_CASES` and
/// `NEUGRAPH_PBT_FORK` interpretation.
#[must_use]
pub(crate) fn suite_proptest_config(default_cases: u32) -> ProptestConfig {
    let profile = ProptestRunProfile::load(default_cases, false);
    ProptestConfig {
        cases: profile.cases(),
        fork: profile.fork(),
        ..ProptestConfig::default()
    }
}

/// Deterministic RNG for unit tests.
#[must_use]
pub(crate) fn seeded_rng(seed: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed)
}

/// Cycle on `n` nodes.
#[must_use]
pub(crate) fn ring(n: usize) -> Graph {
    Graph::from_edges(n, (0..n).map(|i| (i, (i + 1) % n))).expect("ring edges are in range")
}

/// Statistics vector whose first two entries are node and edge counts.
#[must_use]
pub(crate) fn stats_for(graph: &Graph) -> StatsVector {
    let mut values = [0.0_f32; STATS_DIM];
    values[0] = graph.node_count() as f32;
    values[1] = graph.edge_count() as f32;
    StatsVector::new(values)
}

/// Canonicalises `graph` with its own statistics.
#[must_use]
pub(crate) fn sample_of(graph: &Graph, n_max: usize, spectral_dim: usize) -> Sample {
    let params = EncodingParams::new(n_max, spectral_dim).expect("valid encoding params");
    canonicalize(graph, stats_for(graph), params).expect("graph fits the encoding")
}
