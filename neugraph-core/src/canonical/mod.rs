//! Canonical node ordering and fixed-capacity graph encoding.
//!
//! Nodes are ordered by a breadth-first traversal seeded at the first
//! maximum-degree node of each connected component, with components visited
//! largest first. The ordering is deterministic but not a true canonical form:
//! isomorphic graphs with degree ties may encode differently.

use std::{collections::VecDeque, sync::Arc};

use nalgebra::DMatrix;
use tracing::instrument;

use crate::{
    error::CanonicalizeError,
    graph::Graph,
    sample::{Sample, StatsVector},
    spectral::spectral_features,
};

/// Capacity and spectral width of the encoding.
///
/// # Examples
/// ```
/// use neugraph_core::EncodingParams;
///
/// let params = EncodingParams::new(8, 2)?;
/// assert_eq!(params.feature_dim(), 3);
/// assert!(EncodingParams::new(1, 2).is_err());
/// # Ok::<(), neugraph_core::CanonicalizeError>(())
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EncodingParams {
    n_max: usize,
    spectral_dim: usize,
}

impl EncodingParams {
    /// Validates and stores the encoding parameters.
    ///
    /// # Errors
    /// Returns [`CanonicalizeError::InvalidParameters`] when `n_max < 2` or
    /// `spectral_dim == 0`.
    pub fn new(n_max: usize, spectral_dim: usize) -> Result<Self, CanonicalizeError> {
        if n_max < 2 {
            return Err(CanonicalizeError::InvalidParameters {
                reason: Arc::from("n_max must be at least 2"),
            });
        }
        if spectral_dim == 0 {
            return Err(CanonicalizeError::InvalidParameters {
                reason: Arc::from("spectral_dim must be at least 1"),
            });
        }
        Ok(Self {
            n_max,
            spectral_dim,
        })
    }

    /// Maximum node count accepted by the encoding.
    #[rustfmt::skip]
    #[must_use]
    pub const fn n_max(&self) -> usize { self.n_max }

    /// Number of spectral feature columns.
    #[rustfmt::skip]
    #[must_use]
    pub const fn spectral_dim(&self) -> usize { self.spectral_dim }

    /// Columns per node feature row.
    #[rustfmt::skip]
    #[must_use]
    pub const fn feature_dim(&self) -> usize { self.spectral_dim + 1 }
}

/// A permutation of graph nodes: `order()[position]` is the original node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CanonicalOrdering {
    order: Vec<usize>,
    position: Vec<usize>,
}

impl CanonicalOrdering {
    /// Original node identifiers in canonical order.
    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Canonical position of original node `node`.
    #[must_use]
    pub fn position_of(&self, node: usize) -> Option<usize> {
        self.position.get(node).copied()
    }

    /// Number of nodes in the ordering.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` when the ordering is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Computes the breadth-first canonical ordering of `graph`.
///
/// # Examples
/// ```
/// use neugraph_core::{Graph, canonical_ordering};
///
/// // A star centred on node 2 plus a detached edge.
/// let graph = Graph::from_edges(6, [(2, 0), (2, 1), (2, 3), (4, 5)])?;
/// let ordering = canonical_ordering(&graph);
/// assert_eq!(ordering.order(), &[2, 0, 1, 3, 4, 5]);
/// # Ok::<(), neugraph_core::GraphError>(())
/// ```
#[must_use]
pub fn canonical_ordering(graph: &Graph) -> CanonicalOrdering {
    let mut components = graph.connected_components();
    // Stable sort: equal-sized components keep discovery order.
    components.sort_by(|a, b| b.len().cmp(&a.len()));

    let node_count = graph.node_count();
    let mut visited = vec![false; node_count];
    let mut order = Vec::with_capacity(node_count);
    for component in &components {
        let Some(seed) = max_degree_seed(graph, component) else {
            continue;
        };
        let mut queue = VecDeque::from([seed]);
        if let Some(flag) = visited.get_mut(seed) {
            *flag = true;
        }
        while let Some(node) = queue.pop_front() {
            order.push(node);
            for next in graph.neighbours(node) {
                if let Some(flag) = visited.get_mut(next)
                    && !*flag
                {
                    *flag = true;
                    queue.push_back(next);
                }
            }
        }
    }

    let mut position = vec![0; node_count];
    for (pos, &node) in order.iter().enumerate() {
        if let Some(slot) = position.get_mut(node) {
            *slot = pos;
        }
    }
    CanonicalOrdering { order, position }
}

fn max_degree_seed(graph: &Graph, component: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for &node in component {
        let degree = graph.degree(node);
        if best.is_none_or(|(_, top)| degree > top) {
            best = Some((node, degree));
        }
    }
    best.map(|(node, _)| node)
}

/// Encodes `graph` into a [`Sample`] under `params`.
///
/// Feature column 0 holds `degree / (n_max - 1)`; columns `1..` hold the
/// leading eigenvectors of the normalised Laplacian of the canonically
/// reordered graph, zero-filled when the graph has fewer nodes than
/// `spectral_dim`.
///
/// # Errors
/// Returns [`CanonicalizeError::GraphTooLarge`] when the graph exceeds
/// `n_max` nodes and [`CanonicalizeError::EmptyGraph`] when it has none.
///
/// # Examples
/// ```
/// use neugraph_core::{EncodingParams, Graph, STATS_DIM, StatsVector, canonicalize};
///
/// let ring = Graph::from_edges(4, [(0, 1), (1, 2), (2, 3), (3, 0)])?;
/// let params = EncodingParams::new(8, 2)?;
/// let sample = canonicalize(&ring, StatsVector::new([0.0; STATS_DIM]), params)?;
/// assert_eq!(sample.node_count(), 4);
/// assert_eq!(sample.adjacency().len(), 64);
/// assert_eq!(sample.edge_count(), 4);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[instrument(
    name = "core.canonicalize",
    level = "debug",
    err,
    skip(graph, stats),
    fields(nodes = graph.node_count(), edges = graph.edge_count(), n_max = params.n_max()),
)]
pub fn canonicalize(
    graph: &Graph,
    stats: StatsVector,
    params: EncodingParams,
) -> Result<Sample, CanonicalizeError> {
    let n = graph.node_count();
    let n_max = params.n_max();
    if n == 0 {
        return Err(CanonicalizeError::EmptyGraph);
    }
    if n > n_max {
        return Err(CanonicalizeError::GraphTooLarge { nodes: n, n_max });
    }

    let ordering = canonical_ordering(graph);
    let mut dense = DMatrix::<f64>::zeros(n, n);
    let mut adjacency = vec![0.0_f32; n_max * n_max];
    for (u, v) in graph.edges() {
        let (Some(a), Some(b)) = (ordering.position_of(u), ordering.position_of(v)) else {
            continue;
        };
        dense[(a, b)] = 1.0;
        dense[(b, a)] = 1.0;
        for idx in [a * n_max + b, b * n_max + a] {
            if let Some(cell) = adjacency.get_mut(idx) {
                *cell = 1.0;
            }
        }
    }

    let spectral = spectral_features(&dense).leading_columns(params.spectral_dim());
    let degree_scale = (n_max - 1) as f64;
    let mut features = Vec::with_capacity(n * params.feature_dim());
    for (row, &node) in ordering.order().iter().enumerate() {
        features.push((graph.degree(node) as f64 / degree_scale) as f32);
        features.extend(spectral.row(row).iter().map(|&x| x as f32));
    }

    let mut edge_index = Vec::with_capacity(2 * graph.edge_count());
    for (row, cells) in adjacency.chunks(n_max).enumerate() {
        for (col, &cell) in cells.iter().enumerate() {
            if cell != 0.0 {
                edge_index.push((row as u32, col as u32));
            }
        }
    }

    Ok(Sample {
        node_count: n,
        n_max,
        feature_dim: params.feature_dim(),
        features,
        adjacency,
        edge_index,
        stats,
    })
}
