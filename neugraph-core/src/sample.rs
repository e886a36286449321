//! Fixed-capacity graph encodings and their batched tensor form.

use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{NeugraphError, Result, StatsError};

/// Width of every conditioning statistics vector.
pub const STATS_DIM: usize = 14;

/// Graph-level statistics used to condition generation.
///
/// The core treats the values as an opaque numeric condition. By convention
/// the first two entries are the node and edge counts.
///
/// # Examples
/// ```
/// use neugraph_core::{STATS_DIM, StatsVector};
///
/// let stats = StatsVector::try_from(vec![1.0_f32; STATS_DIM])?;
/// assert_eq!(stats.as_slice().len(), STATS_DIM);
/// assert!(StatsVector::try_from(vec![1.0_f32; 3]).is_err());
/// # Ok::<(), neugraph_core::StatsError>(())
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsVector([f32; STATS_DIM]);

impl StatsVector {
    /// Wraps an array of statistics.
    #[must_use]
    pub const fn new(values: [f32; STATS_DIM]) -> Self {
        Self(values)
    }

    /// Borrows the values.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl TryFrom<&[f32]> for StatsVector {
    type Error = StatsError;

    fn try_from(values: &[f32]) -> core::result::Result<Self, Self::Error> {
        <[f32; STATS_DIM]>::try_from(values)
            .map(Self)
            .map_err(|_| StatsError::WrongWidth {
                expected: STATS_DIM,
                actual: values.len(),
            })
    }
}

impl TryFrom<Vec<f32>> for StatsVector {
    type Error = StatsError;

    fn try_from(values: Vec<f32>) -> core::result::Result<Self, Self::Error> {
        Self::try_from(values.as_slice())
    }
}

/// Canonically ordered encoding of one graph.
///
/// `features` is `node_count × feature_dim` row-major, `adjacency` is
/// `n_max × n_max` row-major with zero padding beyond `node_count`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub(crate) node_count: usize,
    pub(crate) n_max: usize,
    pub(crate) feature_dim: usize,
    pub(crate) features: Vec<f32>,
    pub(crate) adjacency: Vec<f32>,
    pub(crate) edge_index: Vec<(u32, u32)>,
    pub(crate) stats: StatsVector,
}

impl Sample {
    /// Number of real (unpadded) nodes.
    #[rustfmt::skip]
    #[must_use]
    pub fn node_count(&self) -> usize { self.node_count }

    /// Padded node capacity.
    #[rustfmt::skip]
    #[must_use]
    pub fn n_max(&self) -> usize { self.n_max }

    /// Columns per feature row: one degree column plus the spectral columns.
    #[rustfmt::skip]
    #[must_use]
    pub fn feature_dim(&self) -> usize { self.feature_dim }

    /// Row-major node features.
    #[rustfmt::skip]
    #[must_use]
    pub fn features(&self) -> &[f32] { &self.features }

    /// Row-major padded adjacency matrix.
    #[rustfmt::skip]
    #[must_use]
    pub fn adjacency(&self) -> &[f32] { &self.adjacency }

    /// Directed message-passing pairs `(source, target)`, both directions
    /// of every undirected edge.
    #[rustfmt::skip]
    #[must_use]
    pub fn edge_index(&self) -> &[(u32, u32)] { &self.edge_index }

    /// Conditioning statistics.
    #[rustfmt::skip]
    #[must_use]
    pub fn stats(&self) -> &StatsVector { &self.stats }

    /// Adjacency entry `(row, col)`, zero outside the matrix.
    #[must_use]
    pub fn adjacency_at(&self, row: usize, col: usize) -> f32 {
        if row >= self.n_max || col >= self.n_max {
            return 0.0;
        }
        self.adjacency
            .get(row * self.n_max + col)
            .copied()
            .unwrap_or(0.0)
    }

    /// Feature row for `node`, if it exists.
    #[must_use]
    pub fn feature_row(&self, node: usize) -> Option<&[f32]> {
        let start = node.checked_mul(self.feature_dim)?;
        self.features.get(start..start + self.feature_dim)
    }

    /// Number of undirected edges in the encoded graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_index.len() / 2
    }
}

/// A minibatch of samples laid out for message passing.
///
/// Node rows of every graph are concatenated; `edge_src`/`edge_dst` are
/// offset into that concatenation and `node_graph` maps each row to its graph.
#[derive(Clone, Debug)]
pub struct GraphBatch {
    features: Tensor,
    edge_src: Tensor,
    edge_dst: Tensor,
    node_graph: Tensor,
    adjacency: Tensor,
    stats: Tensor,
    graph_count: usize,
    n_max: usize,
}

impl GraphBatch {
    /// Stacks `samples` into batch tensors on `device`.
    ///
    /// # Errors
    /// Returns [`NeugraphError::EmptySplit`] for an empty slice and
    /// [`NeugraphError::ShapeMismatch`] when samples disagree on `n_max` or
    /// feature width.
    pub fn collate(samples: &[&Sample], device: &Device) -> Result<Self> {
        let first = samples
            .first()
            .ok_or(NeugraphError::EmptySplit { split: "batch" })?;
        let n_max = first.n_max;
        let feature_dim = first.feature_dim;

        let mut features = Vec::new();
        let mut edge_src = Vec::new();
        let mut edge_dst = Vec::new();
        let mut node_graph = Vec::new();
        let mut adjacency = Vec::with_capacity(samples.len() * n_max * n_max);
        let mut stats = Vec::with_capacity(samples.len() * STATS_DIM);
        let mut offset = 0_u32;

        for (graph, sample) in (0_u32..).zip(samples) {
            if sample.n_max != n_max {
                return Err(NeugraphError::ShapeMismatch {
                    context: "sample n_max",
                    expected: n_max,
                    actual: sample.n_max,
                });
            }
            if sample.feature_dim != feature_dim {
                return Err(NeugraphError::ShapeMismatch {
                    context: "sample feature width",
                    expected: feature_dim,
                    actual: sample.feature_dim,
                });
            }
            features.extend_from_slice(&sample.features);
            for &(src, dst) in &sample.edge_index {
                edge_src.push(src + offset);
                edge_dst.push(dst + offset);
            }
            node_graph.extend(std::iter::repeat_n(graph, sample.node_count));
            adjacency.extend_from_slice(&sample.adjacency);
            stats.extend_from_slice(sample.stats.as_slice());
            offset += u32::try_from(sample.node_count).map_err(|_| {
                NeugraphError::ShapeMismatch {
                    context: "batch node count",
                    expected: u32::MAX as usize,
                    actual: sample.node_count,
                }
            })?;
        }

        let total_nodes = node_graph.len();
        let edges = edge_src.len();
        let graph_count = samples.len();
        Ok(Self {
            features: Tensor::from_vec(features, (total_nodes, feature_dim), device)?,
            edge_src: Tensor::from_vec(edge_src, edges, device)?,
            edge_dst: Tensor::from_vec(edge_dst, edges, device)?,
            node_graph: Tensor::from_vec(node_graph, total_nodes, device)?,
            adjacency: Tensor::from_vec(adjacency, (graph_count, n_max, n_max), device)?,
            stats: Tensor::from_vec(stats, (graph_count, STATS_DIM), device)?,
            graph_count,
            n_max,
        })
    }

    /// Concatenated node features, `(total_nodes, feature_dim)`.
    #[rustfmt::skip]
    #[must_use]
    pub fn features(&self) -> &Tensor { &self.features }

    /// Message source row per directed edge, `u32`.
    #[rustfmt::skip]
    #[must_use]
    pub fn edge_src(&self) -> &Tensor { &self.edge_src }

    /// Message target row per directed edge, `u32`.
    #[rustfmt::skip]
    #[must_use]
    pub fn edge_dst(&self) -> &Tensor { &self.edge_dst }

    /// Graph index per node row, `u32`.
    #[rustfmt::skip]
    #[must_use]
    pub fn node_graph(&self) -> &Tensor { &self.node_graph }

    /// Padded adjacency matrices, `(graph_count, n_max, n_max)`.
    #[rustfmt::skip]
    #[must_use]
    pub fn adjacency(&self) -> &Tensor { &self.adjacency }

    /// Conditioning statistics, `(graph_count, STATS_DIM)`.
    #[rustfmt::skip]
    #[must_use]
    pub fn stats(&self) -> &Tensor { &self.stats }

    /// Number of graphs in the batch.
    #[rustfmt::skip]
    #[must_use]
    pub fn graph_count(&self) -> usize { self.graph_count }

    /// Padded node capacity shared by every graph.
    #[rustfmt::skip]
    #[must_use]
    pub fn n_max(&self) -> usize { self.n_max }

    /// Element type of the feature tensors.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.features.dtype()
    }
}

/// Stacks statistics vectors into a `(len, STATS_DIM)` tensor.
///
/// # Errors
/// Propagates tensor allocation failures.
pub fn stats_tensor(stats: &[StatsVector], device: &Device) -> Result<Tensor> {
    let flat: Vec<f32> = stats.iter().flat_map(|s| s.0).collect();
    Ok(Tensor::from_vec(flat, (stats.len(), STATS_DIM), device)?)
}
