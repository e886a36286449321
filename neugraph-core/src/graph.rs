//! Undirected simple graphs consumed by the canonicaliser and emitted by the
//! generator.

use std::{collections::BTreeSet, sync::Arc};

use crate::error::GraphError;

/// An undirected graph without self-loops or parallel edges.
///
/// Neighbour sets are kept sorted so every traversal visits nodes in ascending
/// identifier order.
///
/// # Examples
/// ```
/// use neugraph_core::Graph;
///
/// let graph = Graph::from_edges(3, [(0, 1), (1, 2), (2, 1)])?;
/// assert_eq!(graph.edge_count(), 2);
/// assert_eq!(graph.degree(1), 2);
/// # Ok::<(), neugraph_core::GraphError>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Graph {
    neighbours: Vec<BTreeSet<usize>>,
    labels: Option<Vec<Arc<str>>>,
    edge_count: usize,
}

impl Graph {
    /// Creates a graph with `node_count` isolated nodes.
    #[must_use]
    pub fn new(node_count: usize) -> Self {
        Self {
            neighbours: vec![BTreeSet::new(); node_count],
            labels: None,
            edge_count: 0,
        }
    }

    /// Builds a graph from an edge list, dropping self-loops and duplicates.
    ///
    /// # Errors
    /// Returns [`GraphError::NodeOutOfRange`] when an endpoint is not below
    /// `node_count`.
    pub fn from_edges<I>(node_count: usize, edges: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut graph = Self::new(node_count);
        for (u, v) in edges {
            graph.add_edge(u, v)?;
        }
        Ok(graph)
    }

    /// Attaches one label per node, in node order.
    ///
    /// # Errors
    /// Returns [`GraphError::LabelCountMismatch`] when the label count differs
    /// from the node count.
    pub fn with_labels<I, S>(mut self, labels: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let labels: Vec<Arc<str>> = labels.into_iter().map(Into::into).collect();
        if labels.len() != self.node_count() {
            return Err(GraphError::LabelCountMismatch {
                expected: self.node_count(),
                actual: labels.len(),
            });
        }
        self.labels = Some(labels);
        Ok(self)
    }

    /// Inserts the undirected edge `{u, v}`.
    ///
    /// Returns `true` when the edge was new. Self-loops are ignored and
    /// reported as `false`.
    ///
    /// # Errors
    /// Returns [`GraphError::NodeOutOfRange`] when either endpoint is unknown.
    pub fn add_edge(&mut self, u: usize, v: usize) -> Result<bool, GraphError> {
        let node_count = self.node_count();
        for node in [u, v] {
            if node >= node_count {
                return Err(GraphError::NodeOutOfRange { node, node_count });
            }
        }
        Ok(self.link(u, v))
    }

    fn link(&mut self, u: usize, v: usize) -> bool {
        if u == v {
            return false;
        }
        let inserted = self.neighbours.get_mut(u).is_some_and(|set| set.insert(v));
        if inserted {
            if let Some(set) = self.neighbours.get_mut(v) {
                set.insert(u);
            }
            self.edge_count += 1;
        }
        inserted
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.neighbours.len()
    }

    /// Number of undirected edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Degree of `node`, or zero when the node does not exist.
    #[must_use]
    pub fn degree(&self, node: usize) -> usize {
        self.neighbours.get(node).map_or(0, BTreeSet::len)
    }

    /// Neighbours of `node` in ascending order.
    pub fn neighbours(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.neighbours.get(node).into_iter().flatten().copied()
    }

    /// Returns `true` when `{u, v}` is an edge.
    #[must_use]
    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.neighbours.get(u).is_some_and(|set| set.contains(&v))
    }

    /// Label of `node`, if labels were attached.
    #[must_use]
    pub fn label(&self, node: usize) -> Option<&str> {
        self.labels.as_ref()?.get(node).map(AsRef::as_ref)
    }

    /// Iterates every edge once as `(u, v)` with `u < v`.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.neighbours.iter().enumerate().flat_map(|(u, set)| {
            set.range(u.saturating_add(1)..).map(move |&v| (u, v))
        })
    }

    /// Connected components in discovery order.
    ///
    /// Discovery scans nodes in ascending order; each component lists its
    /// nodes in ascending order.
    #[must_use]
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.node_count()];
        let mut components = Vec::new();
        for start in 0..self.node_count() {
            if seen.get(start).copied().unwrap_or(true) {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start];
            if let Some(flag) = seen.get_mut(start) {
                *flag = true;
            }
            while let Some(node) = stack.pop() {
                component.push(node);
                for next in self.neighbours(node) {
                    if let Some(flag) = seen.get_mut(next)
                        && !*flag
                    {
                        *flag = true;
                        stack.push(next);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }

    /// Builds a graph from a dense `n × n` score matrix in row-major order.
    ///
    /// Entries of the strict upper triangle above `threshold` become edges.
    /// Nodes left without any edge are removed and the survivors renumbered in
    /// their original order, since padding rows cannot be told apart from
    /// isolated nodes.
    ///
    /// # Examples
    /// ```
    /// use neugraph_core::Graph;
    ///
    /// #[rustfmt::skip]
    /// let scores = [
    ///     0.0, 0.9, 0.0,
    ///     0.9, 0.0, 0.1,
    ///     0.0, 0.1, 0.0,
    /// ];
    /// let graph = Graph::from_adjacency(&scores, 3, 0.5);
    /// assert_eq!(graph.node_count(), 2);
    /// assert_eq!(graph.edge_count(), 1);
    /// ```
    #[must_use]
    pub fn from_adjacency(values: &[f32], n: usize, threshold: f32) -> Self {
        let mut edges = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                let score = values.get(i * n + j).copied().unwrap_or(0.0);
                if score > threshold {
                    edges.push((i, j));
                }
            }
        }
        let mut used = vec![false; n];
        for &(i, j) in &edges {
            for node in [i, j] {
                if let Some(flag) = used.get_mut(node) {
                    *flag = true;
                }
            }
        }
        let mut remap = vec![None; n];
        let mut next = 0;
        for (slot, &flag) in remap.iter_mut().zip(&used) {
            if flag {
                *slot = Some(next);
                next += 1;
            }
        }
        let mut graph = Self::new(next);
        for (i, j) in edges {
            if let (Some(&Some(u)), Some(&Some(v))) = (remap.get(i), remap.get(j)) {
                graph.link(u, v);
            }
        }
        graph
    }

    /// Basic size and density figures for reporting.
    #[must_use]
    pub fn summary(&self) -> GraphSummary {
        GraphSummary::of(self)
    }
}

/// Size and density figures for one graph.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GraphSummary {
    /// Number of nodes.
    pub nodes: usize,
    /// Number of undirected edges.
    pub edges: usize,
    /// Edge count divided by the number of possible edges.
    pub density: f64,
    /// Mean node degree.
    pub mean_degree: f64,
}

impl GraphSummary {
    fn of(graph: &Graph) -> Self {
        let nodes = graph.node_count();
        let edges = graph.edge_count();
        let n = nodes as f64;
        let e = edges as f64;
        let possible = n * (n - 1.0) / 2.0;
        Self {
            nodes,
            edges,
            density: if possible > 0.0 { e / possible } else { 0.0 },
            mean_degree: if nodes > 0 { 2.0 * e / n } else { 0.0 },
        }
    }
}
