//! Maps file-level node identifiers onto dense graph indices.

use std::{collections::HashMap, sync::Arc};

use neugraph_core::Graph;

use crate::errors::GraphFileError;

/// Collects nodes and edges in declaration order and resolves edge
/// endpoints once every node is known, so edges may precede their nodes.
#[derive(Debug, Default)]
pub(crate) struct GraphAssembler {
    index: HashMap<Arc<str>, usize>,
    labels: Vec<Arc<str>>,
    edges: Vec<(Arc<str>, Arc<str>)>,
}

impl GraphAssembler {
    pub(crate) fn add_node(&mut self, id: &str, label: Option<&str>) -> Result<(), GraphFileError> {
        let id: Arc<str> = Arc::from(id);
        if self.index.contains_key(&id) {
            return Err(GraphFileError::DuplicateNode { id });
        }
        self.index.insert(Arc::clone(&id), self.labels.len());
        self.labels.push(label.map_or(id, Arc::from));
        Ok(())
    }

    pub(crate) fn add_edge(&mut self, source: &str, target: &str) {
        self.edges.push((Arc::from(source), Arc::from(target)));
    }

    pub(crate) fn finish(self) -> Result<Graph, GraphFileError> {
        let resolve = |id: &Arc<str>| {
            self.index
                .get(id)
                .copied()
                .ok_or_else(|| GraphFileError::UnknownNode { id: Arc::clone(id) })
        };
        let mut graph = Graph::new(self.labels.len());
        for (source, target) in &self.edges {
            graph.add_edge(resolve(source)?, resolve(target)?)?;
        }
        Ok(graph.with_labels(self.labels)?)
    }
}
