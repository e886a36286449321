use std::{path::PathBuf, sync::Arc};

use neugraph_core::{GraphError, StatsError};
use thiserror::Error;

/// Errors raised while reading graph, statistics or cache files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphFileError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("GML syntax error on line {line}: {message}")]
    Syntax { line: usize, message: Arc<str> },
    #[error("malformed GEXF document: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("`{element}` element is missing the `{attribute}` attribute")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("document does not contain a graph")]
    MissingGraph,
    #[error("node `{id}` is declared more than once")]
    DuplicateNode { id: Arc<str> },
    #[error("edge references unknown node `{id}`")]
    UnknownNode { id: Arc<str> },
    #[error("`{path}` is neither a .gml nor a .gexf file")]
    UnsupportedExtension { path: PathBuf },
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("dataset cache `{path}` is unreadable: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: {source}")]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<GraphFileError>,
    },
}

impl GraphFileError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn in_file(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Io { .. } | Self::InFile { .. } => self,
            other => Self::InFile {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// Innermost error with any file context removed.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::InFile { source, .. } => source.root(),
            other => other,
        }
    }
}
