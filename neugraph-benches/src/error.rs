//! Benchmark setup error type.

use neugraph_core::{CanonicalizeError, GraphError, NeugraphError};

/// Errors that may occur while preparing benchmark inputs.
#[derive(Debug, thiserror::Error)]
pub enum BenchSetupError {
    /// A synthetic graph could not be built.
    #[error("graph construction failed: {0}")]
    Graph(#[from] GraphError),
    /// Encoding parameters or canonicalisation were rejected.
    #[error("canonicalisation failed: {0}")]
    Canonicalize(#[from] CanonicalizeError),
    /// Model construction or sampling failed.
    #[error("model operation failed: {0}")]
    Model(#[from] NeugraphError),
    /// The edge probability was outside `[0, 1]`.
    #[error("edge probability {0} is outside [0, 1]")]
    InvalidProbability(f64),
}
