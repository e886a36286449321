//! Error types for the neugraph core library.
//!
//! Defines the per-stage error enums exposed by the public API, the umbrella
//! [`NeugraphError`], and a convenient result alias.

use std::{path::PathBuf, sync::Arc};

use thiserror::Error;

use crate::diffusion::{DiffusionError, ScheduleError};

macro_rules! define_error_codes {
    (
        $(#[$enum_meta:meta])*
        enum $CodeTy:ident for $ErrTy:ident {
            $(
                $(#[$variant_meta:meta])*
                $CodeVariant:ident => $ErrVariant:ident $( { $($pattern:tt)* } )? $( ( $($tuple:tt)* ) )? => $code:expr
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        #[non_exhaustive]
        pub enum $CodeTy {
            $(
                $(#[$variant_meta])*
                $CodeVariant,
            )+
        }

        impl $CodeTy {
            /// Return the stable machine-readable representation of this error code.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$CodeVariant => $code,)+
                }
            }
        }

        impl std::fmt::Display for $CodeTy {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $ErrTy {
            #[doc = concat!(
                "Retrieve the stable [`",
                stringify!($CodeTy),
                "`] for this error."
            )]
            #[must_use]
            pub const fn code(&self) -> $CodeTy {
                match self {
                    $(Self::$ErrVariant $( { $($pattern)* } )? $( ( $($tuple)* ) )? => $CodeTy::$CodeVariant,)+
                }
            }
        }
    };
}

pub(crate) use define_error_codes;

/// An error produced while building or encoding a [`crate::Graph`].
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum GraphError {
    /// An edge referenced a node that does not exist.
    #[error("node {node} is out of range for a graph with {node_count} nodes")]
    NodeOutOfRange {
        /// The offending node identifier.
        node: usize,
        /// Number of nodes in the graph.
        node_count: usize,
    },
    /// The number of labels did not match the number of nodes.
    #[error("expected {expected} node labels but {actual} were supplied")]
    LabelCountMismatch {
        /// Number of nodes in the graph.
        expected: usize,
        /// Number of labels supplied.
        actual: usize,
    },
}

define_error_codes! {
    /// Stable codes describing [`GraphError`] variants.
    enum GraphErrorCode for GraphError {
        /// An edge referenced a node that does not exist.
        NodeOutOfRange => NodeOutOfRange { .. } => "GRAPH_NODE_OUT_OF_RANGE",
        /// The number of labels did not match the number of nodes.
        LabelCountMismatch => LabelCountMismatch { .. } => "GRAPH_LABEL_COUNT_MISMATCH",
    }
}

/// An error produced by [`crate::canonicalize`] and [`crate::EncodingParams`].
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum CanonicalizeError {
    /// The graph has more nodes than the configured capacity.
    #[error("graph has {nodes} nodes but the encoding capacity is {n_max}")]
    GraphTooLarge {
        /// Number of nodes in the rejected graph.
        nodes: usize,
        /// Maximum node count accepted by the encoding.
        n_max: usize,
    },
    /// The graph has no nodes.
    #[error("graph has no nodes")]
    EmptyGraph,
    /// Encoding parameters were rejected.
    #[error("invalid encoding parameters: {reason}")]
    InvalidParameters {
        /// Explanation of the rejected parameter.
        reason: Arc<str>,
    },
}

define_error_codes! {
    /// Stable codes describing [`CanonicalizeError`] variants.
    enum CanonicalizeErrorCode for CanonicalizeError {
        /// The graph has more nodes than the configured capacity.
        GraphTooLarge => GraphTooLarge { .. } => "CANONICALIZE_GRAPH_TOO_LARGE",
        /// The graph has no nodes.
        EmptyGraph => EmptyGraph => "CANONICALIZE_EMPTY_GRAPH",
        /// Encoding parameters were rejected.
        InvalidParameters => InvalidParameters { .. } => "CANONICALIZE_INVALID_PARAMETERS",
    }
}

/// An error produced when a statistics vector has the wrong width.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum StatsError {
    /// The vector did not contain exactly [`crate::STATS_DIM`] values.
    #[error("statistics vector has {actual} values but {expected} are required")]
    WrongWidth {
        /// Required number of values.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
}

define_error_codes! {
    /// Stable codes describing [`StatsError`] variants.
    enum StatsErrorCode for StatsError {
        /// The vector did not contain exactly [`crate::STATS_DIM`] values.
        WrongWidth => WrongWidth { .. } => "STATS_WRONG_WIDTH",
    }
}

/// An error produced while validating a [`crate::GeneratorBuilder`].
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A dimension, count or size that must be positive was zero.
    #[error("{field} must be at least {minimum} (got {got})")]
    TooSmall {
        /// Name of the offending field.
        field: &'static str,
        /// Smallest accepted value.
        minimum: usize,
        /// Value supplied by the caller.
        got: usize,
    },
    /// The denoiser hidden width must be even for the sinusoidal time embedding.
    #[error("hidden_dim_denoise must be even (got {got})")]
    OddTimeEmbedding {
        /// Value supplied by the caller.
        got: usize,
    },
    /// The learning rate was not a finite positive number.
    #[error("learning rate must be finite and positive (got {got})")]
    InvalidLearningRate {
        /// Value supplied by the caller.
        got: f64,
    },
    /// The dropout probability was outside `[0, 1)`.
    #[error("dropout must lie in [0, 1) (got {got})")]
    InvalidDropout {
        /// Value supplied by the caller.
        got: f32,
    },
    /// The learning-rate decay factor was outside `(0, 1]`.
    #[error("lr_gamma must lie in (0, 1] (got {got})")]
    InvalidGamma {
        /// Value supplied by the caller.
        got: f64,
    },
    /// The Gumbel-softmax temperature was not a finite positive number.
    #[error("gumbel tau must be finite and positive (got {got})")]
    InvalidGumbelTau {
        /// Value supplied by the caller.
        got: f64,
    },
    /// The edge threshold was outside `[0, 1]`.
    #[error("edge threshold must lie in [0, 1] (got {got})")]
    InvalidEdgeThreshold {
        /// Value supplied by the caller.
        got: f32,
    },
}

define_error_codes! {
    /// Stable codes describing [`ConfigError`] variants.
    enum ConfigErrorCode for ConfigError {
        /// A dimension, count or size that must be positive was zero.
        TooSmall => TooSmall { .. } => "CONFIG_TOO_SMALL",
        /// The denoiser hidden width must be even.
        OddTimeEmbedding => OddTimeEmbedding { .. } => "CONFIG_ODD_TIME_EMBEDDING",
        /// The learning rate was not a finite positive number.
        InvalidLearningRate => InvalidLearningRate { .. } => "CONFIG_INVALID_LEARNING_RATE",
        /// The dropout probability was outside `[0, 1)`.
        InvalidDropout => InvalidDropout { .. } => "CONFIG_INVALID_DROPOUT",
        /// The learning-rate decay factor was outside `(0, 1]`.
        InvalidGamma => InvalidGamma { .. } => "CONFIG_INVALID_GAMMA",
        /// The Gumbel-softmax temperature was not a finite positive number.
        InvalidGumbelTau => InvalidGumbelTau { .. } => "CONFIG_INVALID_GUMBEL_TAU",
        /// The edge threshold was outside `[0, 1]`.
        InvalidEdgeThreshold => InvalidEdgeThreshold { .. } => "CONFIG_INVALID_EDGE_THRESHOLD",
    }
}

/// An error produced while saving or loading a model checkpoint.
#[non_exhaustive]
#[derive(Clone, Debug, Error)]
pub enum CheckpointError {
    /// Loading was requested but the checkpoint file does not exist.
    #[error("checkpoint `{}` does not exist", path.display())]
    Missing {
        /// Location that was expected to hold the checkpoint.
        path: PathBuf,
    },
    /// The checkpoint file lacked a tensor the model requires.
    #[error("checkpoint `{}` has no tensor named `{name}`", path.display())]
    MissingTensor {
        /// Location of the checkpoint.
        path: PathBuf,
        /// Name of the absent tensor.
        name: Arc<str>,
    },
    /// A stored tensor had a different shape from the live parameter.
    #[error("checkpoint tensor `{name}` has shape {stored:?} but the model expects {expected:?}")]
    ShapeMismatch {
        /// Name of the offending tensor.
        name: Arc<str>,
        /// Shape found in the checkpoint.
        stored: Vec<usize>,
        /// Shape of the live parameter.
        expected: Vec<usize>,
    },
    /// Reading or writing the checkpoint failed.
    #[error("checkpoint I/O on `{}` failed: {error}", path.display())]
    Io {
        /// Location of the checkpoint.
        path: PathBuf,
        #[source]
        /// Underlying tensor-serialisation failure.
        error: Arc<candle_core::Error>,
    },
}

define_error_codes! {
    /// Stable codes describing [`CheckpointError`] variants.
    enum CheckpointErrorCode for CheckpointError {
        /// Loading was requested but the checkpoint file does not exist.
        Missing => Missing { .. } => "CHECKPOINT_MISSING",
        /// The checkpoint file lacked a tensor the model requires.
        MissingTensor => MissingTensor { .. } => "CHECKPOINT_MISSING_TENSOR",
        /// A stored tensor had a different shape from the live parameter.
        ShapeMismatch => ShapeMismatch { .. } => "CHECKPOINT_SHAPE_MISMATCH",
        /// Reading or writing the checkpoint failed.
        Io => Io { .. } => "CHECKPOINT_IO",
    }
}

/// Error type produced by the training and generation pipeline.
#[non_exhaustive]
#[derive(Clone, Debug, Error)]
pub enum NeugraphError {
    /// Generator configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A graph could not be built.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// A graph could not be canonicalised.
    #[error(transparent)]
    Canonicalize(#[from] CanonicalizeError),
    /// A statistics vector had the wrong width.
    #[error(transparent)]
    Stats(#[from] StatsError),
    /// The diffusion schedule could not be constructed.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    /// A diffusion step was requested with invalid inputs.
    #[error(transparent)]
    Diffusion(#[from] DiffusionError),
    /// A checkpoint could not be saved or restored.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    /// Samples passed to one operation disagreed on a dimension.
    #[error("{context}: expected {expected} but found {actual}")]
    ShapeMismatch {
        /// Which dimension disagreed.
        context: &'static str,
        /// Value required by the receiving component.
        expected: usize,
        /// Value actually supplied.
        actual: usize,
    },
    /// A training split contained no samples.
    #[error("the {split} split contains no samples")]
    EmptySplit {
        /// Name of the empty split.
        split: &'static str,
    },
    /// Training diverged: an epoch produced a NaN or infinite loss.
    #[error("{phase} training diverged at epoch {epoch}: {split} loss is {loss}")]
    NonFiniteLoss {
        /// Model being trained, `autoencoder` or `denoiser`.
        phase: &'static str,
        /// One-based epoch that diverged.
        epoch: usize,
        /// Split whose mean loss was not finite.
        split: &'static str,
        /// The offending value.
        loss: f64,
    },
    /// The tensor backend reported a failure.
    #[error("tensor operation failed: {error}")]
    Tensor {
        #[source]
        /// Underlying backend error.
        error: Arc<candle_core::Error>,
    },
}

define_error_codes! {
    /// Stable codes describing [`NeugraphError`] variants.
    enum NeugraphErrorCode for NeugraphError {
        /// Generator configuration was rejected.
        Config => Config(..) => "NEUGRAPH_CONFIG",
        /// A graph could not be built.
        Graph => Graph(..) => "NEUGRAPH_GRAPH",
        /// A graph could not be canonicalised.
        Canonicalize => Canonicalize(..) => "NEUGRAPH_CANONICALIZE",
        /// A statistics vector had the wrong width.
        Stats => Stats(..) => "NEUGRAPH_STATS",
        /// The diffusion schedule could not be constructed.
        Schedule => Schedule(..) => "NEUGRAPH_SCHEDULE",
        /// A diffusion step was requested with invalid inputs.
        Diffusion => Diffusion(..) => "NEUGRAPH_DIFFUSION",
        /// A checkpoint could not be saved or restored.
        Checkpoint => Checkpoint(..) => "NEUGRAPH_CHECKPOINT",
        /// Samples passed to one operation disagreed on a dimension.
        ShapeMismatch => ShapeMismatch { .. } => "NEUGRAPH_SHAPE_MISMATCH",
        /// A training split contained no samples.
        EmptySplit => EmptySplit { .. } => "NEUGRAPH_EMPTY_SPLIT",
        /// Training diverged.
        NonFiniteLoss => NonFiniteLoss { .. } => "NEUGRAPH_NON_FINITE_LOSS",
        /// The tensor backend reported a failure.
        Tensor => Tensor { .. } => "NEUGRAPH_TENSOR",
    }
}

impl NeugraphError {
    /// Retrieve the code of the wrapped stage error, when there is one.
    ///
    /// # Examples
    /// ```
    /// use neugraph_core::{CanonicalizeError, NeugraphError};
    ///
    /// let err = NeugraphError::from(CanonicalizeError::EmptyGraph);
    /// assert_eq!(err.detail_code(), Some("CANONICALIZE_EMPTY_GRAPH"));
    /// ```
    #[must_use]
    pub const fn detail_code(&self) -> Option<&'static str> {
        match self {
            Self::Config(error) => Some(error.code().as_str()),
            Self::Graph(error) => Some(error.code().as_str()),
            Self::Canonicalize(error) => Some(error.code().as_str()),
            Self::Stats(error) => Some(error.code().as_str()),
            Self::Schedule(error) => Some(error.code().as_str()),
            Self::Diffusion(error) => Some(error.code().as_str()),
            Self::Checkpoint(error) => Some(error.code().as_str()),
            _ => None,
        }
    }
}

impl From<candle_core::Error> for NeugraphError {
    fn from(error: candle_core::Error) -> Self {
        Self::Tensor {
            error: Arc::new(error),
        }
    }
}

/// Convenient alias for results returned by the core API.
pub type Result<T> = core::result::Result<T, NeugraphError>;
