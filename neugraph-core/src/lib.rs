//! neugraph core library.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod autoencoder;
mod builder;
mod canonical;
mod checkpoint;
mod dataset;
mod diffusion;
mod error;
mod generator;
mod graph;
mod noise;
mod optim;
mod sample;
mod spectral;

#[cfg(test)]
mod test_utils;

pub use crate::{
    autoencoder::{
        AutoencoderConfig, AutoencoderKind, AutoencoderLoss, EdgeReadout, LatentAutoencoder,
        Phase, PlainAutoencoder, VariationalAutoencoder, build_autoencoder,
    },
    builder::{
        AUTOENCODER_CHECKPOINT, CheckpointPaths, DENOISER_CHECKPOINT, GeneratorBuilder,
        GeneratorConfig, ModelSource,
    },
    canonical::{CanonicalOrdering, EncodingParams, canonical_ordering, canonicalize},
    checkpoint::{load_checkpoint, save_checkpoint},
    dataset::{
        DatasetSplit, EncodedCorpus, GraphRecord, SplitSamples, TRAIN_FRACTION,
        VALIDATION_FRACTION, encode_corpus, minibatches,
    },
    diffusion::{
        DEFAULT_BETA_END, DEFAULT_BETA_START, DenoiseNetwork, DenoiserConfig, DiffusionError,
        DiffusionErrorCode, DiffusionSchedule, MISSING_STAT, NoisePredictor, ScheduleError,
        ScheduleErrorCode, denoising_loss, posterior_mean, q_sample, reverse_process, reverse_step,
        sample_loop,
    },
    error::{
        CanonicalizeError, CanonicalizeErrorCode, CheckpointError, CheckpointErrorCode,
        ConfigError, ConfigErrorCode, GraphError, GraphErrorCode, NeugraphError,
        NeugraphErrorCode, Result, StatsError, StatsErrorCode,
    },
    generator::{
        EpochLoss, GeneratedGraph, GenerationReport, GraphGenerator, ReconstructionReport,
        TrainingReport,
    },
    graph::{Graph, GraphSummary},
    noise::standard_normal,
    optim::{Adam, StepLr},
    sample::{GraphBatch, STATS_DIM, Sample, StatsVector, stats_tensor},
    spectral::{SpectralEmbedding, normalized_laplacian, spectral_features},
};
