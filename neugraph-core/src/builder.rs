//! Builder utilities for configuring a [`GraphGenerator`].
//!
//! Exposes the hyperparameter surface, the choice between training a model
//! from scratch or restoring it from disk, and the validation applied before
//! a generator is constructed.

use std::path::{Path, PathBuf};

use candle_core::Device;

use crate::{
    autoencoder::{AutoencoderConfig, AutoencoderKind, EdgeReadout},
    canonical::EncodingParams,
    diffusion::{DEFAULT_BETA_END, DEFAULT_BETA_START, DenoiserConfig, DiffusionSchedule},
    error::{ConfigError, Result},
    generator::GraphGenerator,
};

/// Default autoencoder checkpoint file name.
pub const AUTOENCODER_CHECKPOINT: &str = "autoencoder.safetensors";
/// Default denoiser checkpoint file name.
pub const DENOISER_CHECKPOINT: &str = "denoise_model.safetensors";

/// Where the parameters of one model come from.
///
/// # Examples
/// ```
/// use neugraph_core::ModelSource;
///
/// assert_eq!(ModelSource::default(), ModelSource::TrainFresh);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ModelSource {
    /// Train from freshly initialised parameters, checkpointing the best
    /// validation epoch.
    #[default]
    TrainFresh,
    /// Restore parameters and optimiser state from the model's checkpoint.
    /// A missing checkpoint is an error.
    LoadCheckpoint,
}

/// Checkpoint locations of both models.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CheckpointPaths {
    /// Autoencoder checkpoint.
    pub autoencoder: PathBuf,
    /// Denoiser checkpoint.
    pub denoiser: PathBuf,
}

impl CheckpointPaths {
    /// Default file names placed inside `dir`.
    ///
    /// # Examples
    /// ```
    /// use std::path::Path;
    /// use neugraph_core::CheckpointPaths;
    ///
    /// let paths = CheckpointPaths::in_dir("runs");
    /// assert_eq!(paths.denoiser, Path::new("runs/denoise_model.safetensors"));
    /// ```
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            autoencoder: dir.join(AUTOENCODER_CHECKPOINT),
            denoiser: dir.join(DENOISER_CHECKPOINT),
        }
    }
}

impl Default for CheckpointPaths {
    fn default() -> Self {
        Self {
            autoencoder: PathBuf::from(AUTOENCODER_CHECKPOINT),
            denoiser: PathBuf::from(DENOISER_CHECKPOINT),
        }
    }
}

/// Validated, immutable generator configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratorConfig {
    pub(crate) learning_rate: f64,
    pub(crate) dropout: f32,
    pub(crate) batch_size: usize,
    pub(crate) epochs_autoencoder: usize,
    pub(crate) hidden_dim_encoder: usize,
    pub(crate) hidden_dim_decoder: usize,
    pub(crate) latent_dim: usize,
    pub(crate) n_max: usize,
    pub(crate) n_layers_encoder: usize,
    pub(crate) n_layers_decoder: usize,
    pub(crate) spectral_dim: usize,
    pub(crate) variational: bool,
    pub(crate) epochs_denoise: usize,
    pub(crate) timesteps: usize,
    pub(crate) hidden_dim_denoise: usize,
    pub(crate) n_layers_denoise: usize,
    pub(crate) dim_condition: usize,
    pub(crate) lr_step_size: usize,
    pub(crate) lr_gamma: f64,
    pub(crate) kl_weight: f64,
    pub(crate) readout: EdgeReadout,
    pub(crate) edge_threshold: f32,
    pub(crate) seed: u64,
    pub(crate) autoencoder_source: ModelSource,
    pub(crate) denoiser_source: ModelSource,
    pub(crate) checkpoints: CheckpointPaths,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            dropout: 0.0,
            batch_size: 256,
            epochs_autoencoder: 100,
            hidden_dim_encoder: 64,
            hidden_dim_decoder: 256,
            latent_dim: 32,
            n_max: 20,
            n_layers_encoder: 2,
            n_layers_decoder: 2,
            spectral_dim: 5,
            variational: true,
            epochs_denoise: 100,
            timesteps: 500,
            hidden_dim_denoise: 128,
            n_layers_denoise: 2,
            dim_condition: 128,
            lr_step_size: 500,
            lr_gamma: 0.1,
            kl_weight: 0.05,
            readout: EdgeReadout::Probabilities,
            edge_threshold: 0.5,
            seed: 13,
            autoencoder_source: ModelSource::TrainFresh,
            denoiser_source: ModelSource::TrainFresh,
            checkpoints: CheckpointPaths::default(),
        }
    }
}

impl GeneratorConfig {
    /// Optimiser learning rate at epoch zero.
    #[rustfmt::skip]
    #[must_use]
    pub fn learning_rate(&self) -> f64 { self.learning_rate }

    /// Graphs per minibatch, also the generation chunk size.
    #[rustfmt::skip]
    #[must_use]
    pub fn batch_size(&self) -> usize { self.batch_size }

    /// Autoencoder training epochs.
    #[rustfmt::skip]
    #[must_use]
    pub fn epochs_autoencoder(&self) -> usize { self.epochs_autoencoder }

    /// Denoiser training epochs.
    #[rustfmt::skip]
    #[must_use]
    pub fn epochs_denoise(&self) -> usize { self.epochs_denoise }

    /// Seed for splitting, shuffling and noise.
    #[rustfmt::skip]
    #[must_use]
    pub fn seed(&self) -> u64 { self.seed }

    /// Adjacency probability above which a decoded pair becomes an edge.
    #[rustfmt::skip]
    #[must_use]
    pub fn edge_threshold(&self) -> f32 { self.edge_threshold }

    /// Source of the autoencoder parameters.
    #[rustfmt::skip]
    #[must_use]
    pub fn autoencoder_source(&self) -> ModelSource { self.autoencoder_source }

    /// Source of the denoiser parameters.
    #[rustfmt::skip]
    #[must_use]
    pub fn denoiser_source(&self) -> ModelSource { self.denoiser_source }

    /// Checkpoint locations.
    #[rustfmt::skip]
    #[must_use]
    pub fn checkpoints(&self) -> &CheckpointPaths { &self.checkpoints }

    /// Selected autoencoder variant.
    #[must_use]
    pub fn autoencoder_kind(&self) -> AutoencoderKind {
        if self.variational {
            AutoencoderKind::Variational
        } else {
            AutoencoderKind::Plain
        }
    }

    /// Canonicaliser capacity and spectral width.
    ///
    /// # Errors
    /// Unreachable for a validated configuration; surfaces
    /// [`crate::CanonicalizeError::InvalidParameters`] otherwise.
    pub fn encoding_params(&self) -> Result<EncodingParams> {
        Ok(EncodingParams::new(self.n_max, self.spectral_dim)?)
    }

    /// Autoencoder architecture.
    #[must_use]
    pub fn autoencoder_config(&self) -> AutoencoderConfig {
        AutoencoderConfig {
            input_dim: self.spectral_dim + 1,
            hidden_dim_encoder: self.hidden_dim_encoder,
            hidden_dim_decoder: self.hidden_dim_decoder,
            latent_dim: self.latent_dim,
            n_layers_encoder: self.n_layers_encoder,
            n_layers_decoder: self.n_layers_decoder,
            n_max: self.n_max,
            dropout: self.dropout,
            readout: self.readout,
            kl_weight: self.kl_weight,
        }
    }

    /// Denoiser architecture.
    #[must_use]
    pub fn denoiser_config(&self) -> DenoiserConfig {
        DenoiserConfig {
            latent_dim: self.latent_dim,
            hidden_dim: self.hidden_dim_denoise,
            n_layers: self.n_layers_denoise,
            condition_dim: self.dim_condition,
        }
    }

    /// Linear noise schedule over the configured timestep budget.
    ///
    /// # Errors
    /// Surfaces [`crate::ScheduleError`] when the schedule degenerates.
    pub fn schedule(&self) -> Result<DiffusionSchedule> {
        Ok(DiffusionSchedule::linear(
            self.timesteps,
            DEFAULT_BETA_START,
            DEFAULT_BETA_END,
        )?)
    }
}

/// Configures and validates a [`GeneratorConfig`].
///
/// # Examples
/// ```
/// use neugraph_core::{GeneratorBuilder, ModelSource};
///
/// let config = GeneratorBuilder::new()
///     .with_n_max(12)
///     .with_variational(false)
///     .with_denoiser_source(ModelSource::LoadCheckpoint)
///     .build()?;
/// assert_eq!(config.encoding_params()?.n_max(), 12);
/// assert_eq!(config.denoiser_source(), ModelSource::LoadCheckpoint);
/// # Ok::<(), neugraph_core::NeugraphError>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct GeneratorBuilder {
    config: GeneratorConfig,
}

macro_rules! setters {
    ($($(#[$meta:meta])* $method:ident => $field:ident: $ty:ty),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[must_use]
            pub fn $method(mut self, value: $ty) -> Self {
                self.config.$field = value;
                self
            }
        )+
    };
}

impl GeneratorBuilder {
    /// Creates a builder populated with default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    setters! {
        /// Overrides the learning rate.
        with_learning_rate => learning_rate: f64,
        /// Overrides the encoder dropout probability.
        with_dropout => dropout: f32,
        /// Overrides the minibatch size.
        with_batch_size => batch_size: usize,
        /// Overrides the autoencoder epoch count.
        with_epochs_autoencoder => epochs_autoencoder: usize,
        /// Overrides the GIN hidden width.
        with_hidden_dim_encoder => hidden_dim_encoder: usize,
        /// Overrides the decoder hidden width.
        with_hidden_dim_decoder => hidden_dim_decoder: usize,
        /// Overrides the latent width.
        with_latent_dim => latent_dim: usize,
        /// Overrides the node capacity.
        with_n_max => n_max: usize,
        /// Overrides the number of GIN layers.
        with_n_layers_encoder => n_layers_encoder: usize,
        /// Overrides the number of decoder layers.
        with_n_layers_decoder => n_layers_decoder: usize,
        /// Overrides the number of spectral feature columns.
        with_spectral_dim => spectral_dim: usize,
        /// Selects the variational (`true`) or plain autoencoder.
        with_variational => variational: bool,
        /// Overrides the denoiser epoch count.
        with_epochs_denoise => epochs_denoise: usize,
        /// Overrides the diffusion timestep budget.
        with_timesteps => timesteps: usize,
        /// Overrides the denoiser hidden width.
        with_hidden_dim_denoise => hidden_dim_denoise: usize,
        /// Overrides the number of denoiser layers.
        with_n_layers_denoise => n_layers_denoise: usize,
        /// Overrides the embedded conditioning width.
        with_dim_condition => dim_condition: usize,
        /// Overrides the learning-rate decay period in epochs.
        with_lr_step_size => lr_step_size: usize,
        /// Overrides the learning-rate decay factor.
        with_lr_gamma => lr_gamma: f64,
        /// Overrides the KL weight of the variational loss.
        with_kl_weight => kl_weight: f64,
        /// Overrides the training-time edge read-out.
        with_readout => readout: EdgeReadout,
        /// Overrides the edge threshold applied to decoded adjacency.
        with_edge_threshold => edge_threshold: f32,
        /// Overrides the run seed.
        with_seed => seed: u64,
        /// Chooses where autoencoder parameters come from.
        with_autoencoder_source => autoencoder_source: ModelSource,
        /// Chooses where denoiser parameters come from.
        with_denoiser_source => denoiser_source: ModelSource,
        /// Overrides the checkpoint locations.
        with_checkpoints => checkpoints: CheckpointPaths,
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns [`crate::NeugraphError::Config`] describing the first
    /// rejected field.
    pub fn build(self) -> Result<GeneratorConfig> {
        validate(&self.config)?;
        Ok(self.config)
    }

    /// Validates the configuration and constructs a [`GraphGenerator`] on
    /// `device`.
    ///
    /// # Errors
    /// Returns configuration errors from [`GeneratorBuilder::build`] and
    /// propagates model allocation failures.
    pub fn build_generator(self, device: &Device) -> Result<GraphGenerator> {
        GraphGenerator::new(self.build()?, device)
    }
}

fn at_least(field: &'static str, minimum: usize, got: usize) -> core::result::Result<(), ConfigError> {
    if got < minimum {
        return Err(ConfigError::TooSmall {
            field,
            minimum,
            got,
        });
    }
    Ok(())
}

fn validate(config: &GeneratorConfig) -> core::result::Result<(), ConfigError> {
    if !(config.learning_rate.is_finite() && config.learning_rate > 0.0) {
        return Err(ConfigError::InvalidLearningRate {
            got: config.learning_rate,
        });
    }
    if !(0.0..1.0).contains(&config.dropout) {
        return Err(ConfigError::InvalidDropout {
            got: config.dropout,
        });
    }
    if !(config.lr_gamma > 0.0 && config.lr_gamma <= 1.0) {
        return Err(ConfigError::InvalidGamma {
            got: config.lr_gamma,
        });
    }
    if let EdgeReadout::GumbelHard { tau } = config.readout {
        if !(tau.is_finite() && tau > 0.0) {
            return Err(ConfigError::InvalidGumbelTau { got: tau });
        }
    }
    if !(0.0..=1.0).contains(&config.edge_threshold) {
        return Err(ConfigError::InvalidEdgeThreshold {
            got: config.edge_threshold,
        });
    }
    at_least("batch_size", 1, config.batch_size)?;
    at_least("epochs_autoencoder", 1, config.epochs_autoencoder)?;
    at_least("epochs_denoise", 1, config.epochs_denoise)?;
    at_least("hidden_dim_encoder", 1, config.hidden_dim_encoder)?;
    at_least("hidden_dim_decoder", 1, config.hidden_dim_decoder)?;
    at_least("latent_dim", 1, config.latent_dim)?;
    at_least("n_max", 2, config.n_max)?;
    at_least("n_layers_encoder", 1, config.n_layers_encoder)?;
    at_least("n_layers_decoder", 2, config.n_layers_decoder)?;
    at_least("spectral_dim", 1, config.spectral_dim)?;
    at_least("timesteps", 1, config.timesteps)?;
    at_least("hidden_dim_denoise", 4, config.hidden_dim_denoise)?;
    at_least("n_layers_denoise", 2, config.n_layers_denoise)?;
    at_least("dim_condition", 1, config.dim_condition)?;
    at_least("lr_step_size", 1, config.lr_step_size)?;
    if config.hidden_dim_denoise % 2 != 0 {
        return Err(ConfigError::OddTimeEmbedding {
            got: config.hidden_dim_denoise,
        });
    }
    Ok(())
}
