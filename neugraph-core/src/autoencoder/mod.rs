//! Latent graph autoencoders.
//!
//! Both variants share the [`LatentAutoencoder`] interface and are selected
//! once through [`build_autoencoder`]. Encoders are GIN-style message passing
//! networks pooled to one vector per graph; decoders map a latent vector to a
//! symmetric edge-probability matrix.

mod decoder;
mod encoder;
mod plain;
mod variational;

use std::fmt;

use candle_core::{Device, Tensor};
use candle_nn::{BatchNorm, ModuleT, VarMap};
use rand::RngCore;

pub use self::{
    decoder::EdgeReadout,
    plain::PlainAutoencoder,
    variational::VariationalAutoencoder,
};
use crate::{error::Result, sample::GraphBatch};

/// Whether a forward pass is part of an optimisation step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Dropout, reparameterised draws and batch statistics are active.
    Train,
    /// Deterministic inference using running statistics.
    Eval,
}

impl Phase {
    /// Returns `true` for [`Phase::Train`].
    #[must_use]
    pub const fn is_train(self) -> bool {
        matches!(self, Self::Train)
    }
}

/// Autoencoder variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AutoencoderKind {
    /// Deterministic encoder trained on reconstruction alone.
    Plain,
    /// Gaussian posterior encoder regularised towards a standard normal.
    Variational,
}

impl AutoencoderKind {
    /// Stable lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Variational => "variational",
        }
    }
}

impl fmt::Display for AutoencoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Architecture of an autoencoder.
#[derive(Clone, Debug, PartialEq)]
pub struct AutoencoderConfig {
    /// Node feature width produced by the canonicaliser.
    pub input_dim: usize,
    /// Hidden width of the GIN layers.
    pub hidden_dim_encoder: usize,
    /// Hidden width of the decoder MLP.
    pub hidden_dim_decoder: usize,
    /// Latent vector width.
    pub latent_dim: usize,
    /// Number of GIN layers.
    pub n_layers_encoder: usize,
    /// Number of linear layers in the decoder, at least two.
    pub n_layers_decoder: usize,
    /// Padded node capacity.
    pub n_max: usize,
    /// Dropout probability after each GIN layer while training.
    pub dropout: f32,
    /// Edge read-out used while training.
    pub readout: EdgeReadout,
    /// Weight of the KL term for the variational variant.
    pub kl_weight: f64,
}

/// Loss terms of one autoencoder forward pass, as scalar tensors.
#[derive(Clone, Debug)]
pub struct AutoencoderLoss {
    /// Objective minimised by the optimiser.
    pub total: Tensor,
    /// Mean absolute adjacency reconstruction error.
    pub reconstruction: Tensor,
    /// KL divergence from the prior, summed over latent dimensions and
    /// averaged over the graphs of the batch.
    pub kl: Option<Tensor>,
}

/// Shared interface of the plain and variational autoencoders.
pub trait LatentAutoencoder {
    /// Variant implemented by this model.
    fn kind(&self) -> AutoencoderKind;

    /// Architecture the model was built with.
    fn config(&self) -> &AutoencoderConfig;

    /// Trainable parameters and normalisation statistics.
    fn var_map(&self) -> &VarMap;

    /// Encodes every graph of `batch` into a `(graphs, latent_dim)` tensor.
    ///
    /// # Errors
    /// Propagates tensor failures.
    fn encode(&self, batch: &GraphBatch, phase: Phase, rng: &mut dyn RngCore) -> Result<Tensor>;

    /// Decodes `(graphs, latent_dim)` latents into `(graphs, n_max, n_max)`
    /// symmetric edge probabilities.
    ///
    /// # Errors
    /// Propagates tensor failures.
    fn decode(&self, latent: &Tensor) -> Result<Tensor>;

    /// Computes the training objective for `batch`.
    ///
    /// # Errors
    /// Propagates tensor failures.
    fn loss(
        &self,
        batch: &GraphBatch,
        phase: Phase,
        rng: &mut dyn RngCore,
    ) -> Result<AutoencoderLoss>;
}

/// Builds the selected autoencoder variant with fresh parameters.
///
/// # Errors
/// Propagates tensor allocation failures.
pub fn build_autoencoder(
    kind: AutoencoderKind,
    config: AutoencoderConfig,
    device: &Device,
) -> Result<Box<dyn LatentAutoencoder>> {
    Ok(match kind {
        AutoencoderKind::Plain => Box::new(PlainAutoencoder::new(config, device)?),
        AutoencoderKind::Variational => Box::new(VariationalAutoencoder::new(config, device)?),
    })
}

/// Mean absolute error between decoded and true adjacency.
pub(crate) fn reconstruction_loss(decoded: &Tensor, batch: &GraphBatch) -> Result<Tensor> {
    Ok((decoded - batch.adjacency())?.abs()?.mean_all()?)
}

/// Batch normalisation that falls back to running statistics for
/// single-row batches, whose variance is undefined.
pub(crate) fn normalize(norm: &BatchNorm, xs: &Tensor, phase: Phase) -> Result<Tensor> {
    let train = phase.is_train() && xs.dim(0)? > 1;
    Ok(norm.forward_t(xs, train)?)
}
