use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder, VarMap, linear};
use rand::RngCore;

use super::{
    AutoencoderConfig, AutoencoderKind, AutoencoderLoss, EdgeReadout, LatentAutoencoder, Phase,
    decoder::EdgeDecoder, encoder::GinEncoder, reconstruction_loss,
};
use crate::{error::Result, noise::standard_normal, sample::GraphBatch};

/// Autoencoder with a diagonal Gaussian posterior over latents.
///
/// Training draws `z = μ + exp(½·logσ²)·ε`; evaluation returns `μ`.
pub struct VariationalAutoencoder {
    config: AutoencoderConfig,
    var_map: VarMap,
    encoder: GinEncoder,
    mu: Linear,
    logvar: Linear,
    decoder: EdgeDecoder,
}

impl VariationalAutoencoder {
    /// Builds a model with freshly initialised parameters.
    ///
    /// # Errors
    /// Propagates tensor allocation failures.
    pub fn new(config: AutoencoderConfig, device: &Device) -> Result<Self> {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, device);
        let encoder = GinEncoder::new(
            config.input_dim,
            config.hidden_dim_encoder,
            config.hidden_dim_encoder,
            config.n_layers_encoder,
            config.dropout,
            &vb.pp("encoder"),
        )?;
        let mu = linear(config.hidden_dim_encoder, config.latent_dim, vb.pp("fc_mu"))?;
        let logvar = linear(
            config.hidden_dim_encoder,
            config.latent_dim,
            vb.pp("fc_logvar"),
        )?;
        let decoder = EdgeDecoder::new(
            config.latent_dim,
            config.hidden_dim_decoder,
            config.n_layers_decoder,
            config.n_max,
            &vb.pp("decoder"),
            device,
        )?;
        Ok(Self {
            config,
            var_map,
            encoder,
            mu,
            logvar,
            decoder,
        })
    }

    fn posterior(
        &self,
        batch: &GraphBatch,
        phase: Phase,
        rng: &mut dyn RngCore,
    ) -> Result<(Tensor, Tensor)> {
        let pooled = self.encoder.forward(batch, phase, rng)?;
        Ok((self.mu.forward(&pooled)?, self.logvar.forward(&pooled)?))
    }

    fn reparameterize(
        mu: &Tensor,
        logvar: &Tensor,
        phase: Phase,
        rng: &mut dyn RngCore,
    ) -> Result<Tensor> {
        if !phase.is_train() {
            return Ok(mu.clone());
        }
        let std = (logvar * 0.5)?.exp()?;
        let eps = standard_normal(rng, mu.shape(), mu.device())?;
        Ok((mu + (eps * std)?)?)
    }
}

impl LatentAutoencoder for VariationalAutoencoder {
    fn kind(&self) -> AutoencoderKind {
        AutoencoderKind::Variational
    }

    fn config(&self) -> &AutoencoderConfig {
        &self.config
    }

    fn var_map(&self) -> &VarMap {
        &self.var_map
    }

    fn encode(&self, batch: &GraphBatch, phase: Phase, rng: &mut dyn RngCore) -> Result<Tensor> {
        let (mu, logvar) = self.posterior(batch, phase, rng)?;
        Self::reparameterize(&mu, &logvar, phase, rng)
    }

    fn decode(&self, latent: &Tensor) -> Result<Tensor> {
        self.decoder.probabilities(latent)
    }

    fn loss(
        &self,
        batch: &GraphBatch,
        phase: Phase,
        rng: &mut dyn RngCore,
    ) -> Result<AutoencoderLoss> {
        let (mu, logvar) = self.posterior(batch, phase, rng)?;
        let latent = Self::reparameterize(&mu, &logvar, phase, rng)?;
        let readout = if phase.is_train() {
            self.config.readout
        } else {
            EdgeReadout::Probabilities
        };
        let decoded = self.decoder.decode(&latent, readout, rng)?;
        let reconstruction = reconstruction_loss(&decoded, batch)?;
        // KL(N(μ, σ²) ‖ N(0, 1)) = -½ Σ (1 + logσ² − μ² − σ²), summed per graph,
        // averaged over the batch.
        let kl = ((((&logvar + 1.0)? - mu.sqr()?)? - logvar.exp()?)?
            .sum(1)?
            .mean_all()?
            * -0.5)?;
        let total = (&reconstruction + (&kl * self.config.kl_weight)?)?;
        Ok(AutoencoderLoss {
            total,
            reconstruction,
            kl: Some(kl),
        })
    }
}
