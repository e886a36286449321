use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use rand::RngCore;

use super::{
    AutoencoderConfig, AutoencoderKind, AutoencoderLoss, EdgeReadout, LatentAutoencoder, Phase,
    decoder::EdgeDecoder, encoder::GinEncoder, reconstruction_loss,
};
use crate::{error::Result, sample::GraphBatch};

/// Autoencoder whose encoder projects straight to the latent space.
pub struct PlainAutoencoder {
    config: AutoencoderConfig,
    var_map: VarMap,
    encoder: GinEncoder,
    decoder: EdgeDecoder,
}

impl PlainAutoencoder {
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
            config.latent_dim,
            config.n_layers_encoder,
            config.dropout,
            &vb.pp("encoder"),
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
            decoder,
        })
    }
}

impl LatentAutoencoder for PlainAutoencoder {
    fn kind(&self) -> AutoencoderKind {
        AutoencoderKind::Plain
    }

    fn config(&self) -> &AutoencoderConfig {
        &self.config
    }

    fn var_map(&self) -> &VarMap {
        &self.var_map
    }

    fn encode(&self, batch: &GraphBatch, phase: Phase, rng: &mut dyn RngCore) -> Result<Tensor> {
        self.encoder.forward(batch, phase, rng)
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
        let latent = self.encoder.forward(batch, phase, rng)?;
        let readout = if phase.is_train() {
            self.config.readout
        } else {
            EdgeReadout::Probabilities
        };
        let decoded = self.decoder.decode(&latent, readout, rng)?;
        let reconstruction = reconstruction_loss(&decoded, batch)?;
        Ok(AutoencoderLoss {
            total: reconstruction.clone(),
            reconstruction,
            kl: None,
        })
    }
}
