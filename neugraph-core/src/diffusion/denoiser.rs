//! Conditional noise-prediction network over latent vectors.

use candle_core::{DType, Device, Tensor};
use candle_nn::{BatchNorm, Linear, Module, VarBuilder, VarMap, batch_norm, linear};

use crate::{
    autoencoder::{Phase, normalize},
    error::{NeugraphError, Result},
    sample::STATS_DIM,
};

/// Replacement for missing (NaN) conditioning statistics.
pub const MISSING_STAT: f64 = -100.0;

const NORM_EPS: f64 = 1e-5;

/// Predicts the noise that was added to a latent, given its timestep and
/// conditioning statistics.
pub trait NoisePredictor {
    /// Width of the latent vectors the predictor operates on.
    fn latent_dim(&self) -> usize;

    /// Returns `(rows, latent_dim)` predicted noise.
    ///
    /// `timesteps` is a `(rows,)` `u32` tensor; `stats` is
    /// `(rows, STATS_DIM)`.
    ///
    /// # Errors
    /// Propagates tensor failures.
    fn predict_noise(
        &self,
        noisy: &Tensor,
        timesteps: &Tensor,
        stats: &Tensor,
        phase: Phase,
    ) -> Result<Tensor>;
}

/// Architecture of a [`DenoiseNetwork`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DenoiserConfig {
    /// Latent vector width.
    pub latent_dim: usize,
    /// Hidden width, also the time-embedding width; even and at least 4.
    pub hidden_dim: usize,
    /// Number of linear layers in the residual stack, at least two.
    pub n_layers: usize,
    /// Width of the embedded conditioning vector.
    pub condition_dim: usize,
}

/// MLP denoiser conditioned on a sinusoidal time embedding and an embedded
/// statistics vector.
pub struct DenoiseNetwork {
    config: DenoiserConfig,
    var_map: VarMap,
    condition: (Linear, Linear),
    time: (Linear, Linear),
    layers: Vec<Linear>,
    norms: Vec<BatchNorm>,
    output: Linear,
}

impl DenoiseNetwork {
    /// Builds a network with freshly initialised parameters.
    ///
    /// # Errors
    /// Propagates tensor allocation failures.
    pub fn new(config: DenoiserConfig, device: &Device) -> Result<Self> {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, device);
        let DenoiserConfig {
            latent_dim,
            hidden_dim,
            n_layers,
            condition_dim,
        } = config;

        let condition = (
            linear(STATS_DIM, condition_dim, vb.pp("cond_mlp.0"))?,
            linear(condition_dim, condition_dim, vb.pp("cond_mlp.1"))?,
        );
        let time = (
            linear(hidden_dim, hidden_dim, vb.pp("time_mlp.0"))?,
            linear(hidden_dim, hidden_dim, vb.pp("time_mlp.1"))?,
        );
        let hidden_layers = n_layers.saturating_sub(1);
        let mut layers = Vec::with_capacity(hidden_layers);
        let mut norms = Vec::with_capacity(hidden_layers);
        for index in 0..hidden_layers {
            let input = if index == 0 { latent_dim } else { hidden_dim };
            layers.push(linear(
                input + condition_dim,
                hidden_dim,
                vb.pp(format!("mlp.{index}")),
            )?);
            norms.push(batch_norm(hidden_dim, NORM_EPS, vb.pp(format!("bn.{index}")))?);
        }
        let output = linear(hidden_dim, latent_dim, vb.pp("output"))?;
        Ok(Self {
            config,
            var_map,
            condition,
            time,
            layers,
            norms,
            output,
        })
    }

    /// Architecture the network was built with.
    #[must_use]
    pub fn config(&self) -> &DenoiserConfig {
        &self.config
    }

    /// Trainable parameters and normalisation statistics.
    #[must_use]
    pub fn var_map(&self) -> &VarMap {
        &self.var_map
    }

    fn embed_condition(&self, stats: &Tensor) -> Result<Tensor> {
        if stats.dim(1)? != STATS_DIM {
            return Err(NeugraphError::ShapeMismatch {
                context: "conditioning width",
                expected: STATS_DIM,
                actual: stats.dim(1)?,
            });
        }
        let missing = stats.ne(stats)?;
        let filled = missing.where_cond(&stats.ones_like()?.affine(0.0, MISSING_STAT)?, stats)?;
        let hidden = self.condition.0.forward(&filled)?.relu()?;
        Ok(self.condition.1.forward(&hidden)?)
    }

    fn embed_time(&self, timesteps: &Tensor) -> Result<Tensor> {
        let embedding = sinusoidal_embedding(timesteps, self.config.hidden_dim)?;
        let hidden = self.time.0.forward(&embedding)?.gelu_erf()?;
        Ok(self.time.1.forward(&hidden)?)
    }
}

impl NoisePredictor for DenoiseNetwork {
    fn latent_dim(&self) -> usize {
        self.config.latent_dim
    }

    fn predict_noise(
        &self,
        noisy: &Tensor,
        timesteps: &Tensor,
        stats: &Tensor,
        phase: Phase,
    ) -> Result<Tensor> {
        let condition = self.embed_condition(stats)?;
        let time = self.embed_time(timesteps)?;
        let mut xs = noisy.clone();
        for (layer, norm) in self.layers.iter().zip(&self.norms) {
            let joined = Tensor::cat(&[&xs, &condition], 1)?;
            let hidden = (layer.forward(&joined)?.relu()? + &time)?;
            xs = normalize(norm, &hidden, phase)?;
        }
        Ok(self.output.forward(&xs)?)
    }
}

/// Transformer-style sinusoidal embedding of integer timesteps.
///
/// Row `i` is `[sin(t_i·f_0) … sin(t_i·f_{h-1}), cos(t_i·f_0) … cos(t_i·f_{h-1})]`
/// with `h = dim / 2` and `f_k = exp(-k · ln(10000) / (h - 1))`.
pub(crate) fn sinusoidal_embedding(timesteps: &Tensor, dim: usize) -> Result<Tensor> {
    let half = dim / 2;
    let scale = 10_000_f64.ln() / (half.saturating_sub(1).max(1)) as f64;
    let freqs: Vec<f32> = (0..half)
        .map(|k| (-(k as f64) * scale).exp() as f32)
        .collect();
    let device = timesteps.device();
    let freqs = Tensor::from_vec(freqs, (1, half), device)?;
    let times = timesteps.to_dtype(DType::F32)?.unsqueeze(1)?;
    let args = times.broadcast_mul(&freqs)?;
    Ok(Tensor::cat(&[&args.sin()?, &args.cos()?], 1)?)
}
