//! Forward noising, the denoising objective and ancestral sampling.

use candle_core::{DType, Tensor};
use rand::RngCore;
use tracing::{debug, instrument};

use super::{denoiser::NoisePredictor, schedule::DiffusionSchedule};
use crate::{
    autoencoder::Phase,
    error::{NeugraphError, Result},
    noise::{standard_normal, uniform_timesteps},
};

/// Noises clean latents: `sqrt(ᾱ_t)·x0 + sqrt(1 - ᾱ_t)·ε`, with one timestep
/// per row.
///
/// # Errors
/// Returns [`super::DiffusionError::InvalidTimestep`] (wrapped) for any
/// timestep outside the schedule and propagates tensor failures.
pub fn q_sample(
    schedule: &DiffusionSchedule,
    x0: &Tensor,
    timesteps: &[u32],
    noise: &Tensor,
) -> Result<Tensor> {
    let rows = x0.dim(0)?;
    if timesteps.len() != rows {
        return Err(NeugraphError::ShapeMismatch {
            context: "timesteps per latent",
            expected: rows,
            actual: timesteps.len(),
        });
    }
    let (signal, spread) = schedule.noising_columns(timesteps, x0.device())?;
    let signal = signal.to_dtype(x0.dtype())?;
    let spread = spread.to_dtype(x0.dtype())?;
    Ok((x0.broadcast_mul(&signal)? + noise.broadcast_mul(&spread)?)?)
}

/// Smooth L1 (Huber, `δ = 1`) loss averaged over every element.
pub(crate) fn huber_loss(prediction: &Tensor, target: &Tensor) -> Result<Tensor> {
    let diff = (prediction - target)?.abs()?;
    let quadratic = diff.minimum(1.0)?;
    let linear = (&diff - &quadratic)?;
    let loss = ((quadratic.sqr()? * 0.5)? + linear)?;
    Ok(loss.mean_all()?)
}

/// Denoising objective for one batch of clean latents.
///
/// Draws one timestep per row uniformly from `[0, T)` and fresh Gaussian
/// noise, then scores the predictor's noise estimate with a Huber loss.
///
/// # Errors
/// Propagates tensor failures.
pub fn denoising_loss(
    predictor: &dyn NoisePredictor,
    schedule: &DiffusionSchedule,
    x0: &Tensor,
    stats: &Tensor,
    phase: Phase,
    rng: &mut dyn RngCore,
) -> Result<Tensor> {
    let rows = x0.dim(0)?;
    let timesteps = uniform_timesteps(rng, rows, schedule.timesteps());
    let noise = standard_normal(rng, x0.shape(), x0.device())?.to_dtype(x0.dtype())?;
    let noisy = q_sample(schedule, x0, &timesteps, &noise)?;
    let t = Tensor::from_vec(timesteps, rows, x0.device())?;
    let predicted = predictor.predict_noise(&noisy, &t, stats, phase)?;
    huber_loss(&predicted, &noise)
}

/// Mean of `p(x_{t-1} | x_t)`:
/// `sqrt(1/α_t)·(x_t - β_t·ε̂ / sqrt(1 - ᾱ_t))`.
///
/// # Errors
/// Returns [`super::DiffusionError::InvalidTimestep`] (wrapped) when
/// `t >= T` and propagates tensor failures.
pub fn posterior_mean(
    predictor: &dyn NoisePredictor,
    schedule: &DiffusionSchedule,
    x: &Tensor,
    t: usize,
    stats: &Tensor,
) -> Result<Tensor> {
    let constants = schedule.step_constants(t)?;
    let rows = x.dim(0)?;
    let step = u32::try_from(t).unwrap_or(u32::MAX);
    let timesteps = Tensor::from_vec(vec![step; rows], rows, x.device())?;
    let predicted = predictor.predict_noise(x, &timesteps, stats, Phase::Eval)?;
    let scaled = (predicted * (constants.beta / constants.sqrt_one_minus_alpha_cumprod))?;
    Ok(((x - scaled)? * constants.sqrt_recip_alpha)?)
}

/// One reverse step from `x_t` to `x_{t-1}`.
///
/// At `t = 0` the posterior mean is returned unchanged; otherwise Gaussian
/// noise scaled by the posterior standard deviation is added.
///
/// # Errors
/// Returns [`super::DiffusionError::InvalidTimestep`] (wrapped) when
/// `t >= T` and propagates tensor failures.
pub fn reverse_step(
    predictor: &dyn NoisePredictor,
    schedule: &DiffusionSchedule,
    x: &Tensor,
    t: usize,
    stats: &Tensor,
    rng: &mut dyn RngCore,
) -> Result<Tensor> {
    let mean = posterior_mean(predictor, schedule, x, t, stats)?;
    if t == 0 {
        return Ok(mean);
    }
    let variance = schedule.posterior_variance(t).unwrap_or_default();
    let noise = standard_normal(rng, x.shape(), x.device())?.to_dtype(x.dtype())?;
    Ok((mean + (noise * variance.sqrt())?)?)
}

/// Ancestral sampling: starts from `x_T ~ N(0, I)` with one row per
/// conditioning vector and applies [`reverse_step`] for `t = T-1 … 0`.
///
/// # Errors
/// Propagates tensor failures.
#[instrument(
    name = "core.diffusion.sample",
    level = "debug",
    err,
    skip(predictor, schedule, stats, rng),
    fields(rows = stats.dims().first().copied().unwrap_or(0), timesteps = schedule.timesteps()),
)]
pub fn sample_loop(
    predictor: &dyn NoisePredictor,
    schedule: &DiffusionSchedule,
    stats: &Tensor,
    rng: &mut dyn RngCore,
) -> Result<Tensor> {
    let rows = stats.dim(0)?;
    let x = standard_normal(rng, (rows, predictor.latent_dim()), stats.device())?
        .to_dtype(DType::F32)?;
    let x = reverse_process(
        predictor,
        schedule,
        &x,
        schedule.timesteps().saturating_sub(1),
        stats,
        rng,
    )?;
    debug!(rows, "sampling finished");
    Ok(x)
}

/// Applies [`reverse_step`] for `t = from … 0`, denoising a latent that was
/// noised to timestep `from`.
///
/// # Errors
/// Returns [`super::DiffusionError::InvalidTimestep`] (wrapped) when
/// `from >= T` and propagates tensor failures.
pub fn reverse_process(
    predictor: &dyn NoisePredictor,
    schedule: &DiffusionSchedule,
    x: &Tensor,
    from: usize,
    stats: &Tensor,
    rng: &mut dyn RngCore,
) -> Result<Tensor> {
    let mut x = x.clone();
    for t in (0..=from).rev() {
        x = reverse_step(predictor, schedule, &x, t, stats, rng)?;
    }
    Ok(x)
}
