//! Latent denoising diffusion conditioned on graph statistics.
//!
//! The [`DiffusionSchedule`] fixes the forward noising process; a
//! [`NoisePredictor`] learns to undo it, and [`sample_loop`] draws fresh
//! latents by running the reverse process from pure noise.

mod denoiser;
mod error;
mod process;
mod schedule;

pub use self::{
    denoiser::{DenoiseNetwork, DenoiserConfig, MISSING_STAT, NoisePredictor},
    error::{DiffusionError, DiffusionErrorCode, ScheduleError, ScheduleErrorCode},
    process::{
        denoising_loss, posterior_mean, q_sample, reverse_process, reverse_step, sample_loop,
    },
    schedule::{DEFAULT_BETA_END, DEFAULT_BETA_START, DiffusionSchedule},
};

#[cfg(test)]
mod tests;
