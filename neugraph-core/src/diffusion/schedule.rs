//! Precomputed noise schedule shared by training and sampling.

use candle_core::{Device, Tensor};

use super::error::{DiffusionError, ScheduleError};

/// Lower end of the default linear beta schedule.
pub const DEFAULT_BETA_START: f64 = 1e-4;
/// Upper end of the default linear beta schedule.
pub const DEFAULT_BETA_END: f64 = 0.02;

/// Per-timestep constants of the forward noising process.
///
/// Construction validates every timestep, so sampling never divides by a
/// vanishing `sqrt(1 - ᾱ_t)`.
///
/// # Examples
/// ```
/// use neugraph_core::DiffusionSchedule;
///
/// let schedule = DiffusionSchedule::linear(500, 1e-4, 0.02)?;
/// assert_eq!(schedule.timesteps(), 500);
/// let first = schedule.alpha_cumprod(0).unwrap_or_default();
/// let last = schedule.alpha_cumprod(499).unwrap_or_default();
/// assert!(0.0 < last && last < first && first <= 1.0);
/// # Ok::<(), neugraph_core::ScheduleError>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct DiffusionSchedule {
    betas: Vec<f64>,
    alphas_cumprod: Vec<f64>,
    sqrt_alphas_cumprod: Vec<f64>,
    sqrt_one_minus_alphas_cumprod: Vec<f64>,
    sqrt_recip_alphas: Vec<f64>,
    posterior_variance: Vec<f64>,
}

impl DiffusionSchedule {
    /// Builds `timesteps` betas evenly spaced from `beta_start` to `beta_end`.
    ///
    /// # Errors
    /// See [`DiffusionSchedule::from_betas`].
    pub fn linear(timesteps: usize, beta_start: f64, beta_end: f64) -> Result<Self, ScheduleError> {
        let betas = match timesteps {
            0 => Vec::new(),
            1 => vec![beta_start],
            _ => {
                let span = (timesteps - 1) as f64;
                (0..timesteps)
                    .map(|i| beta_start + (beta_end - beta_start) * (i as f64) / span)
                    .collect()
            }
        };
        Self::from_betas(betas)
    }

    /// Derives every schedule constant from explicit betas.
    ///
    /// # Errors
    /// Returns [`ScheduleError::Empty`] for no betas,
    /// [`ScheduleError::BetaOutOfRange`] for a beta outside `(0, 1)`, and
    /// [`ScheduleError::NoNoiseRemaining`] or
    /// [`ScheduleError::SignalOutOfRange`] when the cumulative product
    /// degenerates numerically.
    pub fn from_betas(betas: Vec<f64>) -> Result<Self, ScheduleError> {
        if betas.is_empty() {
            return Err(ScheduleError::Empty);
        }
        let mut alphas_cumprod = Vec::with_capacity(betas.len());
        let mut running = 1.0;
        for (t, &beta) in betas.iter().enumerate() {
            if !(beta > 0.0 && beta < 1.0) {
                return Err(ScheduleError::BetaOutOfRange { t, beta });
            }
            running *= 1.0 - beta;
            if !(running > 0.0 && running <= 1.0) {
                return Err(ScheduleError::SignalOutOfRange { t, value: running });
            }
            let remaining = 1.0 - running;
            if remaining <= 0.0 {
                return Err(ScheduleError::NoNoiseRemaining { t, remaining });
            }
            alphas_cumprod.push(running);
        }

        let alphas_cumprod_prev = std::iter::once(1.0).chain(alphas_cumprod.iter().copied());
        let posterior_variance = betas
            .iter()
            .zip(alphas_cumprod_prev)
            .zip(&alphas_cumprod)
            .map(|((beta, prev), current)| beta * (1.0 - prev) / (1.0 - current))
            .collect();
        Ok(Self {
            sqrt_alphas_cumprod: alphas_cumprod.iter().map(|a| a.sqrt()).collect(),
            sqrt_one_minus_alphas_cumprod: alphas_cumprod.iter().map(|a| (1.0 - a).sqrt()).collect(),
            sqrt_recip_alphas: betas.iter().map(|b| (1.0 - b).sqrt().recip()).collect(),
            posterior_variance,
            alphas_cumprod,
            betas,
        })
    }

    /// Schedule length `T`.
    #[must_use]
    pub fn timesteps(&self) -> usize {
        self.betas.len()
    }

    /// Noise level `beta_t`.
    #[must_use]
    pub fn beta(&self, t: usize) -> Option<f64> {
        self.betas.get(t).copied()
    }

    /// Cumulative signal fraction `ᾱ_t`.
    #[must_use]
    pub fn alpha_cumprod(&self, t: usize) -> Option<f64> {
        self.alphas_cumprod.get(t).copied()
    }

    /// Variance of `q(x_{t-1} | x_t, x_0)`; zero at `t = 0`.
    #[must_use]
    pub fn posterior_variance(&self, t: usize) -> Option<f64> {
        self.posterior_variance.get(t).copied()
    }

    pub(crate) fn check(&self, t: usize) -> Result<(), DiffusionError> {
        if t < self.timesteps() {
            Ok(())
        } else {
            Err(DiffusionError::InvalidTimestep {
                t,
                timesteps: self.timesteps(),
            })
        }
    }

    /// Constants used by one reverse step at `t`.
    pub(crate) fn step_constants(&self, t: usize) -> Result<StepConstants, DiffusionError> {
        self.check(t)?;
        let get = |values: &[f64]| values.get(t).copied().unwrap_or_default();
        Ok(StepConstants {
            beta: get(&self.betas),
            sqrt_one_minus_alpha_cumprod: get(&self.sqrt_one_minus_alphas_cumprod),
            sqrt_recip_alpha: get(&self.sqrt_recip_alphas),
            posterior_variance: get(&self.posterior_variance),
        })
    }

    /// Gathers `sqrt(ᾱ_t)` and `sqrt(1 - ᾱ_t)` per row as `(rows, 1)` columns.
    pub(crate) fn noising_columns(
        &self,
        timesteps: &[u32],
        device: &Device,
    ) -> crate::error::Result<(Tensor, Tensor)> {
        let mut signal = Vec::with_capacity(timesteps.len());
        let mut noise = Vec::with_capacity(timesteps.len());
        for &t in timesteps {
            let t = t as usize;
            self.check(t)?;
            signal.push(self.sqrt_alphas_cumprod.get(t).copied().unwrap_or_default() as f32);
            noise.push(
                self.sqrt_one_minus_alphas_cumprod
                    .get(t)
                    .copied()
                    .unwrap_or_default() as f32,
            );
        }
        let rows = timesteps.len();
        Ok((
            Tensor::from_vec(signal, (rows, 1), device)?,
            Tensor::from_vec(noise, (rows, 1), device)?,
        ))
    }
}

/// Scalars needed by one reverse step.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StepConstants {
    pub(crate) beta: f64,
    pub(crate) sqrt_one_minus_alpha_cumprod: f64,
    pub(crate) sqrt_recip_alpha: f64,
    pub(crate) posterior_variance: f64,
}
