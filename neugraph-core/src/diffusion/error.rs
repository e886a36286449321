//! Error types for the diffusion schedule and sampler.

use thiserror::Error;

use crate::error::define_error_codes;

/// Errors raised while constructing a [`super::DiffusionSchedule`].
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ScheduleError {
    /// A schedule needs at least one timestep.
    #[error("diffusion schedule needs at least one timestep")]
    Empty,
    /// A noise level fell outside `(0, 1)`.
    #[error("beta at timestep {t} is {beta}, expected a value in (0, 1)")]
    BetaOutOfRange {
        /// Offending timestep.
        t: usize,
        /// Offending noise level.
        beta: f64,
    },
    /// The remaining-noise term `1 - ᾱ_t` was not positive.
    #[error("1 - alpha_cumprod at timestep {t} is {remaining}, expected a positive value")]
    NoNoiseRemaining {
        /// Offending timestep.
        t: usize,
        /// Value of `1 - ᾱ_t`.
        remaining: f64,
    },
    /// The cumulative signal fraction `ᾱ_t` left `(0, 1]`.
    #[error("alpha_cumprod at timestep {t} is {value}, expected a value in (0, 1]")]
    SignalOutOfRange {
        /// Offending timestep.
        t: usize,
        /// Value of `ᾱ_t`.
        value: f64,
    },
}

define_error_codes! {
    /// Stable codes describing [`ScheduleError`] variants.
    enum ScheduleErrorCode for ScheduleError {
        /// A schedule needs at least one timestep.
        Empty => Empty => "SCHEDULE_EMPTY",
        /// A noise level fell outside `(0, 1)`.
        BetaOutOfRange => BetaOutOfRange { .. } => "SCHEDULE_BETA_OUT_OF_RANGE",
        /// The remaining-noise term was not positive.
        NoNoiseRemaining => NoNoiseRemaining { .. } => "SCHEDULE_NO_NOISE_REMAINING",
        /// The cumulative signal fraction left `(0, 1]`.
        SignalOutOfRange => SignalOutOfRange { .. } => "SCHEDULE_SIGNAL_OUT_OF_RANGE",
    }
}

/// Errors raised by diffusion steps.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum DiffusionError {
    /// A timestep outside `[0, T)` was requested.
    #[error("timestep {t} is outside [0, {timesteps})")]
    InvalidTimestep {
        /// Requested timestep.
        t: usize,
        /// Schedule length `T`.
        timesteps: usize,
    },
}

define_error_codes! {
    /// Stable codes describing [`DiffusionError`] variants.
    enum DiffusionErrorCode for DiffusionError {
        /// A timestep outside `[0, T)` was requested.
        InvalidTimestep => InvalidTimestep { .. } => "DIFFUSION_INVALID_TIMESTEP",
    }
}
