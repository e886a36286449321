//! Host-side random draws turned into tensors.
//!
//! Every stochastic step takes its randomness from a caller-supplied
//! [`RngCore`], so seeded runs are reproducible on any device.

use candle_core::{Device, Shape, Tensor};
use rand::{Rng, RngCore};
use rand_distr::{Distribution, StandardNormal};

use crate::error::Result;

/// Draws a tensor of independent standard-normal values.
///
/// # Errors
/// Propagates tensor allocation failures.
///
/// # Examples
/// ```
/// use candle_core::Device;
/// use neugraph_core::standard_normal;
/// use rand::{SeedableRng, rngs::SmallRng};
///
/// let mut rng = SmallRng::seed_from_u64(7);
/// let noise = standard_normal(&mut rng, (2, 3), &Device::Cpu)?;
/// assert_eq!(noise.dims(), &[2, 3]);
/// # Ok::<(), neugraph_core::NeugraphError>(())
/// ```
pub fn standard_normal<S: Into<Shape>>(
    rng: &mut dyn RngCore,
    shape: S,
    device: &Device,
) -> Result<Tensor> {
    let shape = shape.into();
    let values: Vec<f32> = (0..shape.elem_count())
        .map(|_| StandardNormal.sample(rng))
        .collect();
    Ok(Tensor::from_vec(values, shape, device)?)
}

/// Draws one timestep index in `[0, timesteps)` per row.
pub(crate) fn uniform_timesteps(
    rng: &mut dyn RngCore,
    rows: usize,
    timesteps: usize,
) -> Vec<u32> {
    (0..rows)
        .map(|_| rng.gen_range(0..timesteps) as u32)
        .collect()
}

/// Applies inverted dropout with drop probability `p`.
pub(crate) fn dropout(rng: &mut dyn RngCore, xs: &Tensor, p: f32) -> Result<Tensor> {
    if p <= 0.0 {
        return Ok(xs.clone());
    }
    let keep = 1.0 - p;
    let mask: Vec<f32> = (0..xs.elem_count())
        .map(|_| {
            if rng.r#gen::<f32>() < keep {
                keep.recip()
            } else {
                0.0
            }
        })
        .collect();
    let mask = Tensor::from_vec(mask, xs.shape(), xs.device())?;
    Ok(xs.mul(&mask)?)
}

/// Draws standard Gumbel noise `-ln(-ln(u))`.
pub(crate) fn gumbel<S: Into<Shape>>(
    rng: &mut dyn RngCore,
    shape: S,
    device: &Device,
) -> Result<Tensor> {
    let shape = shape.into();
    let values: Vec<f32> = (0..shape.elem_count())
        .map(|_| {
            let u: f32 = rng.gen_range(f32::EPSILON..1.0);
            -(-u.ln()).ln()
        })
        .collect();
    Ok(Tensor::from_vec(values, shape, device)?)
}
