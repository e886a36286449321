//! Adam optimiser with named, checkpointable state and a step-decay
//! learning-rate schedule.

use std::{collections::BTreeMap, sync::PoisonError};

use candle_core::{Tensor, Var, backprop::GradStore};
use candle_nn::VarMap;

use crate::error::Result;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPS: f64 = 1e-8;

/// Moment estimates for one parameter.
#[derive(Clone, Debug)]
pub(crate) struct Moments {
    pub(crate) first: Tensor,
    pub(crate) second: Tensor,
}

/// Adam without weight decay, parameters addressed by their [`VarMap`] names.
///
/// Every variable of the map is tracked; variables that receive no gradient
/// (normalisation running statistics) are left untouched.
#[derive(Debug)]
pub struct Adam {
    params: BTreeMap<String, (Var, Moments)>,
    learning_rate: f64,
    step: u32,
}

impl Adam {
    /// Tracks every variable currently registered in `var_map`.
    ///
    /// # Errors
    /// Propagates tensor allocation failures.
    pub fn new(var_map: &VarMap, learning_rate: f64) -> Result<Self> {
        let vars = var_map
            .data()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut params = BTreeMap::new();
        for (name, var) in vars {
            let moments = Moments {
                first: var.zeros_like()?,
                second: var.zeros_like()?,
            };
            params.insert(name, (var, moments));
        }
        Ok(Self {
            params,
            learning_rate,
            step: 0,
        })
    }

    /// Back-propagates `loss` and applies one update.
    ///
    /// # Errors
    /// Propagates tensor failures.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = loss.backward()?;
        self.step(&grads)
    }

    /// Applies one update from precomputed gradients.
    ///
    /// # Errors
    /// Propagates tensor failures.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.step += 1;
        let t = i32::try_from(self.step).unwrap_or(i32::MAX);
        let bias1 = 1.0 - BETA1.powi(t);
        let bias2 = 1.0 - BETA2.powi(t);
        for (var, moments) in self.params.values_mut() {
            let Some(grad) = grads.get(var) else {
                continue;
            };
            let first = ((&moments.first * BETA1)? + (grad * (1.0 - BETA1))?)?.detach();
            let second = ((&moments.second * BETA2)? + (grad.sqr()? * (1.0 - BETA2))?)?.detach();
            let denom = ((&second / bias2)?.sqrt()? + EPS)?;
            let update = ((&first / bias1)? / denom)?;
            var.set(&(var.as_tensor() - (update * self.learning_rate)?)?.detach())?;
            moments.first = first;
            moments.second = second;
        }
        Ok(())
    }

    /// Current learning rate.
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Overrides the learning rate.
    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    /// Number of updates applied so far.
    #[must_use]
    pub fn step_count(&self) -> u32 {
        self.step
    }

    pub(crate) fn set_step_count(&mut self, step: u32) {
        self.step = step;
    }

    /// Moment tensors keyed by parameter name.
    pub(crate) fn moments(&self) -> impl Iterator<Item = (&str, &Moments)> {
        self.params
            .iter()
            .map(|(name, (_, moments))| (name.as_str(), moments))
    }

    pub(crate) fn moments_mut(&mut self) -> impl Iterator<Item = (&str, &mut Moments)> {
        self.params
            .iter_mut()
            .map(|(name, (_, moments))| (name.as_str(), moments))
    }
}

/// Multiplies the learning rate by `gamma` every `step_size` epochs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepLr {
    base_lr: f64,
    step_size: usize,
    gamma: f64,
    epoch: usize,
}

impl StepLr {
    /// Creates a schedule starting from `base_lr`.
    #[must_use]
    pub fn new(base_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
            epoch: 0,
        }
    }

    /// Advances one epoch and writes the resulting rate into `optimizer`.
    pub fn step(&mut self, optimizer: &mut Adam) {
        self.epoch += 1;
        let decays = i32::try_from(self.epoch / self.step_size).unwrap_or(i32::MAX);
        optimizer.set_learning_rate(self.base_lr * self.gamma.powi(decays));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{Init, VarBuilder};
    use rstest::rstest;

    #[rstest]
    fn adam_minimises_a_quadratic() {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, &Device::Cpu);
        let x = vb
            .get_with_hints(2, "x", Init::Const(3.0))
            .expect("variable");
        let mut adam = Adam::new(&var_map, 0.1).expect("optimiser");
        for _ in 0..300 {
            let loss = x.sqr().and_then(|t| t.sum_all()).expect("loss");
            adam.backward_step(&loss).expect("step");
        }
        let values = x.to_vec1::<f32>().expect("values");
        assert!(values.iter().all(|v| v.abs() < 0.1), "{values:?}");
        assert_eq!(adam.step_count(), 300);
    }

    #[rstest]
    #[case(1, 1e-3)]
    #[case(499, 1e-3)]
    #[case(500, 1e-4)]
    #[case(1000, 1e-5)]
    fn step_lr_decays_every_step_size(#[case] epochs: usize, #[case] expected: f64) {
        let var_map = VarMap::new();
        let mut adam = Adam::new(&var_map, 1e-3).expect("optimiser");
        let mut schedule = StepLr::new(1e-3, 500, 0.1);
        for _ in 0..epochs {
            schedule.step(&mut adam);
        }
        assert!((adam.learning_rate() - expected).abs() < 1e-12);
    }
}
