//! Safetensors checkpoints holding model parameters and optimiser state.
//!
//! One file per model. Keys are `model/<var>`, `adam/m/<var>`,
//! `adam/v/<var>`, plus the scalars `adam/step` and `adam/lr`.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, PoisonError},
};

use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use tracing::{info, instrument};

use crate::{error::CheckpointError, optim::Adam};

const MODEL_PREFIX: &str = "model/";
const FIRST_PREFIX: &str = "adam/m/";
const SECOND_PREFIX: &str = "adam/v/";
const STEP_KEY: &str = "adam/step";
const LR_KEY: &str = "adam/lr";

type CheckpointResult<T> = core::result::Result<T, CheckpointError>;

fn io_error(path: &Path) -> impl FnOnce(candle_core::Error) -> CheckpointError + '_ {
    move |error| CheckpointError::Io {
        path: path.to_path_buf(),
        error: Arc::new(error),
    }
}

/// Writes the parameters in `var_map` and the state of `optimizer` to `path`.
///
/// # Errors
/// Returns [`CheckpointError::Io`] when serialisation or the write fails.
#[instrument(name = "core.checkpoint.save", err, skip(var_map, optimizer), fields(path = %path.display()))]
pub fn save_checkpoint(path: &Path, var_map: &VarMap, optimizer: &Adam) -> CheckpointResult<()> {
    let mut tensors: HashMap<String, Tensor> = HashMap::new();
    {
        let vars = var_map.data().lock().unwrap_or_else(PoisonError::into_inner);
        for (name, var) in vars.iter() {
            tensors.insert(format!("{MODEL_PREFIX}{name}"), var.as_tensor().clone());
        }
    }
    for (name, moments) in optimizer.moments() {
        tensors.insert(format!("{FIRST_PREFIX}{name}"), moments.first.clone());
        tensors.insert(format!("{SECOND_PREFIX}{name}"), moments.second.clone());
    }
    let device = Device::Cpu;
    tensors.insert(
        STEP_KEY.to_owned(),
        Tensor::new(&[optimizer.step_count()], &device).map_err(io_error(path))?,
    );
    tensors.insert(
        LR_KEY.to_owned(),
        Tensor::new(&[optimizer.learning_rate()], &device).map_err(io_error(path))?,
    );
    candle_core::safetensors::save(&tensors, path).map_err(io_error(path))?;
    info!(tensors = tensors.len(), "checkpoint written");
    Ok(())
}

/// Restores parameters and optimiser state from `path`.
///
/// Every variable of `var_map` must be present with a matching shape.
///
/// # Errors
/// Returns [`CheckpointError::Missing`] when `path` does not exist,
/// [`CheckpointError::MissingTensor`] or [`CheckpointError::ShapeMismatch`]
/// when the file does not describe this model, and [`CheckpointError::Io`]
/// when reading fails.
#[instrument(name = "core.checkpoint.load", err, skip(var_map, optimizer), fields(path = %path.display()))]
pub fn load_checkpoint(
    path: &Path,
    var_map: &VarMap,
    optimizer: &mut Adam,
) -> CheckpointResult<()> {
    if !path.is_file() {
        return Err(CheckpointError::Missing {
            path: path.to_path_buf(),
        });
    }
    let stored = candle_core::safetensors::load(path, &Device::Cpu).map_err(io_error(path))?;
    {
        let vars = var_map.data().lock().unwrap_or_else(PoisonError::into_inner);
        for (name, var) in vars.iter() {
            let tensor = lookup(&stored, path, &format!("{MODEL_PREFIX}{name}"))?;
            let value = conform(path, name, tensor, var.as_tensor())?;
            var.set(&value).map_err(io_error(path))?;
        }
    }
    for (name, moments) in optimizer.moments_mut() {
        let first = lookup(&stored, path, &format!("{FIRST_PREFIX}{name}"))?;
        moments.first = conform(path, name, first, &moments.first)?;
        let second = lookup(&stored, path, &format!("{SECOND_PREFIX}{name}"))?;
        moments.second = conform(path, name, second, &moments.second)?;
    }
    let step = lookup(&stored, path, STEP_KEY)?
        .to_vec1::<u32>()
        .map_err(io_error(path))?;
    optimizer.set_step_count(step.first().copied().unwrap_or(0));
    let lr = lookup(&stored, path, LR_KEY)?
        .to_vec1::<f64>()
        .map_err(io_error(path))?;
    if let Some(&lr) = lr.first() {
        optimizer.set_learning_rate(lr);
    }
    info!(step = optimizer.step_count(), "checkpoint restored");
    Ok(())
}

fn lookup<'a>(
    stored: &'a HashMap<String, Tensor>,
    path: &Path,
    key: &str,
) -> CheckpointResult<&'a Tensor> {
    stored.get(key).ok_or_else(|| CheckpointError::MissingTensor {
        path: path.to_path_buf(),
        name: Arc::from(key),
    })
}

/// Moves `stored` onto the live tensor's device and dtype after checking its
/// shape.
fn conform(path: &Path, name: &str, stored: &Tensor, live: &Tensor) -> CheckpointResult<Tensor> {
    if stored.dims() != live.dims() {
        return Err(CheckpointError::ShapeMismatch {
            name: Arc::from(name),
            stored: stored.dims().to_vec(),
            expected: live.dims().to_vec(),
        });
    }
    stored
        .to_device(live.device())
        .and_then(|tensor| tensor.to_dtype(live.dtype()))
        .map_err(io_error(path))
}
