use candle_core::{DType, Device, Tensor};
use proptest::prelude::*;
use proptest::test_runner::TestRunner;
use rstest::rstest;

use super::{process::huber_loss, *};
use crate::{
    autoencoder::Phase,
    error::{NeugraphError, Result},
    sample::STATS_DIM,
    noise::standard_normal,
    test_utils::{seeded_rng, suite_proptest_config},
};

/// Predicts a fixed multiple of its input, ignoring time and conditioning.
struct ScaledIdentity(f64);

impl NoisePredictor for ScaledIdentity {
    fn latent_dim(&self) -> usize {
        3
    }

    fn predict_noise(
        &self,
        noisy: &Tensor,
        _timesteps: &Tensor,
        _stats: &Tensor,
        _phase: Phase,
    ) -> Result<Tensor> {
        Ok((noisy * self.0)?)
    }
}

fn values(tensor: &Tensor) -> Vec<Vec<f32>> {
    tensor.to_vec2::<f32>().expect("values")
}

fn stats(rows: usize) -> Tensor {
    Tensor::zeros((rows, STATS_DIM), DType::F32, &Device::Cpu).expect("stats")
}

#[rstest]
fn linear_schedule_keeps_signal_in_unit_interval() {
    let mut runner = TestRunner::new(suite_proptest_config(64));
    runner
        .run(&(1_usize..600, 1e-5_f64..0.01, 0.01_f64..0.5), |(t, start, end)| {
            let schedule = DiffusionSchedule::linear(t, start, end)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let mut previous = 1.0;
            for step in 0..t {
                let a = schedule.alpha_cumprod(step).unwrap_or_default();
                prop_assert!(a > 0.0 && a <= 1.0, "alpha_cumprod {a} at {step}");
                prop_assert!(a <= previous);
                previous = a;
            }
            Ok(())
        })
        .expect("schedule property");
}

#[rstest]
#[case::empty(Vec::new(), "SCHEDULE_EMPTY")]
#[case::zero_beta(vec![0.1, 0.0], "SCHEDULE_BETA_OUT_OF_RANGE")]
#[case::unit_beta(vec![1.0], "SCHEDULE_BETA_OUT_OF_RANGE")]
#[case::nan_beta(vec![f64::NAN], "SCHEDULE_BETA_OUT_OF_RANGE")]
fn invalid_betas_are_rejected(#[case] betas: Vec<f64>, #[case] code: &str) {
    let err = DiffusionSchedule::from_betas(betas).expect_err("betas must be rejected");
    assert_eq!(err.code().as_str(), code);
}

#[rstest]
fn posterior_variance_vanishes_at_first_step() {
    let schedule = DiffusionSchedule::linear(10, 1e-4, 0.02).expect("schedule");
    assert_eq!(schedule.posterior_variance(0), Some(0.0));
    assert!(schedule.posterior_variance(9).unwrap_or_default() > 0.0);
}

#[rstest]
fn q_sample_mixes_signal_and_noise() {
    let schedule = DiffusionSchedule::linear(4, 0.1, 0.4).expect("schedule");
    let x0 = Tensor::new(&[[1.0_f32, 2.0], [3.0, 4.0]], &Device::Cpu).expect("x0");
    let noise = Tensor::new(&[[0.5_f32, -0.5], [1.0, 0.0]], &Device::Cpu).expect("noise");
    let noisy = q_sample(&schedule, &x0, &[0, 3], &noise).expect("noising");
    let got = values(&noisy);
    for (row, t) in [(0_usize, 0_usize), (1, 3)] {
        let a = schedule.alpha_cumprod(t).unwrap_or_default();
        let x = values(&x0)[row].clone();
        let e = values(&noise)[row].clone();
        for col in 0..2 {
            let expected = a.sqrt() * f64::from(x[col]) + (1.0 - a).sqrt() * f64::from(e[col]);
            assert!((f64::from(got[row][col]) - expected).abs() < 1e-5);
        }
    }
}

#[rstest]
fn q_sample_rejects_out_of_range_timesteps() {
    let schedule = DiffusionSchedule::linear(4, 0.1, 0.4).expect("schedule");
    let x0 = Tensor::zeros((1, 2), DType::F32, &Device::Cpu).expect("x0");
    let err = q_sample(&schedule, &x0, &[4], &x0).expect_err("t = T is invalid");
    assert!(matches!(
        err,
        NeugraphError::Diffusion(DiffusionError::InvalidTimestep { t: 4, timesteps: 4 })
    ));
}

#[rstest]
fn final_reverse_step_is_deterministic() {
    let schedule = DiffusionSchedule::linear(5, 1e-4, 0.02).expect("schedule");
    let x = Tensor::new(&[[0.3_f32, -1.0, 2.0]], &Device::Cpu).expect("x");
    let predictor = ScaledIdentity(0.5);
    let a = reverse_step(&predictor, &schedule, &x, 0, &stats(1), &mut seeded_rng(1))
        .expect("step");
    let b = reverse_step(&predictor, &schedule, &x, 0, &stats(1), &mut seeded_rng(99))
        .expect("step");
    let mean = posterior_mean(&predictor, &schedule, &x, 0, &stats(1)).expect("mean");
    assert_eq!(values(&a), values(&b));
    assert_eq!(values(&a), values(&mean));
}

#[rstest]
fn later_reverse_steps_add_noise() {
    let schedule = DiffusionSchedule::linear(5, 1e-4, 0.02).expect("schedule");
    let x = Tensor::new(&[[0.3_f32, -1.0, 2.0]], &Device::Cpu).expect("x");
    let predictor = ScaledIdentity(0.5);
    let a = reverse_step(&predictor, &schedule, &x, 4, &stats(1), &mut seeded_rng(1))
        .expect("step");
    let b = reverse_step(&predictor, &schedule, &x, 4, &stats(1), &mut seeded_rng(2))
        .expect("step");
    assert_ne!(values(&a), values(&b));
}

#[rstest]
#[case(5)]
#[case(17)]
fn reverse_step_rejects_timesteps_past_the_schedule(#[case] t: usize) {
    let schedule = DiffusionSchedule::linear(5, 1e-4, 0.02).expect("schedule");
    let x = Tensor::zeros((1, 3), DType::F32, &Device::Cpu).expect("x");
    let err = reverse_step(&ScaledIdentity(1.0), &schedule, &x, t, &stats(1), &mut seeded_rng(0))
        .expect_err("timestep must be rejected");
    assert_eq!(err.code().as_str(), "NEUGRAPH_DIFFUSION");
    assert!(matches!(
        err,
        NeugraphError::Diffusion(DiffusionError::InvalidTimestep { timesteps: 5, .. })
    ));
}

#[rstest]
fn sample_loop_yields_one_latent_per_condition() {
    let schedule = DiffusionSchedule::linear(20, 1e-4, 0.02).expect("schedule");
    let latents = sample_loop(&ScaledIdentity(0.1), &schedule, &stats(4), &mut seeded_rng(3))
        .expect("sampling");
    assert_eq!(latents.dims(), &[4, 3]);
    assert!(values(&latents).iter().flatten().all(|v| v.is_finite()));
}

#[rstest]
fn sample_loop_repeats_under_a_seed() {
    let schedule = DiffusionSchedule::linear(20, 1e-4, 0.02).expect("schedule");
    let draw = |seed| {
        sample_loop(&ScaledIdentity(0.1), &schedule, &stats(2), &mut seeded_rng(seed))
            .map(|t| values(&t))
            .expect("sampling")
    };
    assert_eq!(draw(8), draw(8));
}

#[rstest]
fn sample_loop_reverses_a_standard_normal_draw_from_the_last_step() {
    let schedule = DiffusionSchedule::linear(12, 1e-4, 0.02).expect("schedule");
    let predictor = ScaledIdentity(0.1);
    let sampled = sample_loop(&predictor, &schedule, &stats(2), &mut seeded_rng(4))
        .expect("sampling");
    let mut rng = seeded_rng(4);
    let start = standard_normal(&mut rng, (2, 3), &Device::Cpu).expect("noise");
    let reversed = reverse_process(&predictor, &schedule, &start, 11, &stats(2), &mut rng)
        .expect("reverse process");
    assert_eq!(values(&sampled), values(&reversed));
}

#[rstest]
fn reverse_process_from_zero_is_the_posterior_mean() {
    let schedule = DiffusionSchedule::linear(5, 1e-4, 0.02).expect("schedule");
    let x = Tensor::new(&[[0.3_f32, -1.0, 2.0]], &Device::Cpu).expect("x");
    let predictor = ScaledIdentity(0.5);
    let reversed = reverse_process(&predictor, &schedule, &x, 0, &stats(1), &mut seeded_rng(5))
        .expect("reverse process");
    let mean = posterior_mean(&predictor, &schedule, &x, 0, &stats(1)).expect("mean");
    assert_eq!(values(&reversed), values(&mean));
}

#[rstest]
fn reverse_process_rejects_a_start_past_the_schedule() {
    let schedule = DiffusionSchedule::linear(5, 1e-4, 0.02).expect("schedule");
    let x = Tensor::zeros((1, 3), DType::F32, &Device::Cpu).expect("x");
    let err = reverse_process(
        &ScaledIdentity(1.0),
        &schedule,
        &x,
        5,
        &stats(1),
        &mut seeded_rng(0),
    )
    .expect_err("start must be rejected");
    assert!(matches!(
        err,
        NeugraphError::Diffusion(DiffusionError::InvalidTimestep { timesteps: 5, .. })
    ));
}

#[rstest]
#[case::quadratic(0.5, 0.125)]
#[case::linear(3.0, 2.5)]
fn huber_loss_switches_at_unit_error(#[case] error: f32, #[case] expected: f32) {
    let prediction = Tensor::new(&[error], &Device::Cpu).expect("prediction");
    let target = Tensor::new(&[0.0_f32], &Device::Cpu).expect("target");
    let loss = huber_loss(&prediction, &target)
        .and_then(|t| Ok(t.to_scalar::<f32>()?))
        .expect("loss");
    assert!((loss - expected).abs() < 1e-6);
}

#[rstest]
fn denoiser_predictions_do_not_leak_across_rows_in_eval() {
    let config = DenoiserConfig {
        latent_dim: 3,
        hidden_dim: 8,
        n_layers: 3,
        condition_dim: 4,
    };
    let network = DenoiseNetwork::new(config, &Device::Cpu).expect("network");
    let x = Tensor::new(&[[0.1_f32, 0.2, 0.3], [5.0, -5.0, 1.0]], &Device::Cpu).expect("x");
    let t = Tensor::new(&[3_u32, 7], &Device::Cpu).expect("t");
    let both = network
        .predict_noise(&x, &t, &stats(2), Phase::Eval)
        .expect("prediction");
    let first = network
        .predict_noise(
            &x.narrow(0, 0, 1).expect("row"),
            &t.narrow(0, 0, 1).expect("row"),
            &stats(1),
            Phase::Eval,
        )
        .expect("prediction");
    let both = values(&both);
    let first = values(&first);
    for (a, b) in both[0].iter().zip(&first[0]) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[rstest]
fn denoising_loss_is_finite_and_differentiable() {
    let config = DenoiserConfig {
        latent_dim: 3,
        hidden_dim: 8,
        n_layers: 2,
        condition_dim: 4,
    };
    let network = DenoiseNetwork::new(config, &Device::Cpu).expect("network");
    let schedule = DiffusionSchedule::linear(50, 1e-4, 0.02).expect("schedule");
    let x0 = Tensor::ones((6, 3), DType::F32, &Device::Cpu).expect("x0");
    let loss = denoising_loss(
        &network,
        &schedule,
        &x0,
        &stats(6),
        Phase::Train,
        &mut seeded_rng(4),
    )
    .expect("loss");
    assert!(loss.to_scalar::<f32>().expect("scalar").is_finite());
    let grads = loss.backward().expect("gradients");
    let vars = network.var_map().all_vars();
    assert!(vars.iter().any(|v| grads.get(v).is_some()));
}
