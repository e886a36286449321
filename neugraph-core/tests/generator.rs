//! End-to-end tests for the two-stage generator.

mod common;

use candle_core::Device;
use common::{N_MAX, corpus, small_builder, snapshot};
use neugraph_core::{
    CheckpointError, DatasetSplit, EdgeReadout, Graph, GraphBatch, ModelSource, NeugraphError,
    Phase, Sample, SplitSamples, StatsVector, q_sample, reverse_process, standard_normal,
    stats_tensor,
};
use rand::{SeedableRng, rngs::SmallRng};
use rstest::{fixture, rstest};
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

use neugraph_test_support::tracing::RecordingLayer;

#[fixture]
fn splits() -> SplitSamples<Sample> {
    let samples = corpus();
    DatasetSplit::random(samples.len(), &mut SmallRng::seed_from_u64(13)).apply(&samples)
}

#[fixture]
fn workdir() -> TempDir {
    TempDir::new().expect("temporary directory")
}

#[rstest]
fn run_trains_both_models_and_generates_one_graph_per_test_sample(
    splits: SplitSamples<Sample>,
    workdir: TempDir,
) {
    let mut generator = small_builder(workdir.path())
        .build_generator(&Device::Cpu)
        .expect("generator");
    let mut rng = SmallRng::seed_from_u64(1);
    let report = generator.run(&splits, &mut rng).expect("run");

    let autoencoder = report.autoencoder.expect("autoencoder was trained");
    assert_eq!(autoencoder.epochs.len(), 3);
    let best = autoencoder
        .epochs
        .iter()
        .map(|e| e.validation)
        .fold(f64::INFINITY, f64::min);
    assert_eq!(autoencoder.best_validation, best);
    assert!(autoencoder.epochs.iter().all(|e| e.train.is_finite()));

    let denoiser = report.denoiser.expect("denoiser was trained");
    assert_eq!(denoiser.epochs.len(), 3);
    assert!((1..=3).contains(&denoiser.best_epoch));

    let evaluation = report.evaluation.expect("test split is not empty");
    assert_eq!(evaluation.graphs, splits.test.len());
    assert!((0.0..=1.0).contains(&evaluation.edge_accuracy));

    assert_eq!(report.graphs.len(), splits.test.len());
    for (generated, sample) in report.graphs.iter().zip(&splits.test) {
        assert_eq!(&generated.stats, sample.stats());
        assert!(generated.graph.node_count() <= N_MAX);
        assert_eq!(generated.summary, generated.graph.summary());
    }
    assert!(generator.config().checkpoints().autoencoder.is_file());
    assert!(generator.config().checkpoints().denoiser.is_file());
}

#[rstest]
fn training_records_spans_and_epoch_events(splits: SplitSamples<Sample>, workdir: TempDir) {
    let mut generator = small_builder(workdir.path())
        .with_variational(false)
        .build_generator(&Device::Cpu)
        .expect("generator");
    let layer = RecordingLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let mut rng = SmallRng::seed_from_u64(2);

    tracing::subscriber::with_default(subscriber, || {
        generator.train_autoencoder(&splits.train, &splits.validation, &mut rng)
    })
    .expect("training");

    let spans = layer.spans();
    let train_span = spans
        .iter()
        .find(|span| span.name == "core.train_autoencoder")
        .expect("core.train_autoencoder span must exist");
    assert_eq!(train_span.fields.get("kind"), Some(&"plain".to_owned()));
    assert_eq!(
        train_span.fields.get("train"),
        Some(&splits.train.len().to_string())
    );
    assert!(spans.iter().any(|span| span.name == "core.checkpoint.save"));
    assert!(spans.iter().any(|span| span.name == "core.checkpoint.load"));

    let epochs = layer
        .events()
        .into_iter()
        .filter(|event| {
            event.level == Level::INFO
                && event
                    .fields
                    .get("message")
                    .is_some_and(|value| value == "autoencoder epoch")
        })
        .count();
    assert_eq!(epochs, 3);
}

#[rstest]
fn loading_a_missing_checkpoint_is_fatal(splits: SplitSamples<Sample>, workdir: TempDir) {
    let mut generator = small_builder(workdir.path())
        .with_autoencoder_source(ModelSource::LoadCheckpoint)
        .build_generator(&Device::Cpu)
        .expect("generator");
    let err = generator
        .run(&splits, &mut SmallRng::seed_from_u64(3))
        .expect_err("missing checkpoint must stop the run");
    assert!(matches!(
        err,
        NeugraphError::Checkpoint(CheckpointError::Missing { .. })
    ));
    assert_eq!(err.detail_code(), Some("CHECKPOINT_MISSING"));
}

#[rstest]
fn checkpoints_restore_identical_parameters(splits: SplitSamples<Sample>, workdir: TempDir) {
    let mut trained = small_builder(workdir.path())
        .build_generator(&Device::Cpu)
        .expect("generator");
    let mut rng = SmallRng::seed_from_u64(4);
    trained
        .prepare_autoencoder(&splits.train, &splits.validation, &mut rng)
        .expect("autoencoder training");
    trained
        .prepare_denoiser(&splits.train, &splits.validation, &mut rng)
        .expect("denoiser training");

    let mut restored = small_builder(workdir.path())
        .with_autoencoder_source(ModelSource::LoadCheckpoint)
        .with_denoiser_source(ModelSource::LoadCheckpoint)
        .build_generator(&Device::Cpu)
        .expect("generator");
    let report = restored
        .prepare_autoencoder(&splits.train, &splits.validation, &mut rng)
        .expect("autoencoder restore");
    assert!(report.is_none());
    restored
        .prepare_denoiser(&splits.train, &splits.validation, &mut rng)
        .expect("denoiser restore");

    assert_eq!(
        snapshot(trained.autoencoder().var_map()),
        snapshot(restored.autoencoder().var_map())
    );
    assert_eq!(
        snapshot(trained.denoiser().var_map()),
        snapshot(restored.denoiser().var_map())
    );

    let targets: Vec<StatsVector> = splits.test.iter().map(|s| *s.stats()).collect();
    let edges = |generator: &neugraph_core::GraphGenerator| {
        generator
            .generate(&targets, &mut SmallRng::seed_from_u64(9))
            .expect("generation")
            .into_iter()
            .map(|g| g.graph.edges().collect::<Vec<_>>())
            .collect::<Vec<_>>()
    };
    assert_eq!(edges(&trained), edges(&restored));
}

#[rstest]
fn resumed_training_continues_from_the_restored_state(
    splits: SplitSamples<Sample>,
    workdir: TempDir,
) {
    let builder = |dir: &std::path::Path| {
        small_builder(dir)
            .with_variational(false)
            .with_learning_rate(1e-2)
    };
    let mut first = builder(workdir.path())
        .with_epochs_autoencoder(20)
        .build_generator(&Device::Cpu)
        .expect("generator");
    let history = first
        .train_autoencoder(&splits.train, &splits.validation, &mut SmallRng::seed_from_u64(5))
        .expect("training");
    let restored_steps = first.autoencoder_optimizer().step_count();
    assert!(restored_steps > 0);

    let mut resumed = builder(workdir.path())
        .with_epochs_autoencoder(1)
        .build_generator(&Device::Cpu)
        .expect("generator");
    resumed.load_autoencoder().expect("restore");
    assert_eq!(resumed.autoencoder_optimizer().step_count(), restored_steps);
    let restored_loss = resumed
        .autoencoder_loss(&splits.validation, &mut SmallRng::seed_from_u64(0))
        .expect("loss");
    assert!(
        (restored_loss - history.best_validation).abs()
            <= 1e-6 * history.best_validation.abs().max(1.0)
    );

    let continued = resumed
        .train_autoencoder(&splits.train, &splits.validation, &mut SmallRng::seed_from_u64(6))
        .expect("resumed training");
    let batches = splits.train.len().div_ceil(4);
    assert_eq!(
        resumed.autoencoder_optimizer().step_count(),
        restored_steps + u32::try_from(batches).expect("batch count")
    );

    let fresh_dir = TempDir::new().expect("temporary directory");
    let mut fresh = builder(fresh_dir.path())
        .with_epochs_autoencoder(1)
        .build_generator(&Device::Cpu)
        .expect("generator");
    let scratch = fresh
        .train_autoencoder(&splits.train, &splits.validation, &mut SmallRng::seed_from_u64(6))
        .expect("fresh training");

    let continued = continued.epochs[0].validation;
    let scratch = scratch.epochs[0].validation;
    assert!(
        (continued - restored_loss).abs() < (scratch - restored_loss).abs(),
        "resumed {continued} should stay near restored {restored_loss}, fresh is {scratch}"
    );
    assert!(continued < scratch);
}

#[rstest]
#[case::plain(false)]
#[case::variational(true)]
fn validation_loss_is_unchanged_by_duplicating_a_sample(
    #[case] variational: bool,
    splits: SplitSamples<Sample>,
    workdir: TempDir,
) {
    let generator = small_builder(workdir.path())
        .with_variational(variational)
        .build_generator(&Device::Cpu)
        .expect("generator");
    let sample = splits.validation[0].clone();
    let single = generator
        .autoencoder_loss(std::slice::from_ref(&sample), &mut SmallRng::seed_from_u64(0))
        .expect("loss");
    let repeated = generator
        .autoencoder_loss(&vec![sample; 8], &mut SmallRng::seed_from_u64(0))
        .expect("loss");
    assert!(
        (single - repeated).abs() <= 1e-4 * single.abs().max(1e-6),
        "single {single} vs repeated {repeated}"
    );
}

#[rstest]
#[case::autoencoder("autoencoder")]
#[case::denoiser("denoiser")]
fn diverging_training_stops_with_a_non_finite_loss(
    #[case] stage: &'static str,
    splits: SplitSamples<Sample>,
    workdir: TempDir,
) {
    let mut generator = small_builder(workdir.path())
        .with_variational(false)
        .with_learning_rate(f64::MAX)
        .build_generator(&Device::Cpu)
        .expect("generator");
    let mut rng = SmallRng::seed_from_u64(8);
    let err = match stage {
        "autoencoder" => generator.train_autoencoder(&splits.train, &splits.validation, &mut rng),
        _ => generator.train_denoiser(&splits.train, &splits.validation, &mut rng),
    }
    .expect_err("divergence must stop training");
    assert!(
        matches!(err, NeugraphError::NonFiniteLoss { phase, epoch: 1, .. } if phase == stage),
        "unexpected error: {err}"
    );
    assert_eq!(err.code().as_str(), "NEUGRAPH_NON_FINITE_LOSS");
    let checkpoints = generator.config().checkpoints();
    let path = if stage == "autoencoder" {
        &checkpoints.autoencoder
    } else {
        &checkpoints.denoiser
    };
    assert!(!path.exists());
}

#[rstest]
#[ignore = "trains both models to convergence"]
fn an_overfit_graph_survives_noising_and_reverse_diffusion(workdir: TempDir) {
    let ring = corpus()
        .into_iter()
        .find(|s| s.node_count() == 5 && s.stats().as_slice()[1].round() as usize == 5)
        .expect("five-node ring");
    let corpus = vec![ring.clone()];
    let mut generator = small_builder(workdir.path())
        .with_variational(false)
        .with_dropout(0.0)
        .with_learning_rate(1e-2)
        .with_lr_step_size(1000)
        .with_timesteps(20)
        .with_epochs_autoencoder(400)
        .with_epochs_denoise(600)
        .with_batch_size(1)
        .build_generator(&Device::Cpu)
        .expect("generator");
    let mut rng = SmallRng::seed_from_u64(10);
    generator
        .train_autoencoder(&corpus, &corpus, &mut rng)
        .expect("autoencoder training");
    generator
        .train_denoiser(&corpus, &corpus, &mut rng)
        .expect("denoiser training");

    let batch = GraphBatch::collate(&[&ring], &Device::Cpu).expect("batch");
    let latent = generator
        .autoencoder()
        .encode(&batch, Phase::Eval, &mut rng)
        .expect("encode");
    let last = generator.schedule().timesteps() - 1;
    let noise = standard_normal(&mut rng, latent.shape(), &Device::Cpu).expect("noise");
    let noisy = q_sample(
        generator.schedule(),
        &latent,
        &[u32::try_from(last).expect("timestep")],
        &noise,
    )
    .expect("noising");
    let condition = stats_tensor(&[*ring.stats()], &Device::Cpu).expect("stats");
    let recovered = reverse_process(
        generator.denoiser(),
        generator.schedule(),
        &noisy,
        last,
        &condition,
        &mut rng,
    )
    .expect("reverse process");
    let decoded = generator
        .autoencoder()
        .decode(&recovered)
        .and_then(|t| Ok(t.reshape((1, N_MAX * N_MAX))?.to_vec2::<f32>()?))
        .expect("decode");
    let graph = Graph::from_adjacency(&decoded[0], N_MAX, 0.5);
    assert!(graph.node_count().abs_diff(5) <= 1, "nodes: {}", graph.node_count());
    assert!(graph.edge_count().abs_diff(5) <= 2, "edges: {}", graph.edge_count());
}

#[rstest]
fn gumbel_readout_trains(splits: SplitSamples<Sample>, workdir: TempDir) {
    let mut generator = small_builder(workdir.path())
        .with_readout(EdgeReadout::GumbelHard { tau: 1.0 })
        .build_generator(&Device::Cpu)
        .expect("generator");
    let report = generator
        .train_autoencoder(&splits.train, &splits.validation, &mut SmallRng::seed_from_u64(6))
        .expect("training");
    assert!(report.epochs.iter().all(|e| e.train.is_finite() && e.validation.is_finite()));
}

#[rstest]
fn empty_training_split_is_rejected(workdir: TempDir) {
    let mut generator = small_builder(workdir.path())
        .build_generator(&Device::Cpu)
        .expect("generator");
    let err = generator
        .train_autoencoder(&[], &corpus(), &mut SmallRng::seed_from_u64(7))
        .expect_err("empty split must be rejected");
    assert!(matches!(err, NeugraphError::EmptySplit { split: "train" }));
}
