//! Unit tests for the CLI commands.

use super::commands::{generate_command, run_command};
use super::{
    Cli, CliError, Command, DEFAULT_CACHE_FILE, ExecutionSummary, GenerateCommand, ModelArgs,
    RunCommand, TrainingArgs, render_summary, run_cli,
};

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use neugraph_core::{
    AUTOENCODER_CHECKPOINT, CheckpointError, ConfigError, DENOISER_CHECKPOINT, GeneratedGraph,
    GenerationReport, Graph, NeugraphError, StatsVector,
};
use neugraph_providers_files::GraphFileError;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use tracing_subscriber::layer::SubscriberExt;

use neugraph_test_support::tracing::RecordingLayer;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const N_MAX: usize = 6;

fn gml(node_count: usize, edges: &[(usize, usize)]) -> String {
    let mut text = String::from("graph [\n");
    for node in 0..node_count {
        let _ = writeln!(text, "  node [ id {node} ]");
    }
    for (source, target) in edges {
        let _ = writeln!(text, "  edge [ source {source} target {target} ]");
    }
    text.push(']');
    text
}

fn stats_line(node_count: usize, edge_count: usize) -> String {
    let mut values = vec![node_count.to_string(), edge_count.to_string()];
    values.extend(std::iter::repeat_n("0".to_owned(), 12));
    values.join(" ")
}

/// Rings, paths and stars on three to six nodes, as GML files with stats.
fn write_corpus(root: &Path) -> std::io::Result<()> {
    fs::create_dir_all(root.join("graphs"))?;
    fs::create_dir_all(root.join("stats"))?;
    for n in 3..=N_MAX {
        let ring: Vec<_> = (0..n).map(|i| (i, (i + 1) % n)).collect();
        let path: Vec<_> = (1..n).map(|i| (i - 1, i)).collect();
        let star: Vec<_> = (1..n).map(|leaf| (0, leaf)).collect();
        for (kind, edges) in [("ring", ring), ("path", path), ("star", star)] {
            let stem = format!("{kind}{n}");
            fs::write(root.join("graphs").join(format!("{stem}.gml")), gml(n, &edges))?;
            fs::write(
                root.join("stats").join(format!("{stem}.txt")),
                stats_line(n, edges.len()),
            )?;
        }
    }
    Ok(())
}

fn tiny_model(checkpoint_dir: PathBuf) -> ModelArgs {
    ModelArgs {
        checkpoint_dir,
        n_max: Some(N_MAX),
        spectral_dim: Some(2),
        hidden_dim_encoder: Some(8),
        hidden_dim_decoder: Some(16),
        latent_dim: Some(4),
        hidden_dim_denoise: Some(8),
        dim_condition: Some(8),
        timesteps: Some(10),
        batch_size: Some(4),
        seed: Some(7),
        ..ModelArgs::default()
    }
}

fn tiny_training() -> TrainingArgs {
    TrainingArgs {
        epochs_autoencoder: Some(2),
        epochs_denoise: Some(2),
        ..TrainingArgs::default()
    }
}

struct Workspace {
    _dir: TempDir,
    data: PathBuf,
    checkpoints: PathBuf,
}

#[fixture]
fn workspace() -> Workspace {
    let dir = match TempDir::new() {
        Ok(dir) => dir,
        Err(err) => panic!("failed to create temp dir: {err}"),
    };
    let data = dir.path().join("data");
    if let Err(err) = write_corpus(&data) {
        panic!("failed to write corpus: {err}");
    }
    let checkpoints = dir.path().join("runs").join("latest");
    Workspace {
        _dir: dir,
        data,
        checkpoints,
    }
}

fn run_args(workspace: &Workspace) -> RunCommand {
    RunCommand {
        data_dir: workspace.data.clone(),
        cache: None,
        no_cache: false,
        load_autoencoder: false,
        load_denoiser: false,
        model: tiny_model(workspace.checkpoints.clone()),
        training: tiny_training(),
    }
}

fn generate_args(workspace: &Workspace, stems: &[&str]) -> GenerateCommand {
    GenerateCommand {
        stats: stems
            .iter()
            .map(|stem| workspace.data.join("stats").join(format!("{stem}.txt")))
            .collect(),
        model: tiny_model(workspace.checkpoints.clone()),
    }
}

fn expect_error(result: Result<ExecutionSummary, CliError>, panic_msg: &str) -> CliError {
    match result {
        Ok(_) => panic!("{panic_msg}"),
        Err(err) => err,
    }
}

#[rstest]
fn run_trains_generates_and_persists_artifacts(workspace: Workspace) -> TestResult {
    let summary = run_cli(Cli {
        command: Command::Run(run_args(&workspace)),
    })?;

    assert_eq!(summary.corpus, Some(12));
    let report = &summary.report;
    assert_eq!(report.autoencoder.as_ref().map(|r| r.epochs.len()), Some(2));
    assert_eq!(report.denoiser.as_ref().map(|r| r.epochs.len()), Some(2));
    assert_eq!(report.graphs.len(), 2);
    assert!(report.graphs.iter().all(|g| g.graph.node_count() <= N_MAX));

    assert!(workspace.data.join(DEFAULT_CACHE_FILE).is_file());
    assert!(workspace.checkpoints.join(AUTOENCODER_CHECKPOINT).is_file());
    assert!(workspace.checkpoints.join(DENOISER_CHECKPOINT).is_file());
    Ok(())
}

#[rstest]
fn run_reuses_checkpoints_when_asked(workspace: Workspace) -> TestResult {
    run_command(&run_args(&workspace))?;
    let resumed = run_command(&RunCommand {
        load_autoencoder: true,
        load_denoiser: true,
        ..run_args(&workspace)
    })?;
    assert!(resumed.report.autoencoder.is_none());
    assert!(resumed.report.denoiser.is_none());
    assert_eq!(resumed.report.graphs.len(), 2);
    Ok(())
}

#[rstest]
fn run_without_cache_leaves_no_cache_file(workspace: Workspace) -> TestResult {
    let summary = run_command(&RunCommand {
        no_cache: true,
        ..run_args(&workspace)
    })?;
    assert_eq!(summary.corpus, Some(12));
    assert!(!workspace.data.join(DEFAULT_CACHE_FILE).exists());
    Ok(())
}

#[rstest]
fn generate_restores_checkpoints_written_by_run(workspace: Workspace) -> TestResult {
    run_command(&run_args(&workspace))?;
    let summary = generate_command(&generate_args(&workspace, &["ring5", "star4", "path3"]))?;

    assert_eq!(summary.corpus, None);
    assert!(summary.report.autoencoder.is_none());
    let graphs = &summary.report.graphs;
    assert_eq!(graphs.len(), 3);
    assert_eq!(graphs[0].stats.as_slice()[..2], [5.0, 5.0]);
    assert_eq!(graphs[1].stats.as_slice()[..2], [4.0, 3.0]);
    Ok(())
}

#[rstest]
fn generate_without_checkpoints_fails(workspace: Workspace) {
    let err = expect_error(
        generate_command(&generate_args(&workspace, &["ring3"])),
        "missing checkpoints must fail",
    );
    assert!(matches!(
        err,
        CliError::Core(NeugraphError::Checkpoint(CheckpointError::Missing { .. }))
    ));
}

#[rstest]
fn generate_reports_unreadable_stats_files(workspace: Workspace) {
    let err = expect_error(
        generate_command(&generate_args(&workspace, &["absent"])),
        "missing stats file must fail",
    );
    assert!(matches!(err, CliError::Files(GraphFileError::Io { .. })));
}

#[rstest]
fn run_rejects_corpus_without_usable_graphs(workspace: Workspace) -> TestResult {
    for entry in fs::read_dir(workspace.data.join("stats"))? {
        fs::remove_file(entry?.path())?;
    }
    let err = expect_error(run_command(&run_args(&workspace)), "empty corpus must fail");
    assert!(matches!(err, CliError::EmptyCorpus { .. }));
    Ok(())
}

#[rstest]
fn run_rejects_invalid_configuration(workspace: Workspace) {
    let mut args = run_args(&workspace);
    args.model.hidden_dim_denoise = Some(7);
    let err = expect_error(run_command(&args), "odd denoiser width must fail");
    assert!(matches!(err, CliError::Core(NeugraphError::Config(_))));
    assert!(!workspace.checkpoints.exists());
}

#[rstest]
#[case::zero_tau(Some(0.0), None)]
#[case::nan_threshold(None, Some(f32::NAN))]
fn run_rejects_invalid_readout_settings(
    workspace: Workspace,
    #[case] gumbel_tau: Option<f64>,
    #[case] edge_threshold: Option<f32>,
) {
    let mut args = run_args(&workspace);
    args.training.gumbel_tau = gumbel_tau;
    args.model.edge_threshold = edge_threshold;
    let err = expect_error(run_command(&args), "invalid readout must fail");
    assert!(matches!(
        err,
        CliError::Core(NeugraphError::Config(
            ConfigError::InvalidGumbelTau { .. } | ConfigError::InvalidEdgeThreshold { .. }
        ))
    ));
    assert!(!workspace.checkpoints.exists());
}

#[rstest]
fn run_cli_records_command_spans(workspace: Workspace) {
    let layer = RecordingLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let result = tracing::subscriber::with_default(subscriber, || {
        run_cli(Cli {
            command: Command::Generate(generate_args(&workspace, &["ring3"])),
        })
    });
    assert!(result.is_err());

    let spans = layer.spans();
    let outer = spans
        .iter()
        .find(|span| span.name == "cli.run")
        .expect("cli.run span must exist");
    assert_eq!(outer.fields.get("command").map(String::as_str), Some("generate"));
    let inner = spans
        .iter()
        .find(|span| span.name == "cli.generate")
        .expect("cli.generate span must exist");
    assert_eq!(inner.fields.get("requests").map(String::as_str), Some("1"));
}

#[rstest]
fn clap_maps_run_flags() {
    let cli = Cli::try_parse_from([
        "neugraph",
        "run",
        "corpus",
        "--plain",
        "--n-max",
        "12",
        "--gumbel-tau",
        "0.5",
        "--load-denoiser",
        "--checkpoint-dir",
        "runs",
    ])
    .expect("arguments must parse");
    let Command::Run(run) = cli.command else {
        panic!("expected the run command");
    };
    assert_eq!(run.data_dir, Path::new("corpus"));
    assert!(run.model.plain && run.load_denoiser && !run.load_autoencoder);
    assert_eq!(run.model.n_max, Some(12));
    assert_eq!(run.training.gumbel_tau, Some(0.5));
    assert_eq!(run.model.checkpoint_dir, Path::new("runs"));
}

#[rstest]
fn clap_defaults_checkpoint_dir_to_current_directory() {
    let cli = Cli::try_parse_from(["neugraph", "generate", "--stats", "a.txt", "b.txt"])
        .expect("arguments must parse");
    let Command::Generate(generate) = cli.command else {
        panic!("expected the generate command");
    };
    assert_eq!(generate.stats.len(), 2);
    assert_eq!(generate.model.checkpoint_dir, Path::new("."));
}

#[rstest]
#[case::generate_without_stats(&["neugraph", "generate"])]
#[case::run_without_data_dir(&["neugraph", "run"])]
#[case::training_flag_on_generate(&["neugraph", "generate", "--stats", "a.txt", "--lr", "0.1"])]
fn clap_rejects_incomplete_commands(#[case] args: &[&str]) {
    assert!(Cli::try_parse_from(args).is_err());
}

#[rstest]
fn render_summary_lists_generated_graphs() -> TestResult {
    let graph = Graph::from_edges(3, [(0, 1), (1, 2)])?;
    let mut stats = [0.0_f32; 14];
    stats[0] = 3.0;
    stats[1] = 2.0;
    let summary = ExecutionSummary {
        corpus: None,
        report: GenerationReport {
            graphs: vec![GeneratedGraph {
                summary: graph.summary(),
                graph,
                stats: StatsVector::new(stats),
            }],
            ..GenerationReport::default()
        },
    };
    let mut buffer = Vec::new();
    render_summary(&summary, &mut buffer)?;
    let text = String::from_utf8(buffer)?;
    assert!(!text.contains("corpus"));
    assert!(text.contains("generated: 1 graphs"));
    assert!(text.ends_with("0\t3\t2\t3\t2\n"));
    Ok(())
}
