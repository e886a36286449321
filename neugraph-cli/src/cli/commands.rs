//! Command implementations and argument parsing for the neugraph CLI.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use candle_core::Device;
use clap::{Args, Parser, Subcommand};
use neugraph_core::{
    CheckpointPaths, DatasetSplit, EdgeReadout, GenerationReport, GeneratorBuilder,
    GeneratorConfig, GraphGenerator, ModelSource, NeugraphError, Sample, StatsVector,
    encode_corpus,
};
use neugraph_providers_files::{GraphFileError, cached_corpus, load_corpus, read_stats};
use rand::{SeedableRng, rngs::SmallRng};
use thiserror::Error;
use tracing::{Span, field, info, instrument};

/// Cache file written inside the data directory unless `--cache` is given.
pub const DEFAULT_CACHE_FILE: &str = "dataset.json";

/// Parsed `neugraph` invocation.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "neugraph",
    about = "Train a latent diffusion graph generator and sample graphs from it."
)]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands of `neugraph`.
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Train or restore both models on a corpus and generate one graph per
    /// test-split statistics vector.
    Run(RunCommand),
    /// Restore both models from their checkpoints and generate one graph per
    /// statistics file.
    Generate(GenerateCommand),
}

/// Arguments of `neugraph run`.
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Directory containing `graphs/` and `stats/`.
    pub data_dir: PathBuf,

    /// Encoded dataset cache (defaults to `<DATA_DIR>/dataset.json`).
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Re-encode the corpus without reading or writing the cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Restore the autoencoder from its checkpoint instead of training it.
    #[arg(long)]
    pub load_autoencoder: bool,

    /// Restore the denoiser from its checkpoint instead of training it.
    #[arg(long)]
    pub load_denoiser: bool,

    /// Architecture and sampling options.
    #[command(flatten)]
    pub model: ModelArgs,

    /// Optimisation options.
    #[command(flatten)]
    pub training: TrainingArgs,
}

/// Options accepted by the `generate` command.
#[derive(Debug, Args, Clone)]
pub struct GenerateCommand {
    /// Statistics files; one graph is generated for each.
    #[arg(long = "stats", required = true, num_args = 1..)]
    pub stats: Vec<PathBuf>,

    /// Architecture and sampling options; must match the checkpoints.
    #[command(flatten)]
    pub model: ModelArgs,
}

/// Architecture, checkpoint and sampling flags shared by both commands.
///
/// Unset flags keep the [`GeneratorBuilder`] defaults.
#[derive(Debug, Args, Clone, Default)]
pub struct ModelArgs {
    /// Directory holding the model checkpoints.
    #[arg(long, default_value = ".")]
    pub checkpoint_dir: PathBuf,
    /// Maximum node count of encoded graphs.
    #[arg(long)]
    pub n_max: Option<usize>,
    /// Number of Laplacian eigenvectors per node.
    #[arg(long)]
    pub spectral_dim: Option<usize>,
    /// Use the deterministic autoencoder instead of the variational one.
    #[arg(long)]
    pub plain: bool,
    /// Encoder hidden width.
    #[arg(long)]
    pub hidden_dim_encoder: Option<usize>,
    /// Decoder hidden width.
    #[arg(long)]
    pub hidden_dim_decoder: Option<usize>,
    /// Latent width.
    #[arg(long)]
    pub latent_dim: Option<usize>,
    /// Number of GIN layers in the encoder.
    #[arg(long)]
    pub n_layers_encoder: Option<usize>,
    /// Number of decoder layers.
    #[arg(long)]
    pub n_layers_decoder: Option<usize>,
    /// Denoiser hidden width; must be even.
    #[arg(long)]
    pub hidden_dim_denoise: Option<usize>,
    /// Number of denoiser blocks.
    #[arg(long)]
    pub n_layers_denoise: Option<usize>,
    /// Width of the conditioning embedding.
    #[arg(long)]
    pub dim_condition: Option<usize>,
    /// Number of diffusion timesteps.
    #[arg(long)]
    pub timesteps: Option<usize>,
    /// Graphs per minibatch, also the generation chunk size.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Probability above which a decoded entry becomes an edge.
    #[arg(long)]
    pub edge_threshold: Option<f32>,
    /// Seed for splitting, shuffling, noise and sampling.
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Optimisation flags of the `run` command.
#[derive(Debug, Args, Clone, Default)]
pub struct TrainingArgs {
    /// Adam learning rate.
    #[arg(long)]
    pub lr: Option<f64>,
    /// Dropout applied after every encoder layer while training.
    #[arg(long)]
    pub dropout: Option<f32>,
    /// Autoencoder training epochs.
    #[arg(long)]
    pub epochs_autoencoder: Option<usize>,
    /// Denoiser training epochs.
    #[arg(long)]
    pub epochs_denoise: Option<usize>,
    /// Epochs between learning-rate decays.
    #[arg(long)]
    pub lr_step_size: Option<usize>,
    /// Learning-rate decay factor.
    #[arg(long)]
    pub lr_gamma: Option<f64>,
    /// Weight of the KL term in the variational loss.
    #[arg(long)]
    pub kl_weight: Option<f64>,
    /// Train the decoder through a hard Gumbel-softmax read-out at this
    /// temperature.
    #[arg(long)]
    pub gumbel_tau: Option<f64>,
}

/// Applies every `Some` value to the builder through its setter.
macro_rules! apply_some {
    ($builder:expr, { $( $value:expr => $setter:ident ),+ $(,)? }) => {{
        let mut builder = $builder;
        $(
            if let Some(value) = $value {
                builder = builder.$setter(value);
            }
        )+
        builder
    }};
}

impl ModelArgs {
    fn apply(&self, builder: GeneratorBuilder) -> GeneratorBuilder {
        let builder = builder
            .with_checkpoints(CheckpointPaths::in_dir(&self.checkpoint_dir))
            .with_variational(!self.plain);
        apply_some!(builder, {
            self.n_max => with_n_max,
            self.spectral_dim => with_spectral_dim,
            self.hidden_dim_encoder => with_hidden_dim_encoder,
            self.hidden_dim_decoder => with_hidden_dim_decoder,
            self.latent_dim => with_latent_dim,
            self.n_layers_encoder => with_n_layers_encoder,
            self.n_layers_decoder => with_n_layers_decoder,
            self.hidden_dim_denoise => with_hidden_dim_denoise,
            self.n_layers_denoise => with_n_layers_denoise,
            self.dim_condition => with_dim_condition,
            self.timesteps => with_timesteps,
            self.batch_size => with_batch_size,
            self.edge_threshold => with_edge_threshold,
            self.seed => with_seed,
        })
    }
}

impl TrainingArgs {
    fn apply(&self, builder: GeneratorBuilder) -> GeneratorBuilder {
        apply_some!(builder, {
            self.lr => with_learning_rate,
            self.dropout => with_dropout,
            self.epochs_autoencoder => with_epochs_autoencoder,
            self.epochs_denoise => with_epochs_denoise,
            self.lr_step_size => with_lr_step_size,
            self.lr_gamma => with_lr_gamma,
            self.kl_weight => with_kl_weight,
            self.gumbel_tau.map(|tau| EdgeReadout::GumbelHard { tau }) => with_readout,
        })
    }
}

impl RunCommand {
    fn config(&self) -> Result<GeneratorConfig, CliError> {
        let builder = self
            .training
            .apply(self.model.apply(GeneratorBuilder::new()))
            .with_autoencoder_source(source(self.load_autoencoder))
            .with_denoiser_source(source(self.load_denoiser));
        Ok(builder.build()?)
    }

    fn cache_path(&self) -> PathBuf {
        self.cache
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DEFAULT_CACHE_FILE))
    }
}

const fn source(load: bool) -> ModelSource {
    if load {
        ModelSource::LoadCheckpoint
    } else {
        ModelSource::TrainFresh
    }
}

/// Failure of a `neugraph` command.
#[derive(Debug, Error)]
pub enum CliError {
    /// A directory needed by the command could not be created.
    #[error("failed to create `{path}`: {source}")]
    Io {
        /// Path that triggered the failure.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// The corpus directory produced no encodable graphs.
    #[error("no usable graphs found under `{dir}`")]
    EmptyCorpus {
        /// Corpus directory.
        dir: PathBuf,
    },
    /// Graph, statistics or cache files could not be read.
    #[error(transparent)]
    Files(#[from] GraphFileError),
    /// Training, restoring or sampling failed.
    #[error(transparent)]
    Core(#[from] NeugraphError),
}

/// What a command produced, ready for [`render_summary`].
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    /// Encoded corpus size, for commands that load a corpus.
    pub corpus: Option<usize>,
    /// Training, evaluation and generation results.
    pub report: GenerationReport,
}

/// Dispatches `cli` to the matching command.
///
/// # Errors
/// Returns [`CliError`] when loading data, training, restoring or sampling
/// fails.
#[instrument(
    name = "cli.run",
    err,
    skip(cli),
    fields(command = field::Empty),
)]
pub fn run_cli(cli: Cli) -> Result<ExecutionSummary, CliError> {
    let span = Span::current();
    match cli.command {
        Command::Run(run) => {
            span.record("command", field::display("run"));
            run_command(&run)
        }
        Command::Generate(generate) => {
            span.record("command", field::display("generate"));
            generate_command(&generate)
        }
    }
}

#[instrument(
    name = "cli.execute",
    err,
    skip(command),
    fields(data_dir = %command.data_dir.display(), samples = field::Empty),
)]
pub(super) fn run_command(command: &RunCommand) -> Result<ExecutionSummary, CliError> {
    let config = command.config()?;
    let samples = load_samples(command, &config)?;
    Span::current().record("samples", samples.len());

    ensure_dir(&command.model.checkpoint_dir)?;
    let mut rng = SmallRng::seed_from_u64(config.seed());
    let splits = DatasetSplit::random(samples.len(), &mut rng).apply(&samples);
    let mut generator = GraphGenerator::new(config, &Device::Cpu)?;
    let report = generator.run(&splits, &mut rng)?;

    info!(
        samples = samples.len(),
        generated = report.graphs.len(),
        "command completed"
    );
    Ok(ExecutionSummary {
        corpus: Some(samples.len()),
        report,
    })
}

fn load_samples(command: &RunCommand, config: &GeneratorConfig) -> Result<Vec<Sample>, CliError> {
    let params = config.encoding_params()?;
    let samples = if command.no_cache {
        let corpus = load_corpus(&command.data_dir)?;
        encode_corpus(&corpus.records, params).samples
    } else {
        cached_corpus(&command.data_dir, &command.cache_path(), params)?
    };
    if samples.is_empty() {
        return Err(CliError::EmptyCorpus {
            dir: command.data_dir.clone(),
        });
    }
    Ok(samples)
}

#[instrument(
    name = "cli.generate",
    err,
    skip(command),
    fields(requests = command.stats.len()),
)]
pub(super) fn generate_command(command: &GenerateCommand) -> Result<ExecutionSummary, CliError> {
    let stats = command
        .stats
        .iter()
        .map(|path| read_stats(path))
        .collect::<Result<Vec<StatsVector>, _>>()?;
    let config = command
        .model
        .apply(GeneratorBuilder::new())
        .with_autoencoder_source(ModelSource::LoadCheckpoint)
        .with_denoiser_source(ModelSource::LoadCheckpoint)
        .build()?;
    let mut rng = SmallRng::seed_from_u64(config.seed());
    let mut generator = GraphGenerator::new(config, &Device::Cpu)?;
    generator.load_autoencoder()?;
    generator.load_denoiser()?;
    let graphs = generator.generate(&stats, &mut rng)?;
    info!(generated = graphs.len(), "command completed");
    Ok(ExecutionSummary {
        corpus: None,
        report: GenerationReport {
            autoencoder: None,
            denoiser: None,
            evaluation: None,
            graphs,
        },
    })
}

fn ensure_dir(path: &Path) -> Result<(), CliError> {
    fs::create_dir_all(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `summary` as plain text, one generated graph per table row.
///
/// Each generated graph is listed with its node and edge counts next to the
/// first two fields of its conditioning statistics, which hold the target
/// node and edge counts.
///
/// # Errors
/// Propagates write failures of `writer`.
///
/// # Examples
/// ```
/// # use std::error::Error;
/// # use neugraph_cli::cli::{ExecutionSummary, render_summary};
/// # use neugraph_core::GenerationReport;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let summary = ExecutionSummary {
///     corpus: Some(12),
///     report: GenerationReport::default(),
/// };
/// let mut buffer = Vec::new();
/// render_summary(&summary, &mut buffer)?;
/// assert_eq!(String::from_utf8(buffer)?, "corpus: 12 graphs\ngenerated: 0 graphs\n");
/// # Ok(())
/// # }
/// ```
pub fn render_summary(summary: &ExecutionSummary, mut writer: impl Write) -> io::Result<()> {
    let report = &summary.report;
    if let Some(corpus) = summary.corpus {
        writeln!(writer, "corpus: {corpus} graphs")?;
    }
    for (name, training) in [
        ("autoencoder", &report.autoencoder),
        ("denoiser", &report.denoiser),
    ] {
        if let Some(training) = training {
            writeln!(
                writer,
                "{name}: best epoch {} validation loss {:.6}",
                training.best_epoch, training.best_validation
            )?;
        }
    }
    if let Some(evaluation) = &report.evaluation {
        writeln!(
            writer,
            "reconstruction: mean l1 {:.6} edge accuracy {:.4}",
            evaluation.mean_l1, evaluation.edge_accuracy
        )?;
    }
    writeln!(writer, "generated: {} graphs", report.graphs.len())?;
    if report.graphs.is_empty() {
        return Ok(());
    }
    writeln!(writer, "index\tnodes\tedges\ttarget_nodes\ttarget_edges")?;
    for (index, generated) in report.graphs.iter().enumerate() {
        let target = generated.stats.as_slice();
        writeln!(
            writer,
            "{index}\t{}\t{}\t{}\t{}",
            generated.summary.nodes,
            generated.summary.edges,
            target.first().copied().unwrap_or(f32::NAN),
            target.get(1).copied().unwrap_or(f32::NAN),
        )?;
    }
    Ok(())
}
