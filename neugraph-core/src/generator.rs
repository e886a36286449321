//! Two-stage training and conditional graph generation.
//!
//! [`GraphGenerator`] owns both models and their optimisers. The autoencoder
//! is trained (or restored) first and then frozen; the denoiser is trained on
//! latents re-encoded from the frozen encoder every epoch. Generation runs
//! the reverse diffusion process per requested statistics vector, decodes the
//! latent and thresholds the result into a [`Graph`].

use candle_core::{Device, Tensor};
use rand::RngCore;
use tracing::{debug, info, instrument};

use crate::{
    autoencoder::{LatentAutoencoder, Phase, build_autoencoder},
    builder::{GeneratorConfig, ModelSource},
    checkpoint::{load_checkpoint, save_checkpoint},
    dataset::{SplitSamples, minibatches},
    diffusion::{DenoiseNetwork, DiffusionSchedule, denoising_loss, sample_loop},
    error::{NeugraphError, Result},
    graph::{Graph, GraphSummary},
    optim::{Adam, StepLr},
    sample::{GraphBatch, Sample, StatsVector, stats_tensor},
};

/// Epoch interval between denoiser progress logs.
const DENOISER_LOG_EVERY: usize = 5;

/// Losses recorded for one epoch, averaged per graph.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochLoss {
    /// One-based epoch number.
    pub epoch: usize,
    /// Mean training objective.
    pub train: f64,
    /// Mean validation objective.
    pub validation: f64,
}

/// Outcome of one training stage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingReport {
    /// Every epoch, in order.
    pub epochs: Vec<EpochLoss>,
    /// Epoch whose parameters were checkpointed last.
    pub best_epoch: usize,
    /// Validation loss of [`TrainingReport::best_epoch`].
    pub best_validation: f64,
}

/// Reconstruction quality of the autoencoder on held-out graphs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconstructionReport {
    /// Number of graphs evaluated.
    pub graphs: usize,
    /// Mean absolute error between decoded and true adjacency.
    pub mean_l1: f64,
    /// Fraction of adjacency cells whose thresholded value is correct.
    pub edge_accuracy: f64,
}

/// One generated graph with the statistics it was conditioned on.
#[derive(Clone, Debug)]
pub struct GeneratedGraph {
    /// Graph built from the thresholded decoded adjacency.
    pub graph: Graph,
    /// Conditioning statistics.
    pub stats: StatsVector,
    /// Size summary of [`GeneratedGraph::graph`].
    pub summary: GraphSummary,
}

/// Results of a full [`GraphGenerator::run`].
#[derive(Clone, Debug, Default)]
pub struct GenerationReport {
    /// Autoencoder training, absent when restored from a checkpoint.
    pub autoencoder: Option<TrainingReport>,
    /// Denoiser training, absent when restored from a checkpoint.
    pub denoiser: Option<TrainingReport>,
    /// Autoencoder quality on the test split, absent when it is empty.
    pub evaluation: Option<ReconstructionReport>,
    /// One graph per test-split statistics vector.
    pub graphs: Vec<GeneratedGraph>,
}

/// Owns the autoencoder, the denoiser and their optimisers.
pub struct GraphGenerator {
    config: GeneratorConfig,
    device: Device,
    schedule: DiffusionSchedule,
    autoencoder: Box<dyn LatentAutoencoder>,
    autoencoder_optimizer: Adam,
    denoiser: DenoiseNetwork,
    denoiser_optimizer: Adam,
}

impl GraphGenerator {
    /// Builds both models with fresh parameters.
    ///
    /// # Errors
    /// Surfaces schedule construction failures and propagates tensor
    /// allocation failures.
    pub fn new(config: GeneratorConfig, device: &Device) -> Result<Self> {
        let schedule = config.schedule()?;
        let autoencoder = build_autoencoder(
            config.autoencoder_kind(),
            config.autoencoder_config(),
            device,
        )?;
        let autoencoder_optimizer = Adam::new(autoencoder.var_map(), config.learning_rate)?;
        let denoiser = DenoiseNetwork::new(config.denoiser_config(), device)?;
        let denoiser_optimizer = Adam::new(denoiser.var_map(), config.learning_rate)?;
        Ok(Self {
            config,
            device: device.clone(),
            schedule,
            autoencoder,
            autoencoder_optimizer,
            denoiser,
            denoiser_optimizer,
        })
    }

    /// Configuration the generator was built with.
    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// The autoencoder in use.
    #[must_use]
    pub fn autoencoder(&self) -> &dyn LatentAutoencoder {
        self.autoencoder.as_ref()
    }

    /// The denoiser in use.
    #[must_use]
    pub fn denoiser(&self) -> &DenoiseNetwork {
        &self.denoiser
    }

    /// The noise schedule shared by training and sampling.
    #[must_use]
    pub fn schedule(&self) -> &DiffusionSchedule {
        &self.schedule
    }

    /// Optimiser state of the autoencoder.
    #[must_use]
    pub fn autoencoder_optimizer(&self) -> &Adam {
        &self.autoencoder_optimizer
    }

    /// Optimiser state of the denoiser.
    #[must_use]
    pub fn denoiser_optimizer(&self) -> &Adam {
        &self.denoiser_optimizer
    }

    /// Trains or restores the autoencoder according to its [`ModelSource`].
    ///
    /// # Errors
    /// See [`GraphGenerator::train_autoencoder`] and
    /// [`GraphGenerator::load_autoencoder`].
    pub fn prepare_autoencoder(
        &mut self,
        train: &[Sample],
        validation: &[Sample],
        rng: &mut dyn RngCore,
    ) -> Result<Option<TrainingReport>> {
        match self.config.autoencoder_source {
            ModelSource::TrainFresh => self.train_autoencoder(train, validation, rng).map(Some),
            ModelSource::LoadCheckpoint => self.load_autoencoder().map(|()| None),
        }
    }

    /// Trains or restores the denoiser according to its [`ModelSource`].
    ///
    /// # Errors
    /// See [`GraphGenerator::train_denoiser`] and
    /// [`GraphGenerator::load_denoiser`].
    pub fn prepare_denoiser(
        &mut self,
        train: &[Sample],
        validation: &[Sample],
        rng: &mut dyn RngCore,
    ) -> Result<Option<TrainingReport>> {
        match self.config.denoiser_source {
            ModelSource::TrainFresh => self.train_denoiser(train, validation, rng).map(Some),
            ModelSource::LoadCheckpoint => self.load_denoiser().map(|()| None),
        }
    }

    /// Restores the autoencoder from its checkpoint.
    ///
    /// # Errors
    /// Returns [`crate::CheckpointError::Missing`] (wrapped) when the file
    /// does not exist, and other checkpoint errors when it does not match
    /// the model.
    pub fn load_autoencoder(&mut self) -> Result<()> {
        load_checkpoint(
            &self.config.checkpoints.autoencoder,
            self.autoencoder.var_map(),
            &mut self.autoencoder_optimizer,
        )?;
        Ok(())
    }

    /// Restores the denoiser from its checkpoint.
    ///
    /// # Errors
    /// As for [`GraphGenerator::load_autoencoder`].
    pub fn load_denoiser(&mut self) -> Result<()> {
        load_checkpoint(
            &self.config.checkpoints.denoiser,
            self.denoiser.var_map(),
            &mut self.denoiser_optimizer,
        )?;
        Ok(())
    }

    fn collate(&self, samples: &[Sample], indices: &[usize]) -> Result<GraphBatch> {
        let picked: Vec<&Sample> = indices.iter().filter_map(|&i| samples.get(i)).collect();
        GraphBatch::collate(&picked, &self.device)
    }

    /// Evaluation-mode autoencoder objective averaged over the graphs of
    /// `samples`.
    ///
    /// # Errors
    /// Returns [`NeugraphError::EmptySplit`] for an empty slice and
    /// propagates tensor failures.
    pub fn autoencoder_loss(&self, samples: &[Sample], rng: &mut dyn RngCore) -> Result<f64> {
        ensure_non_empty(samples, "validation")?;
        let mut totals = LossTotals::default();
        for indices in minibatches(samples.len(), self.config.batch_size, None) {
            let batch = self.collate(samples, &indices)?;
            let loss = self.autoencoder.loss(&batch, Phase::Eval, rng)?;
            totals.add(batch.graph_count(), &loss.total, None, None)?;
        }
        Ok(totals.mean())
    }

    /// Trains the autoencoder, checkpointing every epoch whose validation
    /// loss is no worse than the best so far, then restores the best
    /// checkpoint.
    ///
    /// # Errors
    /// Returns [`NeugraphError::EmptySplit`] when either split is empty,
    /// [`NeugraphError::NonFiniteLoss`] when an epoch diverges, and
    /// propagates tensor and checkpoint failures.
    #[instrument(
        name = "core.train_autoencoder",
        err,
        skip(self, train, validation, rng),
        fields(
            kind = %self.autoencoder.kind(),
            train = train.len(),
            validation = validation.len(),
            epochs = self.config.epochs_autoencoder,
        ),
    )]
    pub fn train_autoencoder(
        &mut self,
        train: &[Sample],
        validation: &[Sample],
        rng: &mut dyn RngCore,
    ) -> Result<TrainingReport> {
        ensure_non_empty(train, "train")?;
        ensure_non_empty(validation, "validation")?;
        let mut scheduler = StepLr::new(
            self.config.learning_rate,
            self.config.lr_step_size,
            self.config.lr_gamma,
        );
        let mut report = TrainingReport {
            best_validation: f64::INFINITY,
            ..TrainingReport::default()
        };
        for epoch in 1..=self.config.epochs_autoencoder {
            let mut totals = LossTotals::default();
            for indices in minibatches(train.len(), self.config.batch_size, Some(&mut *rng)) {
                let batch = self.collate(train, &indices)?;
                let loss = self.autoencoder.loss(&batch, Phase::Train, rng)?;
                self.autoencoder_optimizer.backward_step(&loss.total)?;
                totals.add(
                    batch.graph_count(),
                    &loss.total,
                    Some(&loss.reconstruction),
                    loss.kl.as_ref(),
                )?;
            }
            let entry = EpochLoss {
                epoch,
                train: totals.mean(),
                validation: self.autoencoder_loss(validation, rng)?,
            };
            info!(
                epoch,
                train_loss = entry.train,
                val_loss = entry.validation,
                reconstruction = totals.mean_reconstruction(),
                kl = totals.mean_kl(),
                lr = self.autoencoder_optimizer.learning_rate(),
                "autoencoder epoch"
            );
            record_epoch_loss("autoencoder_epoch_loss", entry.train);
            ensure_finite(&entry, "autoencoder")?;
            if entry.validation <= report.best_validation {
                save_checkpoint(
                    &self.config.checkpoints.autoencoder,
                    self.autoencoder.var_map(),
                    &self.autoencoder_optimizer,
                )?;
                report.best_validation = entry.validation;
                report.best_epoch = epoch;
            }
            report.epochs.push(entry);
            scheduler.step(&mut self.autoencoder_optimizer);
        }
        if report.best_epoch > 0 {
            self.load_autoencoder()?;
        }
        Ok(report)
    }

    /// Trains the denoiser on latents from the frozen autoencoder.
    ///
    /// Latents are recomputed with the encoder in evaluation mode for every
    /// minibatch of every epoch and detached from the autoencoder graph.
    ///
    /// # Errors
    /// Returns [`NeugraphError::EmptySplit`] when either split is empty,
    /// [`NeugraphError::NonFiniteLoss`] when an epoch diverges, and
    /// propagates tensor and checkpoint failures.
    #[instrument(
        name = "core.train_denoiser",
        err,
        skip(self, train, validation, rng),
        fields(
            train = train.len(),
            validation = validation.len(),
            epochs = self.config.epochs_denoise,
            timesteps = self.schedule.timesteps(),
        ),
    )]
    pub fn train_denoiser(
        &mut self,
        train: &[Sample],
        validation: &[Sample],
        rng: &mut dyn RngCore,
    ) -> Result<TrainingReport> {
        ensure_non_empty(train, "train")?;
        ensure_non_empty(validation, "validation")?;
        let mut scheduler = StepLr::new(
            self.config.learning_rate,
            self.config.lr_step_size,
            self.config.lr_gamma,
        );
        let mut report = TrainingReport {
            best_validation: f64::INFINITY,
            ..TrainingReport::default()
        };
        for epoch in 1..=self.config.epochs_denoise {
            let mut totals = LossTotals::default();
            for indices in minibatches(train.len(), self.config.batch_size, Some(&mut *rng)) {
                let batch = self.collate(train, &indices)?;
                let latent = self.autoencoder.encode(&batch, Phase::Eval, rng)?.detach();
                let loss = denoising_loss(
                    &self.denoiser,
                    &self.schedule,
                    &latent,
                    batch.stats(),
                    Phase::Train,
                    rng,
                )?;
                self.denoiser_optimizer.backward_step(&loss)?;
                totals.add(batch.graph_count(), &loss, None, None)?;
            }
            let mut validation_totals = LossTotals::default();
            for indices in minibatches(validation.len(), self.config.batch_size, None) {
                let batch = self.collate(validation, &indices)?;
                let latent = self.autoencoder.encode(&batch, Phase::Eval, rng)?;
                let loss = denoising_loss(
                    &self.denoiser,
                    &self.schedule,
                    &latent,
                    batch.stats(),
                    Phase::Eval,
                    rng,
                )?;
                validation_totals.add(batch.graph_count(), &loss, None, None)?;
            }
            let entry = EpochLoss {
                epoch,
                train: totals.mean(),
                validation: validation_totals.mean(),
            };
            if epoch % DENOISER_LOG_EVERY == 0 {
                info!(
                    epoch,
                    train_loss = entry.train,
                    val_loss = entry.validation,
                    lr = self.denoiser_optimizer.learning_rate(),
                    "denoiser epoch"
                );
            } else {
                debug!(
                    epoch,
                    train_loss = entry.train,
                    val_loss = entry.validation,
                    "denoiser epoch"
                );
            }
            record_epoch_loss("denoiser_epoch_loss", entry.train);
            ensure_finite(&entry, "denoiser")?;
            if entry.validation <= report.best_validation {
                save_checkpoint(
                    &self.config.checkpoints.denoiser,
                    self.denoiser.var_map(),
                    &self.denoiser_optimizer,
                )?;
                report.best_validation = entry.validation;
                report.best_epoch = epoch;
            }
            report.epochs.push(entry);
            scheduler.step(&mut self.denoiser_optimizer);
        }
        if report.best_epoch > 0 {
            self.load_denoiser()?;
        }
        Ok(report)
    }

    /// Measures reconstruction error and thresholded edge accuracy on
    /// `test`.
    ///
    /// # Errors
    /// Returns [`NeugraphError::EmptySplit`] for an empty split and
    /// propagates tensor failures.
    #[instrument(name = "core.evaluate_autoencoder", err, skip(self, test, rng), fields(graphs = test.len()))]
    pub fn evaluate_autoencoder(
        &self,
        test: &[Sample],
        rng: &mut dyn RngCore,
    ) -> Result<ReconstructionReport> {
        ensure_non_empty(test, "test")?;
        let threshold = f64::from(self.config.edge_threshold);
        let mut l1 = 0.0;
        let mut correct = 0.0;
        let mut cells = 0.0;
        for indices in minibatches(test.len(), self.config.batch_size, None) {
            let batch = self.collate(test, &indices)?;
            let latent = self.autoencoder.encode(&batch, Phase::Eval, rng)?;
            let decoded = self.autoencoder.decode(&latent)?;
            let truth = batch.adjacency();
            l1 += scalar((&decoded - truth)?.abs()?.sum_all()?)?;
            let predicted = decoded.gt(threshold)?.to_dtype(truth.dtype())?;
            correct += scalar(predicted.eq(truth)?.to_dtype(truth.dtype())?.sum_all()?)?;
            cells += truth.elem_count() as f64;
        }
        let report = ReconstructionReport {
            graphs: test.len(),
            mean_l1: l1 / cells.max(1.0),
            edge_accuracy: correct / cells.max(1.0),
        };
        info!(
            mean_l1 = report.mean_l1,
            edge_accuracy = report.edge_accuracy,
            "autoencoder evaluated"
        );
        Ok(report)
    }

    /// Generates one graph per statistics vector.
    ///
    /// Requests are processed in chunks of the configured batch size; each
    /// chunk runs the full reverse process with per-row conditioning, then
    /// decodes and thresholds every latent.
    ///
    /// # Errors
    /// Propagates tensor failures.
    #[instrument(name = "core.generate", err, skip(self, stats, rng), fields(requests = stats.len()))]
    pub fn generate(
        &self,
        stats: &[StatsVector],
        rng: &mut dyn RngCore,
    ) -> Result<Vec<GeneratedGraph>> {
        let n_max = self.config.n_max;
        let mut generated = Vec::with_capacity(stats.len());
        for chunk in stats.chunks(self.config.batch_size.max(1)) {
            let condition = stats_tensor(chunk, &self.device)?;
            let latent = sample_loop(&self.denoiser, &self.schedule, &condition, rng)?;
            let decoded = self.autoencoder.decode(&latent)?;
            let rows = decoded.reshape((chunk.len(), n_max * n_max))?.to_vec2::<f32>()?;
            for (values, target) in rows.iter().zip(chunk) {
                let graph = Graph::from_adjacency(values, n_max, self.config.edge_threshold);
                let summary = graph.summary();
                debug!(nodes = summary.nodes, edges = summary.edges, "graph generated");
                generated.push(GeneratedGraph {
                    graph,
                    stats: *target,
                    summary,
                });
            }
        }
        info!(graphs = generated.len(), "generation finished");
        Ok(generated)
    }

    /// Runs the whole pipeline over pre-split samples: prepare the
    /// autoencoder, evaluate it, prepare the denoiser, then generate one
    /// graph per test-split statistics vector.
    ///
    /// # Errors
    /// Propagates failures of every stage.
    #[instrument(
        name = "core.run",
        err,
        skip(self, splits, rng),
        fields(
            train = splits.train.len(),
            validation = splits.validation.len(),
            test = splits.test.len(),
        ),
    )]
    pub fn run(
        &mut self,
        splits: &SplitSamples<Sample>,
        rng: &mut dyn RngCore,
    ) -> Result<GenerationReport> {
        let autoencoder = self.prepare_autoencoder(&splits.train, &splits.validation, rng)?;
        let evaluation = if splits.test.is_empty() {
            None
        } else {
            Some(self.evaluate_autoencoder(&splits.test, rng)?)
        };
        let denoiser = self.prepare_denoiser(&splits.train, &splits.validation, rng)?;
        let targets: Vec<StatsVector> = splits.test.iter().map(|s| *s.stats()).collect();
        let graphs = self.generate(&targets, rng)?;
        Ok(GenerationReport {
            autoencoder,
            denoiser,
            evaluation,
            graphs,
        })
    }
}

fn ensure_non_empty(samples: &[Sample], split: &'static str) -> Result<()> {
    if samples.is_empty() {
        return Err(NeugraphError::EmptySplit { split });
    }
    Ok(())
}

fn ensure_finite(entry: &EpochLoss, phase: &'static str) -> Result<()> {
    for (split, loss) in [("train", entry.train), ("validation", entry.validation)] {
        if !loss.is_finite() {
            return Err(NeugraphError::NonFiniteLoss {
                phase,
                epoch: entry.epoch,
                split,
                loss,
            });
        }
    }
    Ok(())
}

fn scalar(tensor: Tensor) -> Result<f64> {
    Ok(f64::from(tensor.to_dtype(candle_core::DType::F32)?.to_scalar::<f32>()?))
}

/// Accumulates batch losses weighted by graph count.
///
/// Each batch scalar is already a per-graph mean, so the fields hold sums of
/// per-graph losses and the accessors divide by `graphs` to return per-graph
/// means over the epoch.
#[derive(Default)]
struct LossTotals {
    /// Graphs seen so far.
    graphs: usize,
    /// Sum over graphs of the per-graph training objective.
    total: f64,
    /// Sum over graphs of the per-graph reconstruction error.
    reconstruction: f64,
    /// Sum over graphs of the per-graph KL term; zero for the plain model.
    kl: f64,
}

impl LossTotals {
    fn add(
        &mut self,
        graphs: usize,
        total: &Tensor,
        reconstruction: Option<&Tensor>,
        kl: Option<&Tensor>,
    ) -> Result<()> {
        let weight = graphs as f64;
        self.graphs += graphs;
        self.total += scalar(total.clone())? * weight;
        if let Some(reconstruction) = reconstruction {
            self.reconstruction += scalar(reconstruction.clone())? * weight;
        }
        if let Some(kl) = kl {
            self.kl += scalar(kl.clone())? * weight;
        }
        Ok(())
    }

    fn per_graph(&self, sum: f64) -> f64 {
        if self.graphs == 0 {
            0.0
        } else {
            sum / self.graphs as f64
        }
    }

    fn mean(&self) -> f64 {
        self.per_graph(self.total)
    }

    fn mean_reconstruction(&self) -> f64 {
        self.per_graph(self.reconstruction)
    }

    fn mean_kl(&self) -> f64 {
        self.per_graph(self.kl)
    }
}

#[cfg(feature = "metrics")]
fn record_epoch_loss(name: &'static str, loss: f64) {
    metrics::gauge!(name).set(loss);
}

#[cfg(not(feature = "metrics"))]
fn record_epoch_loss(_name: &'static str, _loss: f64) {}
