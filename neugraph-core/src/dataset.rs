//! Corpus encoding, train/validation/test splitting and minibatch planning.

use std::sync::Arc;

use rand::{RngCore, seq::SliceRandom};
use tracing::{info, instrument, warn};

use crate::{
    canonical::{EncodingParams, canonicalize},
    graph::Graph,
    sample::{Sample, StatsVector},
};

/// Fraction of samples assigned to the training split.
pub const TRAIN_FRACTION: f64 = 0.8;
/// Fraction of samples assigned to the validation split.
pub const VALIDATION_FRACTION: f64 = 0.1;

/// One raw graph paired with its target statistics.
#[derive(Clone, Debug)]
pub struct GraphRecord {
    /// Identifier used in diagnostics, typically the source file stem.
    pub name: Arc<str>,
    /// The graph itself.
    pub graph: Graph,
    /// Statistics describing the graph.
    pub stats: StatsVector,
}

/// Samples produced by [`encode_corpus`].
#[derive(Clone, Debug, Default)]
pub struct EncodedCorpus {
    /// Successfully canonicalised samples, in record order.
    pub samples: Vec<Sample>,
    /// Number of records skipped because they could not be encoded.
    pub skipped: usize,
}

/// Canonicalises every record, skipping graphs that are empty or exceed
/// the encoding capacity.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use neugraph_core::{EncodingParams, Graph, GraphRecord, StatsVector, encode_corpus};
///
/// let records = vec![
///     GraphRecord {
///         name: Arc::from("pair"),
///         graph: Graph::from_edges(2, [(0, 1)])?,
///         stats: StatsVector::default(),
///     },
///     GraphRecord {
///         name: Arc::from("big"),
///         graph: Graph::new(9),
///         stats: StatsVector::default(),
///     },
/// ];
/// let corpus = encode_corpus(&records, EncodingParams::new(4, 2)?);
/// assert_eq!(corpus.samples.len(), 1);
/// assert_eq!(corpus.skipped, 1);
/// # Ok::<(), neugraph_core::NeugraphError>(())
/// ```
#[instrument(
    name = "core.encode_corpus",
    skip(records),
    fields(records = records.len(), n_max = params.n_max(), spectral_dim = params.spectral_dim()),
)]
pub fn encode_corpus(records: &[GraphRecord], params: EncodingParams) -> EncodedCorpus {
    let mut corpus = EncodedCorpus::default();
    for record in records {
        match canonicalize(&record.graph, record.stats, params) {
            Ok(sample) => corpus.samples.push(sample),
            Err(error) => {
                warn!(
                    graph = %record.name,
                    code = error.code().as_str(),
                    %error,
                    "skipping graph"
                );
                record_skip();
                corpus.skipped += 1;
            }
        }
    }
    info!(
        encoded = corpus.samples.len(),
        skipped = corpus.skipped,
        "corpus encoded"
    );
    corpus
}

#[cfg(feature = "metrics")]
fn record_skip() {
    metrics::counter!("graphs_skipped").increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record_skip() {}

/// Index partition of a corpus into training, validation and test sets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetSplit {
    train: Vec<usize>,
    validation: Vec<usize>,
    test: Vec<usize>,
}

impl DatasetSplit {
    /// Shuffles `0..len` and cuts it 80 / 10 / 10.
    ///
    /// The training split takes `floor(0.8·len)` indices, validation
    /// `floor(0.1·len)`, and the test split the remainder.
    ///
    /// # Examples
    /// ```
    /// use neugraph_core::DatasetSplit;
    /// use rand::{SeedableRng, rngs::SmallRng};
    ///
    /// let split = DatasetSplit::random(25, &mut SmallRng::seed_from_u64(13));
    /// assert_eq!(split.train().len(), 20);
    /// assert_eq!(split.validation().len(), 2);
    /// assert_eq!(split.test().len(), 3);
    /// ```
    #[must_use]
    pub fn random(len: usize, rng: &mut dyn RngCore) -> Self {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(rng);
        let train_len = (len as f64 * TRAIN_FRACTION).floor() as usize;
        let validation_len = (len as f64 * VALIDATION_FRACTION).floor() as usize;
        let test = order.split_off((train_len + validation_len).min(len));
        let validation = order.split_off(train_len.min(order.len()));
        Self {
            train: order,
            validation,
            test,
        }
    }

    /// Indices of the training split.
    #[rustfmt::skip]
    #[must_use]
    pub fn train(&self) -> &[usize] { &self.train }

    /// Indices of the validation split.
    #[rustfmt::skip]
    #[must_use]
    pub fn validation(&self) -> &[usize] { &self.validation }

    /// Indices of the test split.
    #[rustfmt::skip]
    #[must_use]
    pub fn test(&self) -> &[usize] { &self.test }

    /// Materialises the three splits from `samples`.
    ///
    /// Indices beyond `samples` are ignored.
    #[must_use]
    pub fn apply<T: Clone>(&self, samples: &[T]) -> SplitSamples<T> {
        let pick = |indices: &[usize]| {
            indices
                .iter()
                .filter_map(|&index| samples.get(index).cloned())
                .collect()
        };
        SplitSamples {
            train: pick(&self.train),
            validation: pick(&self.validation),
            test: pick(&self.test),
        }
    }
}

/// Owned samples of each split.
#[derive(Clone, Debug, Default)]
pub struct SplitSamples<T> {
    /// Samples used for gradient steps.
    pub train: Vec<T>,
    /// Samples used for checkpoint selection.
    pub validation: Vec<T>,
    /// Held-out samples used for evaluation and generation targets.
    pub test: Vec<T>,
}

/// Plans minibatches over `len` items.
///
/// Items are visited in order, or in a fresh random order when `shuffle`
/// carries an RNG. The final batch may be short. A `batch_size` of zero is
/// treated as one.
///
/// # Examples
/// ```
/// use neugraph_core::minibatches;
///
/// let batches = minibatches(5, 2, None);
/// assert_eq!(batches, vec![vec![0, 1], vec![2, 3], vec![4]]);
/// ```
#[must_use]
pub fn minibatches(
    len: usize,
    batch_size: usize,
    shuffle: Option<&mut dyn RngCore>,
) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..len).collect();
    if let Some(rng) = shuffle {
        order.shuffle(rng);
    }
    order
        .chunks(batch_size.max(1))
        .map(<[usize]>::to_vec)
        .collect()
}
