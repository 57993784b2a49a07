use std::{
    fmt::{self, Display},
    sync::Arc,
};

use corpus::{DistributedDataset, Document, Pinned};
use log::{debug, warn};
use parameter_server::{MergeRule, ServerHandle};
use parking_lot::Mutex;

use crate::{
    error::{InferenceErr, Result},
    gibbs::GibbsLda,
    hdp::OnlineHdp,
    online::OnlineLda,
    params::{Algorithm, InferenceParams},
};

/// The per-document result of local inference.
#[derive(Debug, Clone, PartialEq)]
pub struct DocDiagnostics {
    pub id: u64,
    /// The variational document-topic parameters, or the smoothed sampled topic counts.
    pub gamma: Vec<f64>,
}

/// The diagnostics dataset produced by an iteration over `D`, pinned until dropped.
pub type Diagnostics<D> =
    Pinned<DocDiagnostics, <D as DistributedDataset<Document>>::Derived<DocDiagnostics>>;

/// The score of a batch under the current model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    Perplexity(f64),
    /// The document-level perplexity and the topic-level term of the bound.
    Hdp { document: f64, topic: f64 },
}

impl Score {
    /// The perplexity of the batch documents.
    pub fn perplexity(&self) -> f64 {
        match *self {
            Score::Perplexity(p) => p,
            Score::Hdp { document, .. } => document,
        }
    }
}

impl Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Perplexity(p) => write!(f, "{p:.4}"),
            Score::Hdp { document, topic } => write!(f, "({document:.4}, {topic:.4})"),
        }
    }
}

/// A state machine fitting a topic model one batch at a time.
///
/// The global model lives in the parameter server, the optimizer only holds
/// its hyperparameters and reaches the model through the handle it receives.
pub trait Optimizer {
    /// Runs local inference on every document of `batch` and merges the
    /// resulting statistics into the global model with exactly one commit.
    ///
    /// # Returns
    /// The per-document diagnostics, pinned and materialized. Dropping them releases the cache.
    fn next<D>(&mut self, server: &ServerHandle, batch: &D) -> Result<Diagnostics<D>>
    where
        D: DistributedDataset<Document>;

    /// Scores `batch` against the current global model, never modifying it.
    fn perplexity<D>(
        &self,
        server: &ServerHandle,
        batch: &D,
        diagnostics: &D::Derived<DocDiagnostics>,
    ) -> Result<Score>
    where
        D: DistributedDataset<Document>;
}

/// The optimizer picked by the configured algorithm.
#[derive(Debug, Clone)]
pub enum TopicOptimizer {
    OnlineLda(OnlineLda),
    GibbsLda(GibbsLda),
    OnlineHdp(OnlineHdp),
}

impl TopicOptimizer {
    /// Binds `algorithm` to the model distributed in `server`.
    ///
    /// # Errors
    /// `NoTopics`, `NoVocabulary` or `InvalidParam` on invalid parameters,
    /// `ShapeMismatch` if the server holds a model with another layout.
    pub fn initialize(
        algorithm: Algorithm,
        params: InferenceParams,
        server: &ServerHandle,
    ) -> Result<Self> {
        params.validate(algorithm)?;

        let expected = (params.topics, params.vocab, algorithm.extra_params(params.topics));
        let got = (server.topics(), server.vocab(), server.extra());
        if expected != got {
            return Err(InferenceErr::ShapeMismatch { expected, got });
        }

        debug!("initialized {algorithm} optimizer with {params:?}");

        Ok(match algorithm {
            Algorithm::OnlineLda => TopicOptimizer::OnlineLda(OnlineLda::new(params)?),
            Algorithm::GibbsLda => TopicOptimizer::GibbsLda(GibbsLda::new(params)),
            Algorithm::OnlineHdp => TopicOptimizer::OnlineHdp(OnlineHdp::new(params)),
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            TopicOptimizer::OnlineLda(_) => Algorithm::OnlineLda,
            TopicOptimizer::GibbsLda(_) => Algorithm::GibbsLda,
            TopicOptimizer::OnlineHdp(_) => Algorithm::OnlineHdp,
        }
    }

    pub fn params(&self) -> &InferenceParams {
        match self {
            TopicOptimizer::OnlineLda(o) => o.params(),
            TopicOptimizer::GibbsLda(o) => o.params(),
            TopicOptimizer::OnlineHdp(o) => o.params(),
        }
    }
}

impl Optimizer for TopicOptimizer {
    fn next<D>(&mut self, server: &ServerHandle, batch: &D) -> Result<Diagnostics<D>>
    where
        D: DistributedDataset<Document>,
    {
        match self {
            TopicOptimizer::OnlineLda(o) => o.next(server, batch),
            TopicOptimizer::GibbsLda(o) => o.next(server, batch),
            TopicOptimizer::OnlineHdp(o) => o.next(server, batch),
        }
    }

    fn perplexity<D>(
        &self,
        server: &ServerHandle,
        batch: &D,
        diagnostics: &D::Derived<DocDiagnostics>,
    ) -> Result<Score>
    where
        D: DistributedDataset<Document>,
    {
        match self {
            TopicOptimizer::OnlineLda(o) => o.perplexity(server, batch, diagnostics),
            TopicOptimizer::GibbsLda(o) => o.perplexity(server, batch, diagnostics),
            TopicOptimizer::OnlineHdp(o) => o.perplexity(server, batch, diagnostics),
        }
    }
}

/// The statistics each partition produced during one `next` call.
///
/// Partitions store into their slot while the diagnostics are evaluated and
/// the slots are drained once, after the barrier. Any later evaluation of the
/// same lineage finds the slots drained and keeps nothing.
#[derive(Debug, Clone)]
struct PartitionStats(Arc<Mutex<Option<Vec<Option<Vec<f64>>>>>>);

impl PartitionStats {
    fn new(partitions: usize) -> Self {
        Self(Arc::new(Mutex::new(Some(vec![None; partitions]))))
    }

    fn store(&self, partition: usize, stats: Vec<f64>) {
        if let Some(slot) = self
            .0
            .lock()
            .as_mut()
            .and_then(|slots| slots.get_mut(partition))
        {
            *slot = Some(stats);
        }
    }

    /// Takes every stored buffer, leaving the slots closed for good.
    fn drain(&self) -> Vec<Vec<f64>> {
        self.0.lock().take().into_iter().flatten().flatten().collect()
    }
}

/// Runs one stochastic iteration over `batch`.
///
/// Every partition runs `infer` over its documents, accumulating sufficient
/// statistics in a buffer of the model's size. Once every partition is done,
/// each buffer is pushed to the server exactly once, `rule` builds the merge
/// rule from the amount of documents in the batch and it is committed.
pub(crate) fn stochastic_step<D, F, R>(
    server: &ServerHandle,
    batch: &D,
    infer: F,
    rule: R,
) -> Result<Diagnostics<D>>
where
    D: DistributedDataset<Document>,
    F: Fn(usize, &[Document], &mut [f64]) -> Vec<DocDiagnostics> + Send + Sync + 'static,
    R: FnOnce(usize) -> MergeRule,
{
    let partition_stats = PartitionStats::new(batch.num_partitions());
    let sink = partition_stats.clone();
    let len = server.len();

    let diagnostics = batch.map_partitions(move |partition, docs| {
        if docs.is_empty() {
            return Vec::new();
        }

        let mut stats = vec![0.; len];
        let out = infer(partition, docs, &mut stats);
        sink.store(partition, stats);
        out
    });

    let (diagnostics, docs) = Pinned::<DocDiagnostics, _>::materialized(diagnostics);

    for stats in partition_stats.drain() {
        server.push(&stats)?;
    }

    if docs == 0 {
        warn!("empty batch, the model only decays towards its prior");
    }

    server.commit(&rule(docs))?;
    Ok(diagnostics)
}

/// The amount of documents in the training set, used to scale the batch statistics.
pub(crate) fn corpus_scale(server: &ServerHandle, batch_docs: usize) -> f64 {
    let batch_docs = batch_docs.max(1) as f64;
    match server.train_set_size() {
        0 => 1.,
        n => n as f64 / batch_docs,
    }
}

/// Partial sums of a per-document log likelihood.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct LogLikelihood {
    pub(crate) value: f64,
    pub(crate) words: f64,
    pub(crate) docs: usize,
}

impl LogLikelihood {
    pub(crate) fn merge(self, other: Self) -> Self {
        Self {
            value: self.value + other.value,
            words: self.words + other.words,
            docs: self.docs + other.docs,
        }
    }

    /// `exp(-value / words)`, `NaN` for a batch without words.
    pub(crate) fn perplexity(&self) -> f64 {
        if self.words > 0. {
            (-self.value / self.words).exp()
        } else {
            f64::NAN
        }
    }
}

/// Folds `score` over every pair of document and diagnostics of the batch.
pub(crate) fn score_documents<D, F>(
    batch: &D,
    diagnostics: &D::Derived<DocDiagnostics>,
    score: F,
) -> LogLikelihood
where
    D: DistributedDataset<Document>,
    F: Fn(&Document, &DocDiagnostics) -> f64 + Send + Sync + 'static,
{
    let scored = batch.zip_partitions(diagnostics, move |_, docs, diags| {
        debug_assert_eq!(docs.len(), diags.len());

        docs.iter()
            .zip(diags)
            .map(|(doc, diag)| LogLikelihood {
                value: score(doc, diag),
                words: doc.words(),
                docs: 1,
            })
            .collect()
    });

    scored.aggregate(LogLikelihood::default(), |acc, ll| acc.merge(*ll), LogLikelihood::merge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_stats_drain_once() {
        let stats = PartitionStats::new(3);
        stats.store(0, vec![1., 2.]);
        stats.store(2, vec![3., 4.]);
        stats.store(2, vec![5., 6.]);

        assert_eq!(stats.drain(), [vec![1., 2.], vec![5., 6.]]);

        stats.store(1, vec![7., 8.]);
        assert!(stats.drain().is_empty());
    }

    #[test]
    fn out_of_range_partition_is_ignored() {
        let stats = PartitionStats::new(1);
        stats.store(4, vec![1.]);
        assert!(stats.drain().is_empty());
    }

    #[test]
    fn log_likelihood_without_words_is_nan() {
        assert!(LogLikelihood::default().perplexity().is_nan());
    }
}
