use std::num::NonZeroUsize;

use corpus::{CacheRegistry, Dataset, DistributedDataset, Document, SparseVector};
use inference::{Diagnostics, DocDiagnostics, InferenceErr, Optimizer, Score, TopicOptimizer};
use orchestrator::{
    ConfigErr, TrainErr, TrainingConfig, TrainingConfigBuilder, WindowedTrainer, train_hdp,
    train_lda,
};
use parameter_server::{Checkpoint, ServerHandle, distribute};
use tempfile::TempDir;

const VOCAB: usize = 8;

fn corpus(registry: &CacheRegistry, n: u64) -> Dataset<Document> {
    let docs = (0..n)
        .map(|id| {
            let base = if id % 2 == 0 { 0 } else { 4 };
            let pairs = [(base, 2.), (base + 1, 1.), (base + (id % 3) as u32, 1.)];
            Document::new(id, SparseVector::from_pairs(VOCAB, pairs).unwrap())
        })
        .collect();

    Dataset::parallelize(docs, NonZeroUsize::new(3).unwrap(), registry)
}

fn builder(root: &TempDir) -> TrainingConfigBuilder {
    TrainingConfig::builder()
        .topics(2)
        .vocab_size(VOCAB)
        .max_iterations(2)
        .max_inner_iterations(5)
        .partitions(2)
        .ps_count(2)
        .seed(5)
        .monitor_dir(root.path().to_path_buf())
}

fn server_for(config: &TrainingConfig, root: &TempDir) -> ServerHandle {
    let spec = config.algorithm().model_spec(&config.inference_params());
    distribute(spec, config.ps_count(), root.path()).unwrap().0
}

/// Checks the batch is pinned while iterated and can fail on demand.
struct Recorder {
    inner: TopicOptimizer,
    registry: CacheRegistry,
    batches: Vec<u64>,
    fail_scoring_at: Option<usize>,
}

impl Recorder {
    fn new(config: &TrainingConfig, server: &ServerHandle, registry: &CacheRegistry) -> Self {
        let inner =
            TopicOptimizer::initialize(config.algorithm(), config.inference_params(), server)
                .unwrap();

        Self {
            inner,
            registry: registry.clone(),
            batches: Vec::new(),
            fail_scoring_at: None,
        }
    }
}

impl Optimizer for Recorder {
    fn next<D>(&mut self, server: &ServerHandle, batch: &D) -> inference::Result<Diagnostics<D>>
    where
        D: DistributedDataset<Document>,
    {
        assert!(batch.is_pinned());
        assert!(self.registry.is_cached(batch.id()));
        self.batches.push(batch.id());
        self.inner.next(server, batch)
    }

    fn perplexity<D>(
        &self,
        server: &ServerHandle,
        batch: &D,
        diagnostics: &D::Derived<DocDiagnostics>,
    ) -> inference::Result<Score>
    where
        D: DistributedDataset<Document>,
    {
        assert!(diagnostics.is_pinned());

        let first = self.inner.perplexity(server, batch, diagnostics)?;
        let second = self.inner.perplexity(server, batch, diagnostics)?;
        assert_eq!(first, second);
        Ok(first)
    }
}

/// Fails the scoring of the `n`-th iteration, after its diagnostics were pinned.
struct FailingRecorder(Recorder);

impl Optimizer for FailingRecorder {
    fn next<D>(&mut self, server: &ServerHandle, batch: &D) -> inference::Result<Diagnostics<D>>
    where
        D: DistributedDataset<Document>,
    {
        self.0.next(server, batch)
    }

    fn perplexity<D>(
        &self,
        server: &ServerHandle,
        batch: &D,
        diagnostics: &D::Derived<DocDiagnostics>,
    ) -> inference::Result<Score>
    where
        D: DistributedDataset<Document>,
    {
        let seen = self.0.batches.len();
        if self.0.fail_scoring_at == Some(seen) {
            return Err(InferenceErr::ShapeMismatch {
                expected: (0, 0, 0),
                got: (0, 0, 0),
            });
        }
        self.0.perplexity(server, batch, diagnostics)
    }
}

#[test]
fn window_not_smaller_than_corpus_trains_nothing() {
    let root = tempfile::tempdir().unwrap();
    let registry = CacheRegistry::new();
    let config = builder(&root).corpus_size(10).window_size(10).build().unwrap();
    let server = server_for(&config, &root);
    let mut recorder = Recorder::new(&config, &server, &registry);

    let report = WindowedTrainer::new(&config)
        .run(&corpus(&registry, 10), &mut recorder, &server)
        .unwrap();

    assert!(report.windows.is_empty());
    assert!(recorder.batches.is_empty());
    assert_eq!(server.iteration(), 0);
}

#[test]
fn iteration_counter_follows_windows() {
    let root = tempfile::tempdir().unwrap();
    let registry = CacheRegistry::new();
    let config = builder(&root).corpus_size(25).window_size(10).build().unwrap();
    let server = server_for(&config, &root);
    let mut recorder = Recorder::new(&config, &server, &registry);

    let report = WindowedTrainer::new(&config)
        .run(&corpus(&registry, 25), &mut recorder, &server)
        .unwrap();

    assert_eq!(report.windows.len(), 2);
    assert_eq!(report.iterations(), 4);
    assert_eq!(server.iteration(), 2 * 2);
    assert_eq!(server.train_set_size(), 25);

    let counters: Vec<u64> = report
        .windows
        .iter()
        .flat_map(|w| w.iterations.iter().map(|it| it.iteration))
        .collect();
    assert_eq!(counters, vec![1, 2, 3, 4]);
    assert!(report.windows.iter().all(|w| w.documents == 10));
}

#[test]
fn exact_multiple_skips_the_last_window() {
    let root = tempfile::tempdir().unwrap();
    let registry = CacheRegistry::new();
    let config = builder(&root)
        .corpus_size(30)
        .window_size(10)
        .max_iterations(1)
        .build()
        .unwrap();
    let server = server_for(&config, &root);
    let mut recorder = Recorder::new(&config, &server, &registry);

    let report = WindowedTrainer::new(&config)
        .run(&corpus(&registry, 30), &mut recorder, &server)
        .unwrap();

    let ranges: Vec<_> = report.windows.iter().map(|w| w.window.range()).collect();
    assert_eq!(ranges, vec![0..10, 10..20]);
    assert_eq!(server.iteration(), 2);
}

#[test]
fn batches_are_released_after_every_window() {
    let root = tempfile::tempdir().unwrap();
    let registry = CacheRegistry::new();
    let config = builder(&root).corpus_size(31).window_size(10).build().unwrap();
    let server = server_for(&config, &root);
    let mut recorder = Recorder::new(&config, &server, &registry);

    WindowedTrainer::new(&config)
        .run(&corpus(&registry, 31), &mut recorder, &server)
        .unwrap();

    // Three windows, two iterations each, one batch per window.
    assert_eq!(recorder.batches.len(), 6);
    recorder.batches.dedup();
    assert_eq!(recorder.batches.len(), 3);
    assert!(recorder.batches.iter().all(|&id| !registry.is_cached(id)));
    assert_eq!(registry.cached_datasets(), 0);
    assert_eq!(registry.cached_records(), 0);
}

#[test]
fn overstated_corpus_size_runs_empty_windows() {
    let root = tempfile::tempdir().unwrap();
    let registry = CacheRegistry::new();
    let config = builder(&root)
        .corpus_size(45)
        .window_size(10)
        .max_iterations(3)
        .build()
        .unwrap();
    let server = server_for(&config, &root);
    let mut optimizer =
        TopicOptimizer::initialize(config.algorithm(), config.inference_params(), &server)
            .unwrap();

    let report = WindowedTrainer::new(&config)
        .run(&corpus(&registry, 15), &mut optimizer, &server)
        .unwrap();

    let documents: Vec<usize> = report.windows.iter().map(|w| w.documents).collect();
    assert_eq!(documents, vec![10, 5, 0, 0]);
    assert!(report.windows.iter().all(|w| w.iterations.len() == 3));
    assert_eq!(server.iteration(), 12);
    assert_eq!(registry.cached_datasets(), 0);
    assert_eq!(registry.cached_records(), 0);
}

#[test]
fn failing_iteration_releases_everything() {
    let root = tempfile::tempdir().unwrap();
    let registry = CacheRegistry::new();
    let config = builder(&root).corpus_size(25).window_size(10).build().unwrap();
    let server = server_for(&config, &root);
    let mut recorder = FailingRecorder(Recorder::new(&config, &server, &registry));
    recorder.0.fail_scoring_at = Some(3);

    let err = WindowedTrainer::new(&config)
        .run(&corpus(&registry, 25), &mut recorder, &server)
        .unwrap_err();

    assert!(matches!(err, TrainErr::Inference(InferenceErr::ShapeMismatch { .. })));
    assert_eq!(registry.cached_datasets(), 0);
    // The failing iteration committed but was never declared done.
    assert_eq!(server.iteration(), 2);
}

#[test]
fn train_lda_returns_the_model() {
    let root = tempfile::tempdir().unwrap();
    let registry = CacheRegistry::new();
    let config = builder(&root)
        .corpus_size(21)
        .window_size(10)
        .checkpoint_interval(2)
        .build()
        .unwrap();

    let model = train_lda(&corpus(&registry, 21), &config).unwrap();

    assert_eq!(model.report().windows.len(), 2);
    assert_eq!(model.server().iteration(), 4);
    assert!(!model.server().is_recycled());

    let topics = model.describe_topics(3).unwrap();
    assert_eq!(topics.len(), 2);
    assert!(topics.iter().all(|terms| terms.len() == 3));

    let checkpoint = model.monitor_path().as_path().join(Checkpoint::file_name(4));
    assert!(checkpoint.is_file());
    assert_eq!(registry.cached_datasets(), 0);
    assert!(model.recycle());
}

#[test]
fn resumed_training_continues_the_counter() {
    let root = tempfile::tempdir().unwrap();
    let registry = CacheRegistry::new();
    let config = builder(&root)
        .corpus_size(21)
        .window_size(10)
        .checkpoint_interval(4)
        .build()
        .unwrap();

    let first = train_lda(&corpus(&registry, 21), &config).unwrap();
    let checkpoint = first.monitor_path().as_path().join(Checkpoint::file_name(4));

    let resumed = builder(&root)
        .corpus_size(21)
        .window_size(10)
        .resume_from(checkpoint)
        .build()
        .unwrap();
    let second = train_lda(&corpus(&registry, 21), &resumed).unwrap();

    assert_eq!(second.server().iteration(), 8);
    assert_ne!(first.monitor_path(), second.monitor_path());
}

#[test]
fn train_hdp_recycles_the_servers() {
    let root = tempfile::tempdir().unwrap();
    let registry = CacheRegistry::new();
    let config = builder(&root)
        .model("hdp")
        .topics(4)
        .truncation(2)
        .corpus_size(21)
        .window_size(10)
        .checkpoint_interval(2)
        .build()
        .unwrap();

    let run = train_hdp(&corpus(&registry, 21), &config).unwrap();

    assert_eq!(run.iterations, 4);
    assert_eq!(run.report.iterations(), 4);
    assert!(matches!(run.report.last_score(), Some(Score::Hdp { .. })));

    let checkpoint = Checkpoint::read(&run.monitor.as_path().join(Checkpoint::file_name(4))).unwrap();
    assert_eq!(checkpoint.extra, 4);
    assert_eq!(registry.cached_datasets(), 0);
}

#[test]
fn entry_points_check_the_model_kind() {
    let root = tempfile::tempdir().unwrap();
    let registry = CacheRegistry::new();
    let hdp = builder(&root).model("hdp").corpus_size(5).window_size(2).build().unwrap();
    let lda = builder(&root).corpus_size(5).window_size(2).build().unwrap();

    assert!(matches!(
        train_lda(&corpus(&registry, 5), &hdp),
        Err(TrainErr::Config(ConfigErr::Invalid { field: "model", .. }))
    ));
    assert!(matches!(
        train_hdp(&corpus(&registry, 5), &lda),
        Err(TrainErr::Config(ConfigErr::Invalid { field: "model", .. }))
    ));
}

#[test]
fn unknown_optimizer_is_named() {
    let root = tempfile::tempdir().unwrap();
    let err = builder(&root).optimizer("foo").build().unwrap_err();
    assert!(TrainErr::from(err).to_string().contains("foo"));
}

#[test]
fn zero_topics_fail_before_reading_documents() {
    let root = tempfile::tempdir().unwrap();
    assert_eq!(builder(&root).topics(0).build(), Err(ConfigErr::NoTopics));
}
