use std::num::NonZeroUsize;

use corpus::{
    CacheRegistry, Dataset, DistributedDataset, Document, HashPartitioner, SparseVector,
};
use inference::{Algorithm, InferenceErr, InferenceParams, Optimizer, Score, TopicOptimizer};
use parameter_server::{MergeRule, PsErr, ServerHandle, distribute};
use tempfile::TempDir;

const VOCAB: usize = 6;

fn documents(n: u64) -> Vec<Document> {
    (0..n)
        .map(|id| {
            let base = if id % 2 == 0 { 0 } else { 3 };
            let pairs = [(base, 3.), (base + 1, 2.), (base + 2, 1.)];
            Document::new(id, SparseVector::from_pairs(VOCAB, pairs).unwrap())
        })
        .collect()
}

fn batch(registry: &CacheRegistry, n: u64) -> Dataset<Document> {
    Dataset::parallelize(documents(n), NonZeroUsize::new(2).unwrap(), registry)
        .partition_by(NonZeroUsize::new(3).unwrap(), HashPartitioner)
}

fn params(algorithm: Algorithm) -> InferenceParams {
    let params = match algorithm {
        Algorithm::OnlineHdp => InferenceParams::hdp(3, 2, VOCAB),
        _ => InferenceParams::new(2, VOCAB),
    };

    InferenceParams {
        max_inner_iterations: 20,
        seed: 11,
        ..params
    }
}

fn setup(algorithm: Algorithm) -> (TempDir, ServerHandle, TopicOptimizer) {
    let root = tempfile::tempdir().unwrap();
    let params = params(algorithm);
    let (server, _) = distribute(
        algorithm.model_spec(&params),
        NonZeroUsize::new(2).unwrap(),
        root.path(),
    )
    .unwrap();
    server.set_train_set_size(100);

    let optimizer = TopicOptimizer::initialize(algorithm, params, &server).unwrap();
    (root, server, optimizer)
}

const ALGORITHMS: [Algorithm; 3] = [Algorithm::OnlineLda, Algorithm::GibbsLda, Algorithm::OnlineHdp];

#[test]
fn next_commits_once_and_pins_diagnostics() {
    for algorithm in ALGORITHMS {
        let (_root, server, mut optimizer) = setup(algorithm);
        let registry = CacheRegistry::new();
        let batch = batch(&registry, 10);
        let before = server.snapshot().unwrap();

        let diagnostics = optimizer.next(&server, &batch).unwrap();
        let after = server.snapshot().unwrap();

        assert_ne!(before, after, "{algorithm} didn't update the model");
        assert_eq!(server.iteration(), 0);
        assert!(diagnostics.is_pinned());
        assert!(registry.is_cached(diagnostics.id()));
        assert_eq!(diagnostics.collect().len(), 10);

        drop(diagnostics);
        assert_eq!(registry.cached_datasets(), 0);
    }
}

#[test]
fn diagnostics_keep_document_ids() {
    for algorithm in ALGORITHMS {
        let (_root, server, mut optimizer) = setup(algorithm);
        let registry = CacheRegistry::new();

        let diagnostics = optimizer.next(&server, &batch(&registry, 6)).unwrap();
        let mut ids: Vec<u64> = diagnostics.collect().iter().map(|d| d.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..6).collect::<Vec<_>>());
        assert!(
            diagnostics
                .collect()
                .iter()
                .all(|d| d.gamma.len() == server.topics())
        );
    }
}

#[test]
fn perplexity_is_pure_and_idempotent() {
    for algorithm in ALGORITHMS {
        let (_root, server, mut optimizer) = setup(algorithm);
        let registry = CacheRegistry::new();
        let batch = batch(&registry, 8);

        let diagnostics = optimizer.next(&server, &batch).unwrap();
        let model = server.snapshot().unwrap();

        let first = optimizer.perplexity(&server, &batch, diagnostics.dataset()).unwrap();
        let second = optimizer.perplexity(&server, &batch, diagnostics.dataset()).unwrap();

        assert_eq!(first, second);
        assert!(first.perplexity().is_finite() && first.perplexity() > 0.);
        assert_eq!(server.snapshot().unwrap(), model);
        assert_eq!(server.iteration(), 0);

        match algorithm {
            Algorithm::OnlineHdp => assert!(matches!(first, Score::Hdp { .. })),
            _ => assert!(matches!(first, Score::Perplexity(_))),
        }
    }
}

#[test]
fn scoring_released_diagnostics_leaves_nothing_pending() {
    for algorithm in ALGORITHMS {
        let (_root, server, mut optimizer) = setup(algorithm);
        let registry = CacheRegistry::new();
        let batch = batch(&registry, 6);

        let diagnostics = optimizer.next(&server, &batch).unwrap();
        let released = diagnostics.dataset().clone();
        drop(diagnostics);
        assert!(!released.is_pinned());

        let first = optimizer.perplexity(&server, &batch, &released).unwrap();
        let second = optimizer.perplexity(&server, &batch, &released).unwrap();
        assert_eq!(first, second);

        let model = server.snapshot().unwrap();
        server.commit(&MergeRule::Add).unwrap();
        assert_eq!(server.snapshot().unwrap(), model, "{algorithm} left statistics pending");
    }
}

#[test]
fn empty_batch_still_commits() {
    let (_root, server, mut optimizer) = setup(Algorithm::OnlineLda);
    let registry = CacheRegistry::new();
    let empty = batch(&registry, 4).filter(|_| false);
    let before = server.snapshot().unwrap();

    let diagnostics = optimizer.next(&server, &empty).unwrap();
    assert_eq!(diagnostics.collect().len(), 0);
    assert_ne!(server.snapshot().unwrap(), before);

    let score = optimizer.perplexity(&server, &empty, diagnostics.dataset()).unwrap();
    assert!(score.perplexity().is_nan());
}

#[test]
fn initialize_validates_params_and_layout() {
    let (_root, server, _) = setup(Algorithm::OnlineLda);

    let no_topics = InferenceParams::new(0, VOCAB);
    assert!(matches!(
        TopicOptimizer::initialize(Algorithm::OnlineLda, no_topics, &server),
        Err(InferenceErr::NoTopics)
    ));

    let no_vocab = InferenceParams::new(2, 0);
    assert!(matches!(
        TopicOptimizer::initialize(Algorithm::GibbsLda, no_vocab, &server),
        Err(InferenceErr::NoVocabulary)
    ));

    let hdp = InferenceParams::hdp(2, 2, VOCAB);
    assert!(matches!(
        TopicOptimizer::initialize(Algorithm::OnlineHdp, hdp, &server),
        Err(InferenceErr::ShapeMismatch { .. })
    ));
}

#[test]
fn recycled_server_fails_without_leaking_the_cache() {
    let (_root, server, mut optimizer) = setup(Algorithm::GibbsLda);
    let registry = CacheRegistry::new();
    let batch = batch(&registry, 4);

    server.recycle();
    let err = optimizer.next(&server, &batch).err();

    assert!(matches!(err, Some(InferenceErr::Server(PsErr::Recycled))));
    assert_eq!(registry.cached_datasets(), 0);
}
