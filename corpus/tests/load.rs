use std::{fs::File, num::NonZeroUsize};

use corpus::{
    CacheRegistry, CorpusErr, Dataset, DistributedDataset, Document, HashPartitioner,
    SparseVector, load_paths, write_documents,
};

fn docs(ids: std::ops::Range<u64>) -> Vec<Document> {
    ids.map(|id| {
        let counts = SparseVector::new(3, vec![(id % 3) as u32], vec![1.]).unwrap();
        Document::new(id, counts)
    })
    .collect()
}

#[test]
fn loads_multiple_files_into_a_partitioned_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("part-0.jsonl");
    let second = dir.path().join("part-1.jsonl");
    write_documents(File::create(&first).unwrap(), &docs(0..6)).unwrap();
    write_documents(File::create(&second).unwrap(), &docs(6..10)).unwrap();

    let loaded = load_paths(&[first, second], 3).unwrap();
    assert_eq!(loaded.len(), 10);

    let registry = CacheRegistry::new();
    let source = Dataset::parallelize(loaded, NonZeroUsize::new(2).unwrap(), &registry);
    let window = source
        .filter(|doc| (2..8).contains(&doc.id))
        .partition_by(NonZeroUsize::new(3).unwrap(), HashPartitioner);

    window.pin();
    assert_eq!(window.materialize(), 6);
    assert_eq!(registry.cached_records(), 6);
    assert!(window.unpin());
    assert_eq!(registry.cached_datasets(), 0);
}

#[test]
fn duplicate_ids_across_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.jsonl");
    let second = dir.path().join("b.jsonl");
    write_documents(File::create(&first).unwrap(), &docs(0..4)).unwrap();
    write_documents(File::create(&second).unwrap(), &docs(3..5)).unwrap();

    let err = load_paths(&[first, second], 3).unwrap_err();
    assert!(matches!(err, CorpusErr::DuplicateId(3)));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_paths(&[dir.path().join("missing.jsonl")], 3).unwrap_err();
    assert!(matches!(err, CorpusErr::Io(_)));
}
