use std::{
    num::NonZeroUsize,
    ops::Range,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use log::trace;
use parking_lot::RwLock;
use rayon::prelude::*;

use crate::{partition::Partitioner, registry::CacheRegistry};

type Partitions<T> = Arc<[Vec<T>]>;
type Lineage<T> = Arc<dyn Fn() -> Partitions<T> + Send + Sync>;

/// A partitioned, lazily evaluated collection of records.
///
/// Transformations only record how to derive the new partitions from their parent.
/// Nothing runs until an action (`materialize`, `aggregate`) is invoked, and the
/// computed partitions are only retained while the dataset is pinned.
pub trait DistributedDataset<T>: Clone + Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// The dataset type produced when transforming records into another type.
    type Derived<U>: DistributedDataset<U>
    where
        U: Clone + Send + Sync + 'static;

    /// A stable identifier, used to query the cache state.
    fn id(&self) -> u64;

    /// The amount of partitions of this dataset.
    fn num_partitions(&self) -> usize;

    /// Keeps the records that satisfy `pred`, preserving the partitioning.
    fn filter<F>(&self, pred: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static;

    /// Redistributes the records among `partitions` partitions following `partitioner`.
    fn partition_by<P>(&self, partitions: NonZeroUsize, partitioner: P) -> Self
    where
        P: Partitioner<T> + 'static;

    /// Transforms every partition, `f` receives the partition index and its records.
    fn map_partitions<U, F>(&self, f: F) -> Self::Derived<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(usize, &[T]) -> Vec<U> + Send + Sync + 'static;

    /// Transforms every pair of aligned partitions of `self` and `other`.
    fn zip_partitions<U, V, F>(&self, other: &Self::Derived<U>, f: F) -> Self::Derived<V>
    where
        U: Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: Fn(usize, &[T], &[U]) -> Vec<V> + Send + Sync + 'static;

    /// Marks the dataset so that its partitions are kept in memory once computed.
    fn pin(&self);

    /// Releases the in-memory partitions and clears the pin.
    ///
    /// # Returns
    /// Whether there were partitions held in memory.
    fn unpin(&self) -> bool;

    /// Whether the dataset is currently pinned.
    fn is_pinned(&self) -> bool;

    /// Forces the evaluation of the dataset.
    ///
    /// # Returns
    /// The amount of records.
    fn materialize(&self) -> usize;

    /// Folds every partition with `seq` starting from `zero` and merges the partial results with `comb`, in partition order.
    fn aggregate<A, S, C>(&self, zero: A, seq: S, comb: C) -> A
    where
        A: Clone + Send + Sync,
        S: Fn(A, &T) -> A + Send + Sync,
        C: Fn(A, A) -> A + Send + Sync;
}

/// The in-process implementation of a `DistributedDataset`.
///
/// Partitions are processed in parallel on the rayon thread pool. Cloning a
/// `Dataset` is cheap and the clone refers to the same cached state.
pub struct Dataset<T> {
    id: u64,
    partitions: usize,
    lineage: Lineage<T>,
    cache: Arc<RwLock<Option<Partitions<T>>>>,
    pinned: Arc<AtomicBool>,
    registry: CacheRegistry,
}

impl<T> Clone for Dataset<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            partitions: self.partitions,
            lineage: Arc::clone(&self.lineage),
            cache: Arc::clone(&self.cache),
            pinned: Arc::clone(&self.pinned),
            registry: self.registry.clone(),
        }
    }
}

/// Splits `total` records among `parts` partitions and returns the range for partition `idx`.
///
/// Ranges are contiguous, disjoint, cover `[0..total)` and their sizes differ by at most 1.
fn split_range(total: usize, idx: usize, parts: usize) -> Range<usize> {
    let base = total / parts;
    let rem = total % parts;

    let start = idx * base + idx.min(rem);
    let extra = if idx < rem { 1 } else { 0 };
    start..start + base + extra
}

impl<T> Dataset<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a source dataset from already partitioned records.
    ///
    /// # Arguments
    /// * `partitions` - The records of every partition.
    /// * `registry` - The cache registry shared by every dataset derived from this one.
    pub fn from_partitions(partitions: Vec<Vec<T>>, registry: &CacheRegistry) -> Self {
        let count = partitions.len();
        let source: Partitions<T> = partitions.into();
        let lineage: Lineage<T> = Arc::new(move || Arc::clone(&source));
        Self::with_lineage(count, lineage, registry.clone())
    }

    /// Creates a source dataset splitting `records` into `partitions` contiguous partitions.
    pub fn parallelize(records: Vec<T>, partitions: NonZeroUsize, registry: &CacheRegistry) -> Self {
        let parts = partitions.get();
        let total = records.len();
        let mut records = records.into_iter();

        let split = (0..parts)
            .map(|idx| records.by_ref().take(split_range(total, idx, parts).len()).collect())
            .collect();

        Self::from_partitions(split, registry)
    }

    fn with_lineage(partitions: usize, lineage: Lineage<T>, registry: CacheRegistry) -> Self {
        Self {
            id: registry.next_id(),
            partitions,
            lineage,
            cache: Arc::new(RwLock::new(None)),
            pinned: Arc::new(AtomicBool::new(false)),
            registry,
        }
    }

    /// Returns the partitions of this dataset, evaluating its lineage if they are not cached.
    ///
    /// The result is stored only while the dataset is pinned.
    pub fn compute(&self) -> Partitions<T> {
        if let Some(cached) = self.cache.read().as_ref() {
            return Arc::clone(cached);
        }

        trace!(dataset = self.id; "evaluating lineage");
        let partitions = (self.lineage)();

        if self.is_pinned() {
            let mut slot = self.cache.write();
            if self.is_pinned() && slot.is_none() {
                let records = partitions.iter().map(Vec::len).sum();
                self.registry.insert(self.id, records);
                *slot = Some(Arc::clone(&partitions));
            }
        }

        partitions
    }

    /// Gathers all the records, partition after partition.
    pub fn collect(&self) -> Vec<T> {
        self.compute().iter().flatten().cloned().collect()
    }

    /// The registry tracking this dataset's cache state.
    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }
}

impl<T> DistributedDataset<T> for Dataset<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Derived<U>
        = Dataset<U>
    where
        U: Clone + Send + Sync + 'static;

    fn id(&self) -> u64 {
        self.id
    }

    fn num_partitions(&self) -> usize {
        self.partitions
    }

    fn filter<F>(&self, pred: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let parent = self.clone();
        let lineage: Lineage<T> = Arc::new(move || {
            parent
                .compute()
                .par_iter()
                .map(|part| part.iter().filter(|item| pred(*item)).cloned().collect())
                .collect::<Vec<Vec<T>>>()
                .into()
        });

        Self::with_lineage(self.partitions, lineage, self.registry.clone())
    }

    fn partition_by<P>(&self, partitions: NonZeroUsize, partitioner: P) -> Self
    where
        P: Partitioner<T> + 'static,
    {
        let parent = self.clone();
        let lineage: Lineage<T> = Arc::new(move || {
            let mut buckets: Vec<Vec<T>> = (0..partitions.get()).map(|_| Vec::new()).collect();

            for item in parent.compute().iter().flatten() {
                let idx = partitioner.partition(item, partitions);
                debug_assert!(idx < partitions.get(), "partitioner returned {idx}");
                buckets[idx].push(item.clone());
            }

            buckets.into()
        });

        Self::with_lineage(partitions.get(), lineage, self.registry.clone())
    }

    fn map_partitions<U, F>(&self, f: F) -> Dataset<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(usize, &[T]) -> Vec<U> + Send + Sync + 'static,
    {
        let parent = self.clone();
        let lineage: Lineage<U> = Arc::new(move || {
            parent
                .compute()
                .par_iter()
                .enumerate()
                .map(|(idx, part)| f(idx, part.as_slice()))
                .collect::<Vec<Vec<U>>>()
                .into()
        });

        Dataset::with_lineage(self.partitions, lineage, self.registry.clone())
    }

    fn zip_partitions<U, V, F>(&self, other: &Dataset<U>, f: F) -> Dataset<V>
    where
        U: Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: Fn(usize, &[T], &[U]) -> Vec<V> + Send + Sync + 'static,
    {
        debug_assert_eq!(self.partitions, other.partitions);

        let left = self.clone();
        let right = other.clone();
        let lineage: Lineage<V> = Arc::new(move || {
            let (l, r) = (left.compute(), right.compute());
            l.par_iter()
                .zip(r.par_iter())
                .enumerate()
                .map(|(idx, (a, b))| f(idx, a.as_slice(), b.as_slice()))
                .collect::<Vec<Vec<V>>>()
                .into()
        });

        Dataset::with_lineage(self.partitions, lineage, self.registry.clone())
    }

    fn pin(&self) {
        self.pinned.store(true, Ordering::Release);
    }

    fn unpin(&self) -> bool {
        self.pinned.store(false, Ordering::Release);
        let released = self.cache.write().take().is_some();
        self.registry.remove(self.id);
        released
    }

    fn is_pinned(&self) -> bool {
        self.pinned.load(Ordering::Acquire)
    }

    fn materialize(&self) -> usize {
        self.compute().iter().map(Vec::len).sum()
    }

    fn aggregate<A, S, C>(&self, zero: A, seq: S, comb: C) -> A
    where
        A: Clone + Send + Sync,
        S: Fn(A, &T) -> A + Send + Sync,
        C: Fn(A, A) -> A + Send + Sync,
    {
        let partials: Vec<A> = self
            .compute()
            .par_iter()
            .map(|part| part.iter().fold(zero.clone(), &seq))
            .collect();

        partials.into_iter().fold(zero, comb)
    }
}
