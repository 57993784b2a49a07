use std::{marker::PhantomData, ops::Deref};

use log::trace;

use crate::dataset::DistributedDataset;

/// Keeps a dataset pinned in memory for as long as the guard lives.
///
/// The dataset is unpinned when the guard is dropped, whichever way the scope
/// holding it is left.
pub struct Pinned<T, D>
where
    T: Clone + Send + Sync + 'static,
    D: DistributedDataset<T>,
{
    dataset: D,
    _records: PhantomData<fn() -> T>,
}

impl<T, D> Pinned<T, D>
where
    T: Clone + Send + Sync + 'static,
    D: DistributedDataset<T>,
{
    /// Pins `dataset`, nothing is computed until `materialize` is called.
    pub fn new(dataset: D) -> Self {
        dataset.pin();
        trace!(dataset = dataset.id(); "pinned");

        Self {
            dataset,
            _records: PhantomData,
        }
    }

    /// Pins `dataset` and forces its evaluation so later actions read the cached partitions.
    ///
    /// # Returns
    /// The guard and the amount of records in the dataset.
    pub fn materialized(dataset: D) -> (Self, usize) {
        let pinned = Self::new(dataset);
        let records = pinned.dataset.materialize();
        (pinned, records)
    }

    /// The pinned dataset.
    pub fn dataset(&self) -> &D {
        &self.dataset
    }
}

impl<T, D> Deref for Pinned<T, D>
where
    T: Clone + Send + Sync + 'static,
    D: DistributedDataset<T>,
{
    type Target = D;

    fn deref(&self) -> &Self::Target {
        &self.dataset
    }
}

impl<T, D> Drop for Pinned<T, D>
where
    T: Clone + Send + Sync + 'static,
    D: DistributedDataset<T>,
{
    fn drop(&mut self) {
        self.dataset.unpin();
        trace!(dataset = self.dataset.id(); "unpinned");
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::{dataset::Dataset, registry::CacheRegistry};

    fn source(registry: &CacheRegistry) -> Dataset<u32> {
        Dataset::parallelize((0..10).collect(), NonZeroUsize::new(2).unwrap(), registry)
    }

    #[test]
    fn releases_on_drop() {
        let registry = CacheRegistry::new();
        let ds = source(&registry).filter(|x| x % 2 == 0);

        {
            let (pinned, records) = Pinned::materialized(ds.clone());
            assert_eq!(records, 5);
            assert!(pinned.is_pinned());
            assert!(registry.is_cached(ds.id()));
        }

        assert!(!ds.is_pinned());
        assert!(!registry.is_cached(ds.id()));
    }

    #[test]
    fn releases_on_early_return() {
        fn fails(ds: Dataset<u32>) -> Result<(), ()> {
            let (_pinned, _) = Pinned::materialized(ds);
            Err(())
        }

        let registry = CacheRegistry::new();
        let ds = source(&registry).filter(|x| *x > 3);
        assert!(fails(ds.clone()).is_err());
        assert_eq!(registry.cached_datasets(), 0);
    }
}
