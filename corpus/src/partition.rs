use std::num::NonZeroUsize;

/// A record that carries a stable numeric key.
pub trait Keyed {
    fn key(&self) -> u64;
}

/// Assigns each record of a dataset to one of `partitions` partitions.
pub trait Partitioner<T>: Send + Sync {
    /// Should return the partition index for `item`, always smaller than `partitions`.
    ///
    /// # Arguments
    /// * `item` - The record to place.
    /// * `partitions` - The amount of partitions of the target dataset.
    fn partition(&self, item: &T, partitions: NonZeroUsize) -> usize;
}

/// Places records by their key modulo the amount of partitions.
///
/// The assignment only depends on the key, so a lost partition can be rebuilt
/// deterministically from the source and contiguous id ranges spread evenly.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashPartitioner;

impl<T: Keyed> Partitioner<T> for HashPartitioner {
    fn partition(&self, item: &T, partitions: NonZeroUsize) -> usize {
        (item.key() % partitions.get() as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Key(u64);

    impl Keyed for Key {
        fn key(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn contiguous_keys_are_balanced() {
        let partitions = NonZeroUsize::new(3).unwrap();
        let mut sizes = [0; 3];

        for k in 100..110 {
            sizes[HashPartitioner.partition(&Key(k), partitions)] += 1;
        }

        // 10 keys in 3 partitions => sizes differ by at most 1
        let (min, max) = (sizes.iter().min().unwrap(), sizes.iter().max().unwrap());
        assert!(max - min <= 1, "unbalanced partition sizes {sizes:?}");
    }

    #[test]
    fn assignment_is_deterministic() {
        let partitions = NonZeroUsize::new(7).unwrap();
        let first = HashPartitioner.partition(&Key(12345), partitions);
        let second = HashPartitioner.partition(&Key(12345), partitions);
        assert_eq!(first, second);
        assert!(first < 7);
    }
}
