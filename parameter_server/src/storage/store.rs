use std::{num::NonZeroUsize, sync::Arc};

use rayon::prelude::*;

use crate::{
    error::{PsErr, Result},
    initialization::ParamGen,
    merge::MergeRule,
    storage::ModelShard,
};

/// The primary storage of the model's parameters, split in range shards.
///
/// Cloning a `ModelStore` is cheap, clones share the same shards.
#[derive(Debug, Clone)]
pub struct ModelStore {
    params: usize,
    shards: Arc<[ModelShard]>,
    shard_size: NonZeroUsize,
}

impl ModelStore {
    /// Creates a new `ModelStore`.
    ///
    /// # Arguments
    /// * `shard_size` - The maximum amount of parameters per shard.
    /// * `param_gen` - A parameter generator, the store holds every parameter it yields.
    pub fn new<PG: ParamGen>(shard_size: NonZeroUsize, mut param_gen: PG) -> Self {
        let mut params = 0;
        let mut shards = Vec::new();

        while let Some(values) = param_gen.sample(shard_size.get()) {
            let len = values.len();
            shards.push(ModelShard::new(params, values));
            params += len;
        }

        Self {
            params,
            shards: Arc::from(shards),
            shard_size,
        }
    }

    /// Returns the amount of parameters in the storage.
    pub fn len(&self) -> usize {
        self.params
    }

    /// Returns the amount of shards, one per server.
    pub fn shards(&self) -> usize {
        self.shards.len()
    }

    /// Accumulates statistics into the pending buffers of every shard, in parallel.
    ///
    /// # Returns
    /// A `SizeMismatch` if the length of `stats` doesn't match the amount of parameters.
    pub fn accumulate(&self, stats: &[f64]) -> Result<()> {
        self.check_len(stats.len())?;

        self.shards
            .par_iter()
            .zip(stats.par_chunks(self.shard_size.get()))
            .try_for_each(|(shard, chunk)| shard.accumulate(chunk))
    }

    /// Merges the pending statistics of every shard into its parameters.
    pub fn commit(&self, rule: &MergeRule) {
        self.shards.par_iter().for_each(|shard| shard.commit(rule));
    }

    /// Gathers all the sharded parameters into a local buffer.
    ///
    /// # Returns
    /// A `SizeMismatch` if the length of `out` doesn't match the amount of parameters.
    pub fn pull(&self, out: &mut [f64]) -> Result<()> {
        self.check_len(out.len())?;

        self.shards
            .par_iter()
            .zip(out.par_chunks_mut(self.shard_size.get()))
            .try_for_each(|(shard, chunk)| shard.pull(chunk))
    }

    fn check_len(&self, got: usize) -> Result<()> {
        if got != self.params {
            return Err(PsErr::SizeMismatch {
                got,
                expected: self.params,
            });
        }

        Ok(())
    }
}
