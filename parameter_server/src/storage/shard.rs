use std::ptr;

use parking_lot::{Mutex, RwLock};

use crate::{
    error::{PsErr, Result},
    merge::MergeRule,
};

/// A contiguous range of the model's parameters together with its pending statistics.
///
/// Statistics pushed by concurrent partitions are summed into `pending` and only
/// reach `params` on `commit`.
#[derive(Debug)]
pub struct ModelShard {
    offset: usize,
    len: usize,
    pending: Mutex<Box<[f64]>>,
    params: RwLock<Box<[f64]>>,
}

impl ModelShard {
    /// Creates a new `ModelShard`.
    ///
    /// # Arguments
    /// * `offset` - The global index of the first parameter of this shard.
    /// * `params` - The initial state of the parameters.
    pub fn new(offset: usize, params: Vec<f64>) -> Self {
        let len = params.len();

        Self {
            offset,
            len,
            pending: Mutex::new(vec![0.; len].into_boxed_slice()),
            params: RwLock::new(params.into_boxed_slice()),
        }
    }

    /// Sums `stats` into the pending statistics.
    ///
    /// # Returns
    /// A `SizeMismatch` if `stats` isn't the same size as this shard.
    pub fn accumulate(&self, stats: &[f64]) -> Result<()> {
        self.check_len(stats.len())?;

        let mut pending = self.pending.lock();
        pending
            .iter_mut()
            .zip(stats)
            .for_each(|(acc, s)| *acc += s);

        Ok(())
    }

    /// Merges the pending statistics into the parameters following `rule` and clears them.
    pub fn commit(&self, rule: &MergeRule) {
        let mut params = self.params.write();
        let mut pending = self.pending.lock();
        rule.apply(self.offset, &pending, &mut params);
        pending.fill(0.);
    }

    /// Copies the shard's parameters into the provided destination buffer.
    ///
    /// # Returns
    /// A `SizeMismatch` if `out` isn't the same size as this shard.
    pub fn pull(&self, out: &mut [f64]) -> Result<()> {
        self.check_len(out.len())?;

        let params = self.params.read();

        // SAFETY: We've already checked that both slices have the same size.
        unsafe {
            ptr::copy_nonoverlapping(params.as_ptr(), out.as_mut_ptr(), out.len());
        }

        Ok(())
    }

    fn check_len(&self, got: usize) -> Result<()> {
        if got != self.len {
            return Err(PsErr::SizeMismatch {
                got,
                expected: self.len,
            });
        }

        Ok(())
    }
}
