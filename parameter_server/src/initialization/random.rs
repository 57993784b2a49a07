use rand::Rng;
use rand_distr::{Distribution, Gamma};

use super::ParamGen;
use crate::error::{PsErr, Result};

/// A parameter generator that follows a certain probabilistic distribution.
pub struct RandParamGen<R: Rng, D: Distribution<f64>> {
    rng: R,
    distribution: D,
    remaining: usize,
}

impl<R: Rng, D: Distribution<f64>> RandParamGen<R, D> {
    /// Creates a new `RandParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `distribution` - The distribution to sample the random numbers from.
    /// * `limit` - The maximum amount of numbers to generate.
    pub fn new(rng: R, distribution: D, limit: usize) -> Self {
        Self {
            rng,
            distribution,
            remaining: limit,
        }
    }
}

impl<R: Rng> RandParamGen<R, Gamma<f64>> {
    /// Creates a new `RandParamGen` parameter generator with a Gamma distribution.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `shape` - The shape of the distribution.
    /// * `scale` - The scale of the distribution.
    ///
    /// # Returns
    /// An error if `shape` or `scale` aren't strictly positive and finite.
    pub fn gamma(rng: R, limit: usize, shape: f64, scale: f64) -> Result<Self> {
        let distribution =
            Gamma::new(shape, scale).map_err(|e| PsErr::InvalidSpec(e.to_string()))?;
        Ok(Self::new(rng, distribution, limit))
    }
}

impl<R: Rng, D: Distribution<f64>> ParamGen for RandParamGen<R, D> {
    fn sample(&mut self, mut n: usize) -> Option<Vec<f64>> {
        if self.remaining == 0 {
            return None;
        }

        n = n.min(self.remaining);
        self.remaining -= n;

        let sample = (&self.distribution)
            .sample_iter(&mut self.rng)
            .take(n)
            .collect();

        Some(sample)
    }
}
