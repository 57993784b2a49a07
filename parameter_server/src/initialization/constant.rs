use std::iter;

use super::ParamGen;

/// Fills a fixed-length region of the model with a single value.
///
/// Used for the uniform topic-term initialization and for the zeroed trailing
/// region of the HDP model.
pub struct ConstParamGen {
    fill: f64,
    left: usize,
}

impl ConstParamGen {
    /// Emits `fill` exactly `len` times.
    pub fn new(fill: f64, len: usize) -> Self {
        Self { fill, left: len }
    }
}

impl ParamGen for ConstParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f64>> {
        let take = n.min(self.left);
        if take == 0 {
            return None;
        }

        self.left -= take;
        Some(iter::repeat_n(self.fill, take).collect())
    }
}
