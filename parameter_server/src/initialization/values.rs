use std::vec;

use super::ParamGen;

/// A parameter generator that replays a fixed list of values.
pub struct ValuesParamGen {
    values: vec::IntoIter<f64>,
}

impl ValuesParamGen {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }
}

impl ParamGen for ValuesParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f64>> {
        let sample: Vec<_> = self.values.by_ref().take(n).collect();
        (!sample.is_empty()).then_some(sample)
    }
}
