/// A source of initial parameter values, consumed chunk by chunk while the
/// model store lays out its shards.
pub trait ParamGen {
    /// Produces up to `n` values, or `None` once the source is drained.
    fn sample(&mut self, n: usize) -> Option<Vec<f64>>;
}
