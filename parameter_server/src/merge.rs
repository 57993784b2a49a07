/// The prior added to every parameter whose global index is below `end` and above the previous region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorRegion {
    pub end: usize,
    pub value: f64,
}

/// Defines how the accumulated sufficient statistics are merged into the model parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeRule {
    /// `param += stats`.
    Add,
    /// `param = (1 - rho) * param + rho * (prior + scale * stats)`.
    ///
    /// `priors` must be sorted by `end`, indices past the last region get no prior.
    Blend {
        rho: f64,
        scale: f64,
        priors: Vec<PriorRegion>,
    },
}

impl MergeRule {
    /// Applies the rule to a slice of parameters.
    ///
    /// # Arguments
    /// * `offset` - The global index of the first parameter of `params`.
    /// * `stats` - The accumulated statistics, same length as `params`.
    /// * `params` - The parameters to update.
    pub fn apply(&self, offset: usize, stats: &[f64], params: &mut [f64]) {
        debug_assert_eq!(stats.len(), params.len());

        match self {
            MergeRule::Add => params.iter_mut().zip(stats).for_each(|(p, s)| *p += s),
            MergeRule::Blend { rho, scale, priors } => {
                let (rho, scale) = (*rho, *scale);

                for (i, (p, s)) in params.iter_mut().zip(stats).enumerate() {
                    let prior = prior_at(priors, offset + i);
                    *p = (1. - rho) * *p + rho * (prior + scale * s);
                }
            }
        }
    }
}

fn prior_at(priors: &[PriorRegion], idx: usize) -> f64 {
    priors
        .iter()
        .find(|region| idx < region.end)
        .map_or(0., |region| region.value)
}
