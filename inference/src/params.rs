use std::fmt::{self, Display};

use parameter_server::{InitSpec, ModelSpec};
use rand::{SeedableRng, rngs::StdRng};

use crate::error::{InferenceErr, Result};

/// The topic model and the method used to fit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Stochastic variational inference for LDA.
    OnlineLda,
    /// Collapsed Gibbs sampling per document, blended into the model stochastically.
    GibbsLda,
    /// Truncated online variational inference for the hierarchical Dirichlet process.
    OnlineHdp,
}

impl Algorithm {
    pub fn is_hdp(self) -> bool {
        matches!(self, Algorithm::OnlineHdp)
    }

    /// The amount of parameters stored after the topic-term block.
    pub fn extra_params(self, topics: usize) -> usize {
        match self {
            Algorithm::OnlineHdp => topics,
            Algorithm::OnlineLda | Algorithm::GibbsLda => 0,
        }
    }

    /// The layout and initialization of the global model this algorithm trains.
    pub fn model_spec(self, params: &InferenceParams) -> ModelSpec {
        ModelSpec {
            extra: self.extra_params(params.topics),
            init: InitSpec::Gamma {
                shape: 100.,
                scale: 0.01,
            },
            seed: Some(params.seed),
            ..ModelSpec::new(params.topics, params.vocab)
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::OnlineLda => "online lda",
            Algorithm::GibbsLda => "gibbs lda",
            Algorithm::OnlineHdp => "online hdp",
        };

        f.write_str(name)
    }
}

/// The hyperparameters shared by every optimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceParams {
    /// Amount of topics, the corpus-level truncation for HDP.
    pub topics: usize,
    /// Document-level truncation, only used by HDP.
    pub truncation: usize,
    pub vocab: usize,
    /// Dirichlet prior on the document-topic distributions (`alpha`).
    pub doc_concentration: f64,
    /// Dirichlet prior on the topic-term distributions (`eta`).
    pub topic_concentration: f64,
    /// Concentration of the corpus-level stick breaking process (HDP's `gamma`).
    pub corpus_concentration: f64,
    /// Cap on the per-document inference loop (variational iterations or Gibbs sweeps).
    pub max_inner_iterations: usize,
    /// Learning rate delay, down-weights early iterations.
    pub tau0: f64,
    /// Learning rate decay, must lie in `(0.5, 1]` for convergence.
    pub kappa: f64,
    pub seed: u64,
}

impl InferenceParams {
    /// Creates the parameters of a `topics x vocab` model with the default LDA priors.
    pub fn new(topics: usize, vocab: usize) -> Self {
        let prior = if topics > 0 { 1. / topics as f64 } else { 0. };

        Self {
            topics,
            truncation: topics.min(20),
            vocab,
            doc_concentration: prior,
            topic_concentration: prior,
            corpus_concentration: 1.,
            max_inner_iterations: 100,
            tau0: 1024.,
            kappa: 0.7,
            seed: 0,
        }
    }

    /// Creates the parameters of an HDP with corpus truncation `topics` and the default HDP priors.
    pub fn hdp(topics: usize, truncation: usize, vocab: usize) -> Self {
        Self {
            truncation,
            doc_concentration: 1.,
            topic_concentration: 0.01,
            corpus_concentration: 1.,
            ..Self::new(topics, vocab)
        }
    }

    /// The learning rate of iteration `t`, `(tau0 + t)^-kappa`.
    pub fn step_size(&self, t: u64) -> f64 {
        (self.tau0 + t as f64).powf(-self.kappa)
    }

    /// A generator private to document `id`, reproducible across calls with the same `salt`.
    pub(crate) fn document_rng(&self, id: u64, salt: u64) -> StdRng {
        let mixed = id.wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ salt.rotate_left(32);
        StdRng::seed_from_u64(self.seed ^ mixed)
    }

    /// Checks every parameter is inside its domain.
    pub fn validate(&self, algorithm: Algorithm) -> Result<()> {
        if self.topics == 0 {
            return Err(InferenceErr::NoTopics);
        }

        if self.vocab == 0 {
            return Err(InferenceErr::NoVocabulary);
        }

        if algorithm.is_hdp() && self.truncation == 0 {
            return Err(invalid("truncation", "must be positive"));
        }

        if self.max_inner_iterations == 0 {
            return Err(invalid("max inner iterations", "must be positive"));
        }

        let positive = [
            ("doc concentration", self.doc_concentration),
            ("topic concentration", self.topic_concentration),
            ("corpus concentration", self.corpus_concentration),
        ];

        for (name, value) in positive {
            if !(value.is_finite() && value > 0.) {
                return Err(invalid(name, format!("must be positive, got {value}")));
            }
        }

        if !(self.tau0.is_finite() && self.tau0 >= 0.) {
            return Err(invalid("tau0", format!("must be non-negative, got {}", self.tau0)));
        }

        if !(self.kappa > 0.5 && self.kappa <= 1.) {
            return Err(invalid("kappa", format!("must lie in (0.5, 1], got {}", self.kappa)));
        }

        Ok(())
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> InferenceErr {
    InferenceErr::InvalidParam {
        name,
        reason: reason.into(),
    }
}
