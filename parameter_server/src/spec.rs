use std::num::NonZeroU64;

use crate::error::{PsErr, Result};

/// How the model parameters are initialized.
#[derive(Debug, Clone, PartialEq)]
pub enum InitSpec {
    /// Every parameter starts with `value`.
    Const { value: f64 },
    /// Parameters are drawn from a Gamma(`shape`, `scale`) distribution.
    Gamma { shape: f64, scale: f64 },
    /// Parameters are copied, used when resuming from a checkpoint.
    Values(Vec<f64>),
}

/// Describes the layout of the global model.
///
/// The model is a row-major `topics x vocab` topic-term block followed by
/// `extra` trailing parameters, which always start at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub topics: usize,
    pub vocab: usize,
    pub extra: usize,
    pub init: InitSpec,
    pub checkpoint_interval: Option<NonZeroU64>,
    pub seed: Option<u64>,
}

impl ModelSpec {
    /// Creates a `ModelSpec` for a `topics x vocab` model initialized with random Gamma(100, 0.01) values.
    pub fn new(topics: usize, vocab: usize) -> Self {
        Self {
            topics,
            vocab,
            extra: 0,
            init: InitSpec::Gamma {
                shape: 100.,
                scale: 0.01,
            },
            checkpoint_interval: None,
            seed: None,
        }
    }

    /// The amount of parameters in the topic-term block.
    pub fn topic_term_len(&self) -> usize {
        self.topics * self.vocab
    }

    /// The total amount of parameters.
    pub fn len(&self) -> usize {
        self.topic_term_len() + self.extra
    }

    /// Checks the layout describes a non-empty model.
    ///
    /// # Returns
    /// A `PsErr::InvalidSpec` otherwise.
    pub fn validate(&self) -> Result<()> {
        if self.topics == 0 {
            return Err(PsErr::InvalidSpec("the model needs at least one topic".into()));
        }

        if self.vocab == 0 {
            return Err(PsErr::InvalidSpec("the vocabulary can't be empty".into()));
        }

        match &self.init {
            InitSpec::Values(values) if values.len() != self.len() => {
                Err(PsErr::SizeMismatch {
                    got: values.len(),
                    expected: self.len(),
                })
            }
            _ => Ok(()),
        }
    }
}
