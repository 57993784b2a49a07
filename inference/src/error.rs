use std::{
    error::Error,
    fmt::{self, Display},
};

use parameter_server::PsErr;

/// The result type used in the entire inference crate.
pub type Result<T> = std::result::Result<T, InferenceErr>;

/// The inference error type.
#[derive(Debug)]
pub enum InferenceErr {
    /// The model was configured without topics.
    NoTopics,
    /// The vocabulary size was not set.
    NoVocabulary,
    /// A hyperparameter is outside of its domain.
    InvalidParam { name: &'static str, reason: String },
    /// The distributed model doesn't have the layout the optimizer expects.
    ShapeMismatch {
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },
    Server(PsErr),
}

impl Display for InferenceErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceErr::NoTopics => f.write_str("the amount of topics must be positive"),
            InferenceErr::NoVocabulary => f.write_str("the vocabulary size must be set"),
            InferenceErr::InvalidParam { name, reason } => write!(f, "invalid {name}: {reason}"),
            InferenceErr::ShapeMismatch { expected, got } => write!(
                f,
                "expected a model of {}x{} (+{}) parameters, the server holds {}x{} (+{})",
                expected.0, expected.1, expected.2, got.0, got.1, got.2
            ),
            InferenceErr::Server(e) => write!(f, "parameter server error: {e}"),
        }
    }
}

impl Error for InferenceErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InferenceErr::Server(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PsErr> for InferenceErr {
    fn from(value: PsErr) -> Self {
        Self::Server(value)
    }
}
