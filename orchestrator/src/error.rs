use std::{
    error::Error,
    fmt::{self, Display},
};

use corpus::CorpusErr;
use inference::InferenceErr;
use parameter_server::PsErr;

/// The result type used in the entire orchestrator crate.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// An invalid training configuration, always detected before any document is read.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigErr {
    NoTopics,
    NoVocabulary,
    UnknownOptimizer(String),
    UnknownModel(String),
    Invalid { field: &'static str, reason: String },
}

impl Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::NoTopics => f.write_str("the amount of topics must be positive"),
            ConfigErr::NoVocabulary => f.write_str("the vocabulary size must be set and positive"),
            ConfigErr::UnknownOptimizer(name) => {
                write!(f, "unknown optimizer '{name}', expected 'online' or 'gibbs'")
            }
            ConfigErr::UnknownModel(name) => {
                write!(f, "unknown model '{name}', expected 'lda' or 'hdp'")
            }
            ConfigErr::Invalid { field, reason } => write!(f, "invalid {field}: {reason}"),
        }
    }
}

impl Error for ConfigErr {}

/// Training failures.
#[derive(Debug)]
pub enum TrainErr {
    Config(ConfigErr),
    Corpus(CorpusErr),
    Server(PsErr),
    Inference(InferenceErr),
}

impl Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Config(e) => write!(f, "configuration error: {e}"),
            TrainErr::Corpus(e) => write!(f, "corpus error: {e}"),
            TrainErr::Server(e) => write!(f, "parameter server error: {e}"),
            TrainErr::Inference(e) => write!(f, "inference error: {e}"),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Config(e) => Some(e),
            TrainErr::Corpus(e) => Some(e),
            TrainErr::Server(e) => Some(e),
            TrainErr::Inference(e) => Some(e),
        }
    }
}

impl From<ConfigErr> for TrainErr {
    fn from(value: ConfigErr) -> Self {
        Self::Config(value)
    }
}

impl From<CorpusErr> for TrainErr {
    fn from(value: CorpusErr) -> Self {
        Self::Corpus(value)
    }
}

impl From<PsErr> for TrainErr {
    fn from(value: PsErr) -> Self {
        Self::Server(value)
    }
}

/// Parameter problems reported by the optimizer are configuration errors.
impl From<InferenceErr> for TrainErr {
    fn from(value: InferenceErr) -> Self {
        match value {
            InferenceErr::NoTopics => Self::Config(ConfigErr::NoTopics),
            InferenceErr::NoVocabulary => Self::Config(ConfigErr::NoVocabulary),
            InferenceErr::InvalidParam { name, reason } => {
                Self::Config(ConfigErr::Invalid { field: name, reason })
            }
            InferenceErr::Server(e) => Self::Server(e),
            other => Self::Inference(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_are_reported() {
        let msg = TrainErr::from(ConfigErr::UnknownOptimizer("foo".into())).to_string();
        assert!(msg.contains("foo"));
        assert!(ConfigErr::UnknownModel("lsa".into()).to_string().contains("lsa"));
    }

    #[test]
    fn optimizer_parameter_errors_become_config_errors() {
        assert!(matches!(
            TrainErr::from(InferenceErr::NoTopics),
            TrainErr::Config(ConfigErr::NoTopics)
        ));
        assert!(matches!(
            TrainErr::from(InferenceErr::Server(PsErr::Recycled)),
            TrainErr::Server(PsErr::Recycled)
        ));
    }
}
