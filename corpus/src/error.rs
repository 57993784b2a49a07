use std::{error::Error, fmt, io};

/// The corpus module's result type.
pub type Result<T> = std::result::Result<T, CorpusErr>;

/// Failures while building, reading or validating documents.
#[derive(Debug)]
pub enum CorpusErr {
    Io(io::Error),
    Parse {
        line: usize,
        source: serde_json::Error,
    },
    LengthMismatch {
        indices: usize,
        values: usize,
    },
    IndexOutOfRange {
        index: u32,
        size: usize,
    },
    UnsortedIndices {
        position: usize,
    },
    InvalidValue {
        index: u32,
        value: f64,
    },
    VocabularyMismatch {
        id: u64,
        got: usize,
        expected: usize,
    },
    DuplicateId(u64),
}

impl fmt::Display for CorpusErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorpusErr::Io(e) => write!(f, "io error: {e}"),
            CorpusErr::Parse { line, source } => {
                write!(f, "malformed corpus record at line {line}: {source}")
            }
            CorpusErr::LengthMismatch { indices, values } => write!(
                f,
                "sparse vector has {indices} indices but {values} values"
            ),
            CorpusErr::IndexOutOfRange { index, size } => {
                write!(f, "term index {index} is out of range for a vector of size {size}")
            }
            CorpusErr::UnsortedIndices { position } => write!(
                f,
                "sparse vector indices must be strictly increasing, violated at position {position}"
            ),
            CorpusErr::InvalidValue { index, value } => write!(
                f,
                "term frequency for index {index} must be finite and non-negative, got {value}"
            ),
            CorpusErr::VocabularyMismatch { id, got, expected } => write!(
                f,
                "document {id} has a term vector of size {got}, expected vocabulary size {expected}"
            ),
            CorpusErr::DuplicateId(id) => write!(f, "document id {id} appears more than once"),
        }
    }
}

impl Error for CorpusErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CorpusErr::Io(e) => Some(e),
            CorpusErr::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for CorpusErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
