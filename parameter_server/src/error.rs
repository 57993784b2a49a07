use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire parameter server crate.
pub type Result<T> = std::result::Result<T, PsErr>;

/// The parameter server's error type.
#[derive(Debug)]
pub enum PsErr {
    /// A provided buffer length doesn't match the size of the model.
    SizeMismatch { got: usize, expected: usize },
    /// The server was already released with `recycle`.
    Recycled,
    /// The model specification can't be materialized.
    InvalidSpec(String),
    Io(io::Error),
    Serialization(serde_json::Error),
}

impl Display for PsErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PsErr::SizeMismatch { got, expected } => write!(
                f,
                "the provided buffer has {got} values but the model holds {expected} parameters"
            ),
            PsErr::Recycled => f.write_str("the parameter server has already been recycled"),
            PsErr::InvalidSpec(msg) => write!(f, "invalid model specification: {msg}"),
            PsErr::Io(e) => write!(f, "io error: {e}"),
            PsErr::Serialization(e) => write!(f, "checkpoint serialization error: {e}"),
        }
    }
}

impl Error for PsErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PsErr::Io(e) => Some(e),
            PsErr::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PsErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for PsErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}
