use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a `Sea` (or one of its inputs) fails validation. These are raised
/// before any time step is taken and are always fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("level {level}: unrecognized model tag '{tag}'")]
    InvalidModel { level: usize, tag: String },

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{0}' is given more than once")]
    DuplicateField(String),

    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("'{field}' has {actual} entries, expected {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("level {level}: invalid initial data: {reason}")]
    InvalidInitialData { level: usize, reason: String },

    #[error("level {level}: cannot nest a {child} grid inside a {parent} grid")]
    UnsupportedNesting {
        level: usize,
        parent: String,
        child: String,
    },

    #[error("level {level}: cannot decompose over {size} processes: {reason}")]
    Decomposition {
        level: usize,
        size: usize,
        reason: String,
    },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the simulation engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("singular matrix: pivot {pivot:e} in column {column}")]
    SingularMatrix { column: usize, pivot: f32 },

    #[error("numerical divergence: {0}")]
    NumericalDivergence(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("communication error (transient: {transient}): {reason}")]
    Communication { transient: bool, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("run aborted by rank {rank}: {reason}")]
    Aborted { rank: usize, reason: String },

    #[error("run interrupted at step {step}")]
    Interrupted { step: usize },

    #[error("level {level} on rank {rank} at step {step}: {source}")]
    InLevel {
        level: usize,
        rank: usize,
        step: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach the level, rank and step at which an error was raised.
    pub fn in_level(self, level: usize, rank: usize, step: usize) -> Self {
        match self {
            Error::InLevel { .. } | Error::Aborted { .. } => self,
            other => Error::InLevel {
                level,
                rank,
                step,
                source: Box::new(other),
            },
        }
    }

    /// Return the innermost error, looking through `InLevel` context.
    pub fn root(&self) -> &Error {
        match self {
            Error::InLevel { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root(), Error::Validation(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.root(), Error::Communication { transient: true, .. })
    }

    pub fn communication(reason: impl Into<String>, transient: bool) -> Self {
        Error::Communication {
            transient,
            reason: reason.into(),
        }
    }
}

impl From<crate::hydro::Error> for Error {
    fn from(e: crate::hydro::Error) -> Self {
        Error::NumericalDivergence(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
