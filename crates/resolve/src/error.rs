use phylo_taxonomy::TaxonomyError;
use thiserror::Error;

/// Result type for resolution operations
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Errors that abort a resolution run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// User input problem (bad group, unknown clock, malformed distribution, ...)
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// A calibration contradicts an active monophyly constraint
    #[error("Inconsistent constraints: {0}")]
    ConsistencyError(String),

    /// Input text does not follow the expected encoding
    #[error("Format error: {0}")]
    FormatError(String),

    /// Error raised while reading the classification
    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),
}

/// Coarse failure category, independent of where the error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Consistency,
    Format,
}

impl ResolveError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a consistency error
    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::ConsistencyError(msg.into())
    }

    /// Create a format error
    pub fn format(msg: impl Into<String>) -> Self {
        Self::FormatError(msg.into())
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigError(_) => ErrorKind::Config,
            Self::ConsistencyError(_) => ErrorKind::Consistency,
            Self::FormatError(_) => ErrorKind::Format,
            Self::Taxonomy(TaxonomyError::UnknownNode(_)) => ErrorKind::Config,
            Self::Taxonomy(_) => ErrorKind::Format,
        }
    }
}
