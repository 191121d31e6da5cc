use thiserror::Error;

/// Result type for taxonomy operations
pub type Result<T> = std::result::Result<T, TaxonomyError>;

/// Errors that can occur while reading or indexing a classification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaxonomyError {
    /// Node label does not follow the `Name [code][iso]` encoding
    #[error("Format error: {0}")]
    FormatError(String),

    /// Bracket tree text is malformed
    #[error("Parse error at offset {position}: {message}")]
    ParseError { position: usize, message: String },

    /// Identifier is not part of the classification
    #[error("Unknown node: {0}")]
    UnknownNode(String),
}

impl TaxonomyError {
    /// Create a label format error
    pub fn format(msg: impl Into<String>) -> Self {
        Self::FormatError(msg.into())
    }

    /// Create a tree parse error
    pub fn parse(position: usize, msg: impl Into<String>) -> Self {
        Self::ParseError {
            position,
            message: msg.into(),
        }
    }
}
