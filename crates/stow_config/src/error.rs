//! Error types for snapshot layer loading and resolution.

use std::path::PathBuf;

use crate::compiler::ParseCompilerError;
use crate::location::ParseLocationError;

/// Broad classification of a [`ConfigError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// The document or one of its values could not be parsed.
    Parse,
    /// The document parsed but is not a valid snapshot layer.
    Validation,
    /// The document could not be read.
    Io,
}

/// Errors that can occur when loading or resolving a snapshot layer.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading a snapshot file.
    #[error("failed to read snapshot file: {0}")]
    IoError(#[from] std::io::Error),

    /// The document could not be deserialized from its transport format.
    #[error("failed to parse snapshot document: {0}")]
    ParseError(String),

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// More than one key names the parent snapshot.
    #[error("ambiguous snapshot parent: {}", .keys.join(" and "))]
    AmbiguousParent {
        /// The parent-determining keys that were present.
        keys: Vec<&'static str>,
    },

    /// No key names the parent snapshot.
    #[error("snapshot layer must specify a parent with 'resolver', 'snapshot' or 'compiler'")]
    MissingParent,

    /// The `compiler` value is not a valid compiler descriptor.
    #[error(transparent)]
    InvalidCompiler(#[from] ParseCompilerError),

    /// The `resolver` or `snapshot` value is not a valid snapshot location.
    #[error(transparent)]
    InvalidLocation(#[from] ParseLocationError),

    /// Following file parents led back to a file already visited.
    #[error("snapshot parent cycle through {0}")]
    ParentCycle(PathBuf),
}

impl ConfigError {
    /// Returns the broad classification of this error.
    pub fn kind(&self) -> ConfigErrorKind {
        match self {
            ConfigError::IoError(_) => ConfigErrorKind::Io,
            ConfigError::ParseError(_)
            | ConfigError::InvalidCompiler(_)
            | ConfigError::InvalidLocation(_) => ConfigErrorKind::Parse,
            ConfigError::MissingField(_)
            | ConfigError::AmbiguousParent { .. }
            | ConfigError::MissingParent
            | ConfigError::ParentCycle(_) => ConfigErrorKind::Validation,
        }
    }
}
