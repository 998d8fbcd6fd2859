//! Error types for the indexing layer
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Propagation
//!
//! - Registry errors (`AlreadyExists`, `NotFound`) are returned synchronously
//!   and never retried.
//! - Extraction failures are isolated per definition. They never fail the
//!   base-store mutation; they are collected as [`MaintenanceFailure`]s and
//!   only become an `Error::PartialFailure` when a caller asks for one.

use crate::types::DocumentId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for indexing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the indexing layer
#[derive(Debug, Error)]
pub enum Error {
    /// A definition with this name is already registered
    #[error("Definition already exists: {name}")]
    AlreadyExists {
        /// Conflicting name
        name: String,
    },

    /// No definition is registered under this name
    #[error("Definition not found: {name}")]
    NotFound {
        /// Requested name
        name: String,
    },

    /// The aggregator has no state for the requested group
    #[error("Group {group} not found in aggregator {aggregator}")]
    GroupNotFound {
        /// Aggregator name
        aggregator: String,
        /// Rendered group tuple
        group: String,
    },

    /// Key bytes were not produced by the key codec
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    /// A definition's extraction failed for a document
    #[error("Extraction failed for {definition} on document {document}: {cause}")]
    ExtractionFailed {
        /// Definition name
        definition: String,
        /// Document the extraction ran against
        document: DocumentId,
        /// Underlying cause
        cause: ExtractError,
    },

    /// One or more definitions failed to apply a mutation
    #[error("Partial failure: {} definition(s) fell behind ({})", .0.len(), failure_names(.0))]
    PartialFailure(Vec<MaintenanceFailure>),

    /// Document content is not representable
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Filter expression could not be parsed
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Definition is not usable as given
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (config files)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl Error {
    /// Shorthand for `NotFound`
    pub fn not_found(name: impl Into<String>) -> Self {
        Error::NotFound { name: name.into() }
    }

    /// Shorthand for `AlreadyExists`
    pub fn already_exists(name: impl Into<String>) -> Self {
        Error::AlreadyExists { name: name.into() }
    }

    /// Check if this is a not-found error (definition or group)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::GroupNotFound { .. })
    }
}

fn failure_names(failures: &[MaintenanceFailure]) -> String {
    failures
        .iter()
        .map(|f| f.definition.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why a single extraction did not produce a key set
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExtractError {
    /// A field held a value of the wrong shape
    #[error("field '{field}' expected {expected}, found {found}")]
    TypeMismatch {
        /// Field name
        field: String,
        /// Expected shape
        expected: String,
        /// Shape found in the document
        found: String,
    },

    /// A compound extractor produced more than one tuple
    #[error("compound definition produced {count} keys, expected at most one")]
    Cardinality {
        /// Number of tuples produced
        count: usize,
    },

    /// An extracted key exceeds the configured size limit
    #[error("derived key of {actual} bytes exceeds limit of {max}")]
    KeyTooLarge {
        /// Encoded size
        actual: usize,
        /// Configured limit
        max: usize,
    },

    /// A multi extractor produced more keys than allowed per document
    #[error("{actual} derived keys exceed the per-document limit of {max}")]
    TooManyKeys {
        /// Keys produced
        actual: usize,
        /// Configured limit
        max: usize,
    },

    /// Extraction did not finish within the configured timeout
    #[error("extraction timed out after {elapsed_ms}ms")]
    Timeout {
        /// Time waited before giving up
        elapsed_ms: u64,
    },

    /// Too many timed-out extractions are still running to start another
    #[error("{running} extraction threads still running, limit reached")]
    Overloaded {
        /// Extraction threads alive when the call was refused
        running: usize,
    },

    /// The extraction function panicked
    #[error("extraction panicked: {0}")]
    Panicked(String),

    /// Error raised by a user-supplied extractor
    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    /// Shorthand for `Custom`
    pub fn custom(msg: impl Into<String>) -> Self {
        ExtractError::Custom(msg.into())
    }
}

/// Which family a definition belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DefinitionKind {
    /// Secondary index
    Index,
    /// Aggregator
    Aggregator,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionKind::Index => write!(f, "index"),
            DefinitionKind::Aggregator => write!(f, "aggregator"),
        }
    }
}

/// A definition that fell behind while applying a mutation
///
/// Every failure names the definition and document so it can be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceFailure {
    /// Definition name
    pub definition: String,
    /// Index or aggregator
    pub kind: DefinitionKind,
    /// Affected document
    pub document: DocumentId,
    /// Why it failed
    pub cause: ExtractError,
}

impl MaintenanceFailure {
    /// Convert into the equivalent `ExtractionFailed` error
    pub fn into_error(self) -> Error {
        Error::ExtractionFailed {
            definition: self.definition,
            document: self.document,
            cause: self.cause,
        }
    }
}

impl fmt::Display for MaintenanceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' on document {}: {}",
            self.kind, self.definition, self.document, self.cause
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(name: &str) -> MaintenanceFailure {
        MaintenanceFailure {
            definition: name.to_string(),
            kind: DefinitionKind::Index,
            document: DocumentId::from("doc-1"),
            cause: ExtractError::custom("boom"),
        }
    }

    #[test]
    fn test_error_display_already_exists() {
        let err = Error::already_exists("user_interests");
        assert_eq!(err.to_string(), "Definition already exists: user_interests");
    }

    #[test]
    fn test_error_display_not_found() {
        let err = Error::not_found("missing");
        assert!(err.to_string().contains("missing"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_display_partial_failure_lists_definitions() {
        let err = Error::PartialFailure(vec![failure("a"), failure("b")]);
        let msg = err.to_string();
        assert!(msg.contains("2 definition(s)"));
        assert!(msg.contains("a, b"));
    }

    #[test]
    fn test_error_display_extraction_failed() {
        let err = failure("by_tag").into_error();
        let msg = err.to_string();
        assert!(msg.contains("by_tag"));
        assert!(msg.contains("doc-1"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_extract_error_messages() {
        assert_eq!(
            ExtractError::Cardinality { count: 3 }.to_string(),
            "compound definition produced 3 keys, expected at most one"
        );
        assert_eq!(
            ExtractError::Timeout { elapsed_ms: 50 }.to_string(),
            "extraction timed out after 50ms"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing file");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn test_failure_display() {
        let msg = failure("x").to_string();
        assert_eq!(msg, "index 'x' on document doc-1: boom");
    }
}
