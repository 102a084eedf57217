//! Error types for order book processing.
//!
//! Errors fall into two families. Sequencing and data-format errors are
//! always fatal to the message being processed and propagate to whoever
//! drives dispatch. Strict-mode violations only exist when strict checking
//! is switched on, and structural mismatches only come out of explicit
//! `assert_equal` calls.

use thiserror::Error;

/// Result type alias for order book operations.
pub type Result<T> = std::result::Result<T, BookError>;

/// Coarse classification of a [`BookError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Update delivered before any clear/initial/recap.
    Sequencing,
    /// Payload does not carry the fields the dictionary declares.
    DataFormat,
    /// Duplicate add or update/remove of a missing entry under strict checking.
    StrictViolation,
    /// Two books (or levels, or entries) differ.
    Mismatch,
    /// Anything else (I/O, JSON, snapshot requests).
    Other,
}

/// Main error type for order book operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookError {
    /// An update arrived before the listener saw its first recap.
    #[error("got update before initial/recap")]
    UpdateBeforeRecap,

    /// Required fields are absent or malformed in a payload.
    #[error("data format error: {0}")]
    DataFormat(String),

    /// Strict checking: an entry with this id already exists in the level.
    #[error("attempted to add an existent entry: {id}")]
    DuplicateEntry { id: String },

    /// Strict checking: an update or delete named an unknown entry.
    #[error("attempted to {op} a non-existent entry: {id}")]
    EntryNotFound { id: String, op: &'static str },

    /// Structural comparison failed.
    #[error("book mismatch: {0}")]
    Mismatch(String),

    /// The snapshot requester could not issue or track a request.
    #[error("snapshot request failed: {0}")]
    Snapshot(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Generic(String),
}

impl BookError {
    /// Create a generic error from any string-like type.
    pub fn generic(msg: impl Into<String>) -> Self {
        BookError::Generic(msg.into())
    }

    /// Create a data format error.
    pub fn data_format(msg: impl Into<String>) -> Self {
        BookError::DataFormat(msg.into())
    }

    /// Create a structural mismatch error.
    pub fn mismatch(msg: impl Into<String>) -> Self {
        BookError::Mismatch(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookError::UpdateBeforeRecap => ErrorKind::Sequencing,
            BookError::DataFormat(_) => ErrorKind::DataFormat,
            BookError::DuplicateEntry { .. } | BookError::EntryNotFound { .. } => {
                ErrorKind::StrictViolation
            }
            BookError::Mismatch(_) => ErrorKind::Mismatch,
            BookError::Snapshot(_) | BookError::Generic(_) => ErrorKind::Other,
        }
    }

    /// Whether the error always aborts processing of the current message,
    /// regardless of configuration.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Sequencing | ErrorKind::DataFormat)
    }
}

impl From<std::io::Error> for BookError {
    fn from(err: std::io::Error) -> Self {
        BookError::Generic(format!("IO error: {err}"))
    }
}

impl From<serde_json::Error> for BookError {
    fn from(err: serde_json::Error) -> Self {
        BookError::Generic(format!("JSON error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BookError::UpdateBeforeRecap.to_string(),
            "got update before initial/recap"
        );
        let err = BookError::EntryNotFound {
            id: "MM1".to_string(),
            op: "update",
        };
        assert_eq!(
            err.to_string(),
            "attempted to update a non-existent entry: MM1"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(BookError::UpdateBeforeRecap.kind(), ErrorKind::Sequencing);
        assert!(BookError::UpdateBeforeRecap.is_fatal());
        assert!(BookError::data_format("no levels").is_fatal());

        let dup = BookError::DuplicateEntry { id: "A".into() };
        assert_eq!(dup.kind(), ErrorKind::StrictViolation);
        assert!(!dup.is_fatal());
        assert!(!BookError::mismatch("size not equal").is_fatal());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: BookError = io.into();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(err.to_string().contains("missing"));
    }
}
