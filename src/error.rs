//! Error types for the read service
//!
//! Every failure surfaced by the dispatcher or the bucket service is an
//! [`Error`]. Dependency errors keep their own type ([`StorageError`],
//! [`MetadataError`]) and are only wrapped enough to carry an [`ErrorKind`].

use crate::types::Id;
use std::fmt;
use thiserror::Error;

/// Main error type for the read service
#[derive(Error, Debug)]
pub enum Error {
    /// The request carried no source handle
    #[error("missing read source")]
    MissingSource,

    /// A tag-values request named no tag key
    #[error("missing tag key")]
    MissingTagKey,

    /// The source handle could not be decoded
    #[error("invalid source: {0}")]
    Decode(#[from] DecodeError),

    /// The predicate references field values where only tags are allowed
    #[error("field values unsupported")]
    FieldValuesUnsupported,

    /// The predicate could not be translated
    #[error("invalid predicate: {0}")]
    Predicate(TranslateError),

    /// The bucket does not exist
    #[error("bucket {0} not found")]
    NotFound(Id),

    /// Metadata store failure
    #[error("metadata store error: {0}")]
    Metadata(MetadataError),

    /// Storage engine failure, passed through unchanged
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// The request deadline elapsed
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// The request is well-formed but not acceptable
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classification used for metric labels and caller handling
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingSource => ErrorKind::MissingSource,
            Error::MissingTagKey => ErrorKind::MissingTagKey,
            Error::Decode(_) => ErrorKind::Decode,
            Error::FieldValuesUnsupported => ErrorKind::UnsupportedPredicate,
            Error::Predicate(_) | Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Metadata(_) => ErrorKind::Metadata,
            Error::Storage(_) => ErrorKind::Storage,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Error::Configuration(_) | Error::Io(_) => ErrorKind::Configuration,
        }
    }

    /// True when the caller must correct the request before retrying
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MissingSource
                | ErrorKind::MissingTagKey
                | ErrorKind::Decode
                | ErrorKind::UnsupportedPredicate
                | ErrorKind::InvalidRequest
        )
    }
}

impl From<TranslateError> for Error {
    fn from(e: TranslateError) -> Self {
        match e {
            TranslateError::UnsupportedPredicate => Error::FieldValuesUnsupported,
            other => Error::Predicate(other),
        }
    }
}

impl From<MetadataError> for Error {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::NotFound(id) => Error::NotFound(id),
            other => Error::Metadata(other),
        }
    }
}

/// Categories of errors for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Source handle absent
    MissingSource,
    /// Tag key absent
    MissingTagKey,
    /// Source handle malformed
    Decode,
    /// Predicate references field values
    UnsupportedPredicate,
    /// Request or predicate rejected
    InvalidRequest,
    /// Unknown bucket
    NotFound,
    /// Metadata store failure
    Metadata,
    /// Storage engine failure
    Storage,
    /// Cancelled by caller
    Cancelled,
    /// Deadline elapsed
    DeadlineExceeded,
    /// Configuration or IO failure
    Configuration,
}

impl ErrorKind {
    /// Stable lowercase name used as a metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingSource => "missing_source",
            ErrorKind::MissingTagKey => "missing_tag_key",
            ErrorKind::Decode => "decode",
            ErrorKind::UnsupportedPredicate => "unsupported_predicate",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Metadata => "metadata",
            ErrorKind::Storage => "storage",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source handle decoding errors
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The envelope declares a type this service does not know
    #[error("unknown source type: {0:?}")]
    UnknownType(String),

    /// The envelope or payload bytes are not a valid message
    #[error("malformed source: {0}")]
    Malformed(#[from] prost::DecodeError),

    /// The payload decoded but carries a zero identifier
    #[error("invalid {field} id: 0")]
    InvalidId {
        /// Which identifier was zero
        field: &'static str,
    },
}

/// Predicate translation errors
#[derive(Error, Debug)]
pub enum TranslateError {
    /// The predicate references the reserved field-value key
    #[error("predicate references field values")]
    UnsupportedPredicate,

    /// The node cannot appear where it was found
    #[error("unsupported node: {0}")]
    UnsupportedNode(String),

    /// A logical node needs at least two children
    #[error("logical expression requires at least 2 children, got {0}")]
    InvalidLogical(usize),

    /// A comparison has an operand it cannot compare
    #[error("invalid comparison: {0}")]
    InvalidComparison(String),

    /// A regex literal failed to compile
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        /// The pattern as supplied
        pattern: String,
        /// Compilation failure
        #[source]
        source: regex::Error,
    },
}

/// Storage engine errors
///
/// Produced by [`Viewer`](crate::engine::traits::Viewer) and
/// [`BucketDeleter`](crate::engine::traits::BucketDeleter) implementations.
/// The read service forwards these without reclassifying them.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The engine is temporarily unable to serve the call
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The engine failed permanently for this call
    #[error("storage failure: {0}")]
    Internal(String),

    /// IO operation failed
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether the engine considers a retry worthwhile
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Unavailable(_) => true,
            StorageError::Internal(_) => false,
            StorageError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
        }
    }
}

/// Bucket metadata store errors
#[derive(Error, Debug)]
pub enum MetadataError {
    /// No bucket with this ID
    #[error("bucket {0} not found")]
    NotFound(Id),

    /// The store could not be reached
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),

    /// The store failed for another reason
    #[error("metadata store failure: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_predicate_maps_to_field_values() {
        let err: Error = TranslateError::UnsupportedPredicate.into();
        assert!(matches!(err, Error::FieldValuesUnsupported));
        assert_eq!(err.kind(), ErrorKind::UnsupportedPredicate);
        assert_eq!(err.to_string(), "field values unsupported");
    }

    #[test]
    fn test_other_translate_errors_stay_predicate() {
        let err: Error = TranslateError::InvalidLogical(1).into();
        assert!(matches!(err, Error::Predicate(TranslateError::InvalidLogical(1))));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_metadata_not_found_maps_to_not_found() {
        let err: Error = MetadataError::NotFound(Id(7)).into();
        assert!(matches!(err, Error::NotFound(Id(7))));
        assert!(!err.is_client_error());

        let err: Error = MetadataError::Unavailable("down".into()).into();
        assert_eq!(err.kind(), ErrorKind::Metadata);
    }

    #[test]
    fn test_storage_error_passes_through() {
        let err: Error = StorageError::Unavailable("shard offline".into()).into();
        assert_eq!(err.to_string(), "storage unavailable: shard offline");
        match err {
            Error::Storage(inner) => assert!(inner.is_transient()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
