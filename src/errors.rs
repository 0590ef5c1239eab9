//! Storage Layer Error Hierarchy
//!
//! Defines the error types for the tenant-aware object storage core,
//! categorized by identity validation, storage access and configuration
//! concerns.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Resource identity validation and key codec failures
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Storage access failures (absent keys, version conflicts, backend faults)
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Identity validation failures. Non-retryable; the caller must fix its input.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// Name rejected by path-segment validation
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Account or namespace segment rejected before key concatenation
    #[error("invalid {segment} segment {value:?}: {reason}")]
    InvalidSegment {
        segment: &'static str,
        value: String,
        reason: &'static str,
    },

    /// Namespaced encoding requested for an identity without a namespace
    #[error("resource {name:?} requires a namespace")]
    MissingNamespace { name: String },

    /// Account-scoped encoding requested for an identity carrying a namespace
    #[error("resource {name:?} is not namespaced but namespace {namespace:?} was supplied")]
    UnexpectedNamespace { name: String, namespace: String },

    /// A key read back from the backend does not decode under the fixed segment order
    #[error("malformed storage key {key:?}")]
    MalformedKey { key: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Absent key on a non-tolerant read, update or delete
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// Conditional write or delete lost against a concurrent writer
    #[error("version conflict on {key} (expected: {expected}, actual: {actual})")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// Caller-initiated abort of a retry loop or watch
    #[error("{operation} cancelled by caller")]
    Cancelled { operation: &'static str },

    /// Transport or connectivity failure. Propagated immediately; retry
    /// policy belongs to the caller.
    #[error("backend unavailable: {source}")]
    Unavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Stored record failed envelope validation
    #[error("stored record corrupted at {key}")]
    Corrupt { key: String },

    /// Serialization failures for persisted envelopes
    #[error(transparent)]
    Serialization(#[from] bincode::Error),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    Db(String),

    /// At-rest value transformer failures
    #[error("value transform failed: {source}")]
    Transform {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StorageError {
    pub fn unavailable(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable { source: Box::new(source) }
    }
}

// ============== Conversion Implementations ============== //
impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::Db(err.to_string()).into()
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err).into()
    }
}
