//! Error types for docstore operations.

use std::fmt;
use std::io;
use thiserror::Error;

/// The main error type for docstore operations.
#[derive(Debug, Error)]
pub enum DocstoreError {
    /// Connection-related errors (network failures, disconnections).
    #[error("connection error: {0}")]
    Connection(String),

    /// Protocol-related errors (malformed packets, response/spec count mismatch).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation timeout errors.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// Authentication errors (invalid credentials, failed login).
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Configuration errors (invalid settings, unusable topology documents).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The document does not exist.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// The document already exists and the operation required it not to.
    #[error("document exists: {0}")]
    DocumentExists(String),

    /// The supplied CAS did not match the document's current CAS.
    #[error("cas mismatch: {0}")]
    CasMismatch(String),

    /// The contacted server does not own the partition for the key.
    #[error("not my partition: partition {partition} rejected by {server}")]
    NotMyPartition {
        /// Partition the request was routed to.
        partition: u16,
        /// Address of the server that rejected it.
        server: String,
    },

    /// A single path of a sub-document operation failed.
    #[error("sub-document error at spec {index}: {kind}")]
    SubDocument {
        /// Position of the failing spec in send order.
        index: usize,
        /// What went wrong for that path.
        kind: SubDocErrorKind,
    },

    /// Every config source failed to bootstrap a bucket.
    #[error("bootstrap error: bucket {bucket} could not be bootstrapped ({})", format_failures(.failures))]
    Bootstrap {
        /// Name of the bucket being bootstrapped.
        bucket: String,
        /// One entry per config source that was tried, in priority order.
        failures: Vec<SourceFailure>,
    },

    /// The component was already disposed.
    #[error("disposed: {0}")]
    Disposed(String),

    /// The operation is not supported for this bucket or document.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The server answered with a status this client does not map to a richer error.
    #[error("server error: status 0x{status:04x}")]
    Server {
        /// Raw response status.
        status: u16,
    },

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DocstoreError {
    /// Returns true if the error signals that the locally cached topology is stale.
    pub fn is_stale_topology(&self) -> bool {
        matches!(self, DocstoreError::NotMyPartition { .. })
    }
}

/// A specialized `Result` type for docstore operations.
pub type Result<T> = std::result::Result<T, DocstoreError>;

/// Per-path sub-document failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubDocErrorKind {
    /// The path does not exist in the document.
    PathNotFound,
    /// The path exists but its type does not match the operation.
    PathMismatch,
    /// The path syntax is invalid.
    PathInvalid,
    /// The path is too long or has too many components.
    PathTooBig,
    /// The document is too deeply nested to parse.
    DocTooDeep,
    /// The value would make the document too deep.
    ValueTooDeep,
    /// The document body is not JSON.
    DocNotJson,
    /// The value cannot be inserted at the path.
    CannotInsert,
    /// The existing number is out of range.
    NumRange,
    /// The counter delta is out of range.
    DeltaRange,
    /// The path already exists.
    PathExists,
    /// The combination of specs is invalid.
    InvalidCombo,
    /// An unknown macro was used in an expanded xattr value.
    XattrUnknownMacro,
    /// Invalid flag combination for an xattr path.
    XattrInvalidFlagCombo,
    /// More than one xattr key was targeted in one operation.
    XattrInvalidKeyCombo,
    /// An unknown virtual attribute was requested.
    XattrUnknownVattr,
    /// Virtual attributes cannot be modified.
    XattrCannotModifyVattr,
    /// Unrecognized sub-document status.
    Other(u16),
}

impl fmt::Display for SubDocErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubDocErrorKind::PathNotFound => f.write_str("path not found"),
            SubDocErrorKind::PathMismatch => f.write_str("path mismatch"),
            SubDocErrorKind::PathInvalid => f.write_str("path invalid"),
            SubDocErrorKind::PathTooBig => f.write_str("path too big"),
            SubDocErrorKind::DocTooDeep => f.write_str("document too deep"),
            SubDocErrorKind::ValueTooDeep => f.write_str("value too deep"),
            SubDocErrorKind::DocNotJson => f.write_str("document not JSON"),
            SubDocErrorKind::CannotInsert => f.write_str("value cannot be inserted"),
            SubDocErrorKind::NumRange => f.write_str("number out of range"),
            SubDocErrorKind::DeltaRange => f.write_str("delta out of range"),
            SubDocErrorKind::PathExists => f.write_str("path exists"),
            SubDocErrorKind::InvalidCombo => f.write_str("invalid spec combination"),
            SubDocErrorKind::XattrUnknownMacro => f.write_str("unknown xattr macro"),
            SubDocErrorKind::XattrInvalidFlagCombo => f.write_str("invalid xattr flag combination"),
            SubDocErrorKind::XattrInvalidKeyCombo => f.write_str("invalid xattr key combination"),
            SubDocErrorKind::XattrUnknownVattr => f.write_str("unknown virtual attribute"),
            SubDocErrorKind::XattrCannotModifyVattr => {
                f.write_str("virtual attribute cannot be modified")
            }
            SubDocErrorKind::Other(status) => write!(f, "sub-document status 0x{status:04x}"),
        }
    }
}

/// One config source's contribution to an aggregated bootstrap error.
#[derive(Debug)]
pub struct SourceFailure {
    /// Name of the config source that failed.
    pub source_name: &'static str,
    /// The error it raised.
    pub error: Box<DocstoreError>,
}

impl SourceFailure {
    /// Creates a failure record for the named source.
    pub fn new(source_name: &'static str, error: DocstoreError) -> Self {
        Self {
            source_name,
            error: Box::new(error),
        }
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source_name, self.error)
    }
}

fn format_failures(failures: &[SourceFailure]) -> String {
    if failures.is_empty() {
        return "no config sources configured".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
