//! Response status codes and their mapping onto the error taxonomy.

use crate::error::{DocstoreError, SubDocErrorKind};

/// A response status as carried in the packet header or a sub-document result entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    /// The operation succeeded.
    Success,
    /// The document does not exist.
    KeyNotFound,
    /// The document exists (or the CAS did not match).
    KeyExists,
    /// The value is too large.
    ValueTooLarge,
    /// Invalid arguments.
    InvalidArguments,
    /// The server does not own the partition.
    NotMyVbucket,
    /// The document is locked.
    Locked,
    /// Temporary failure, retry later.
    TemporaryFailure,
    /// The requested durability level is impossible with the current topology.
    DurabilityImpossible,
    /// A sub-document path failed.
    SubDoc(SubDocErrorKind),
    /// At least one path of a multi-path operation failed.
    MultiPathFailure,
    /// The operation succeeded against a deleted (tombstoned) document.
    SuccessDeleted,
    /// A path failed against a deleted document.
    MultiPathFailureDeleted,
    /// Any status this client does not recognize.
    Unknown(u16),
}

impl ResponseStatus {
    /// Creates a status from its wire format value.
    pub fn from_value(value: u16) -> Self {
        match value {
            0x00 => Self::Success,
            0x01 => Self::KeyNotFound,
            0x02 => Self::KeyExists,
            0x03 => Self::ValueTooLarge,
            0x04 => Self::InvalidArguments,
            0x07 => Self::NotMyVbucket,
            0x09 => Self::Locked,
            0x86 => Self::TemporaryFailure,
            0xa1 => Self::DurabilityImpossible,
            0xc0 => Self::SubDoc(SubDocErrorKind::PathNotFound),
            0xc1 => Self::SubDoc(SubDocErrorKind::PathMismatch),
            0xc2 => Self::SubDoc(SubDocErrorKind::PathInvalid),
            0xc3 => Self::SubDoc(SubDocErrorKind::PathTooBig),
            0xc4 => Self::SubDoc(SubDocErrorKind::DocTooDeep),
            0xc5 => Self::SubDoc(SubDocErrorKind::CannotInsert),
            0xc6 => Self::SubDoc(SubDocErrorKind::DocNotJson),
            0xc7 => Self::SubDoc(SubDocErrorKind::NumRange),
            0xc8 => Self::SubDoc(SubDocErrorKind::DeltaRange),
            0xc9 => Self::SubDoc(SubDocErrorKind::PathExists),
            0xca => Self::SubDoc(SubDocErrorKind::ValueTooDeep),
            0xcb => Self::SubDoc(SubDocErrorKind::InvalidCombo),
            0xcc => Self::MultiPathFailure,
            0xcd => Self::SuccessDeleted,
            0xce => Self::SubDoc(SubDocErrorKind::XattrInvalidFlagCombo),
            0xcf => Self::SubDoc(SubDocErrorKind::XattrInvalidKeyCombo),
            0xd0 => Self::SubDoc(SubDocErrorKind::XattrUnknownMacro),
            0xd1 => Self::SubDoc(SubDocErrorKind::XattrUnknownVattr),
            0xd2 => Self::SubDoc(SubDocErrorKind::XattrCannotModifyVattr),
            0xd3 => Self::MultiPathFailureDeleted,
            other if (0xc0..=0xdf).contains(&other) => {
                Self::SubDoc(SubDocErrorKind::Other(other))
            }
            other => Self::Unknown(other),
        }
    }

    /// Returns the wire format value for this status.
    pub fn value(self) -> u16 {
        match self {
            Self::Success => 0x00,
            Self::KeyNotFound => 0x01,
            Self::KeyExists => 0x02,
            Self::ValueTooLarge => 0x03,
            Self::InvalidArguments => 0x04,
            Self::NotMyVbucket => 0x07,
            Self::Locked => 0x09,
            Self::TemporaryFailure => 0x86,
            Self::DurabilityImpossible => 0xa1,
            Self::SubDoc(kind) => match kind {
                SubDocErrorKind::PathNotFound => 0xc0,
                SubDocErrorKind::PathMismatch => 0xc1,
                SubDocErrorKind::PathInvalid => 0xc2,
                SubDocErrorKind::PathTooBig => 0xc3,
                SubDocErrorKind::DocTooDeep => 0xc4,
                SubDocErrorKind::CannotInsert => 0xc5,
                SubDocErrorKind::DocNotJson => 0xc6,
                SubDocErrorKind::NumRange => 0xc7,
                SubDocErrorKind::DeltaRange => 0xc8,
                SubDocErrorKind::PathExists => 0xc9,
                SubDocErrorKind::ValueTooDeep => 0xca,
                SubDocErrorKind::InvalidCombo => 0xcb,
                SubDocErrorKind::XattrInvalidFlagCombo => 0xce,
                SubDocErrorKind::XattrInvalidKeyCombo => 0xcf,
                SubDocErrorKind::XattrUnknownMacro => 0xd0,
                SubDocErrorKind::XattrUnknownVattr => 0xd1,
                SubDocErrorKind::XattrCannotModifyVattr => 0xd2,
                SubDocErrorKind::Other(value) => value,
            },
            Self::MultiPathFailure => 0xcc,
            Self::SuccessDeleted => 0xcd,
            Self::MultiPathFailureDeleted => 0xd3,
            Self::Unknown(value) => value,
        }
    }

    /// Returns true if the whole operation succeeded, including against a tombstone.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::SuccessDeleted)
    }

    /// Returns true if a multi-path response body follows this status.
    pub fn carries_subdoc_body(self) -> bool {
        matches!(
            self,
            Self::Success
                | Self::SuccessDeleted
                | Self::MultiPathFailure
                | Self::MultiPathFailureDeleted
        )
    }

    /// Returns true if the status reports a deleted document.
    pub fn is_deleted(self) -> bool {
        matches!(self, Self::SuccessDeleted | Self::MultiPathFailureDeleted)
    }

    /// Converts a per-path status into the error raised when its content is requested.
    ///
    /// Returns `None` for successful statuses.
    pub fn to_path_error(self, index: usize) -> Option<DocstoreError> {
        match self {
            Self::Success | Self::SuccessDeleted => None,
            Self::SubDoc(kind) => Some(DocstoreError::SubDocument { index, kind }),
            other => Some(DocstoreError::SubDocument {
                index,
                kind: SubDocErrorKind::Other(other.value()),
            }),
        }
    }

    /// Converts a document-level status into an error for `key`.
    ///
    /// `cas_supplied` turns `KeyExists` into a CAS mismatch. Returns `None` for
    /// statuses that do not fail the whole operation.
    pub fn to_document_error(self, key: &str, cas_supplied: bool) -> Option<DocstoreError> {
        match self {
            status if status.carries_subdoc_body() => None,
            Self::KeyNotFound => Some(DocstoreError::DocumentNotFound(key.to_string())),
            Self::KeyExists if cas_supplied => Some(DocstoreError::CasMismatch(key.to_string())),
            Self::KeyExists => Some(DocstoreError::DocumentExists(key.to_string())),
            Self::SubDoc(kind) => Some(DocstoreError::SubDocument { index: 0, kind }),
            other => Some(DocstoreError::Server {
                status: other.value(),
            }),
        }
    }
}
