//! Path-level and document-level flag bytes for sub-document operations.
//!
//! The two bytes travel in different places of a request and must never be mixed:
//! path flags prefix every spec, document flags live in the envelope extras.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Flags attached to a single path spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PathFlags(u8);

impl PathFlags {
    /// No flags.
    pub const NONE: PathFlags = PathFlags(0x00);
    /// Create intermediate path components that do not exist.
    pub const CREATE_PATH: PathFlags = PathFlags(0x01);
    /// The path addresses the extended attributes section.
    pub const XATTR: PathFlags = PathFlags(0x04);
    /// Expand server-side macros in the value. Only valid for xattr paths.
    pub const EXPAND_MACROS: PathFlags = PathFlags(0x10);
    /// The value is binary, used when replacing the body from an xattr.
    pub const BINARY_VALUE: PathFlags = PathFlags(0x20);

    /// Creates flags from their wire byte.
    pub const fn from_bits(bits: u8) -> Self {
        PathFlags(bits)
    }

    /// Returns the wire byte.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    pub const fn contains(self, other: PathFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the flags with the implied bits added.
    ///
    /// Macro expansion is only meaningful inside the attributes section, so
    /// `EXPAND_MACROS` always carries `XATTR` with it.
    pub const fn normalized(self) -> Self {
        if self.0 & Self::EXPAND_MACROS.0 != 0 {
            PathFlags(self.0 | Self::XATTR.0)
        } else {
            self
        }
    }
}

impl BitOr for PathFlags {
    type Output = PathFlags;

    fn bitor(self, rhs: PathFlags) -> PathFlags {
        PathFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for PathFlags {
    fn bitor_assign(&mut self, rhs: PathFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for PathFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Flags attached to the whole multi-path document operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DocFlags(u8);

impl DocFlags {
    /// No flags: the document must already exist.
    pub const NONE: DocFlags = DocFlags(0x00);
    /// Create the document if it does not exist.
    pub const UPSERT: DocFlags = DocFlags(0x01);
    /// Create the document, failing if it exists.
    pub const INSERT: DocFlags = DocFlags(0x02);
    /// Allow operating on a deleted document.
    pub const ACCESS_DELETED: DocFlags = DocFlags(0x04);
    /// Create the document in the deleted state.
    pub const CREATE_AS_DELETED: DocFlags = DocFlags(0x08);

    /// Creates flags from their wire byte.
    pub const fn from_bits(bits: u8) -> Self {
        DocFlags(bits)
    }

    /// Returns the wire byte.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    pub const fn contains(self, other: DocFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Path flags every spec must carry under these document flags.
    ///
    /// Deleted documents only expose their extended attributes.
    pub const fn implied_path_flags(self) -> PathFlags {
        if self.contains(DocFlags::ACCESS_DELETED) {
            PathFlags::XATTR
        } else {
            PathFlags::NONE
        }
    }
}

impl BitOr for DocFlags {
    type Output = DocFlags;

    fn bitor(self, rhs: DocFlags) -> DocFlags {
        DocFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for DocFlags {
    fn bitor_assign(&mut self, rhs: DocFlags) {
        self.0 |= rhs.0;
    }
}

/// Whole-document store semantics of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreSemantics {
    /// The document must exist.
    #[default]
    Replace,
    /// Create the document if missing.
    Upsert,
    /// The document must not exist.
    Insert,
    /// Operate on the document even when it is a tombstone.
    AccessDeleted,
}

impl StoreSemantics {
    /// Maps the semantics onto the document-flags byte.
    pub fn doc_flags(self) -> DocFlags {
        match self {
            StoreSemantics::Replace => DocFlags::NONE,
            StoreSemantics::Upsert => DocFlags::UPSERT,
            StoreSemantics::Insert => DocFlags::INSERT,
            StoreSemantics::AccessDeleted => DocFlags::ACCESS_DELETED,
        }
    }
}
