//! Operation codes used by the key-value and sub-document commands.

use std::fmt;

/// A protocol operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Fetch a whole document. Also the whole-document lookup spec inside a multi-lookup.
    Get = 0x00,
    /// Store a whole document. Also the whole-document replace spec inside a multi-mutation.
    Set = 0x01,
    /// Remove a whole document. Also the whole-document delete spec inside a multi-mutation.
    Delete = 0x04,
    /// Read a document from a replica.
    ReplicaRead = 0x83,
    /// Fetch the bucket topology over the key-value connection.
    GetClusterConfig = 0xb5,
    /// Read one path.
    SubGet = 0xc5,
    /// Check one path exists.
    SubExist = 0xc6,
    /// Add a dictionary entry, failing if present.
    SubDictAdd = 0xc7,
    /// Add or replace a dictionary entry.
    SubDictUpsert = 0xc8,
    /// Remove one path.
    SubDelete = 0xc9,
    /// Replace an existing path.
    SubReplace = 0xca,
    /// Append to an array.
    SubArrayPushLast = 0xcb,
    /// Prepend to an array.
    SubArrayPushFirst = 0xcc,
    /// Insert into an array at an index.
    SubArrayInsert = 0xcd,
    /// Append to an array if the value is not already present.
    SubArrayAddUnique = 0xce,
    /// Increment or decrement a number.
    SubCounter = 0xcf,
    /// Multi-path lookup envelope.
    SubMultiLookup = 0xd0,
    /// Multi-path mutation envelope.
    SubMultiMutation = 0xd1,
    /// Count the elements of an array or object.
    SubGetCount = 0xd2,
    /// Replace the document body with the content of an xattr.
    SubReplaceBodyWithXattr = 0xd3,
}

impl OpCode {
    /// Creates an opcode from its wire format value.
    pub fn from_value(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::Get,
            0x01 => Self::Set,
            0x04 => Self::Delete,
            0x83 => Self::ReplicaRead,
            0xb5 => Self::GetClusterConfig,
            0xc5 => Self::SubGet,
            0xc6 => Self::SubExist,
            0xc7 => Self::SubDictAdd,
            0xc8 => Self::SubDictUpsert,
            0xc9 => Self::SubDelete,
            0xca => Self::SubReplace,
            0xcb => Self::SubArrayPushLast,
            0xcc => Self::SubArrayPushFirst,
            0xcd => Self::SubArrayInsert,
            0xce => Self::SubArrayAddUnique,
            0xcf => Self::SubCounter,
            0xd0 => Self::SubMultiLookup,
            0xd1 => Self::SubMultiMutation,
            0xd2 => Self::SubGetCount,
            0xd3 => Self::SubReplaceBodyWithXattr,
            _ => return None,
        })
    }

    /// Returns the wire format value for this opcode.
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Returns true for opcodes that are valid inside a multi-lookup.
    pub fn is_lookup(self) -> bool {
        matches!(
            self,
            Self::Get | Self::SubGet | Self::SubExist | Self::SubGetCount
        )
    }

    /// Returns true for opcodes that are valid inside a multi-mutation.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::Set
                | Self::Delete
                | Self::SubDictAdd
                | Self::SubDictUpsert
                | Self::SubDelete
                | Self::SubReplace
                | Self::SubArrayPushLast
                | Self::SubArrayPushFirst
                | Self::SubArrayInsert
                | Self::SubArrayAddUnique
                | Self::SubCounter
                | Self::SubReplaceBodyWithXattr
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02x})", self, self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_values() {
        assert_eq!(OpCode::SubGet.value(), 0xc5);
        assert_eq!(OpCode::SubMultiLookup.value(), 0xd0);
        assert_eq!(OpCode::SubMultiMutation.value(), 0xd1);
        assert_eq!(OpCode::ReplicaRead.value(), 0x83);
    }

    #[test]
    fn test_from_value_covers_known_codes() {
        for code in [0x00u8, 0x01, 0x04, 0x83, 0xb5, 0xc5, 0xcf, 0xd3] {
            let op = OpCode::from_value(code).unwrap();
            assert_eq!(op.value(), code);
        }
        assert!(OpCode::from_value(0x7f).is_none());
    }

    #[test]
    fn test_lookup_and_mutation_classes_are_disjoint() {
        assert!(OpCode::SubExist.is_lookup());
        assert!(!OpCode::SubExist.is_mutation());
        assert!(OpCode::SubCounter.is_mutation());
        assert!(!OpCode::SubCounter.is_lookup());
        assert!(!OpCode::SubMultiLookup.is_lookup());
    }

    #[test]
    fn test_display() {
        assert_eq!(OpCode::SubGet.to_string(), "SubGet(0xc5)");
    }
}
