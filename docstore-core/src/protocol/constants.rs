//! Protocol constants for the memcached binary protocol as spoken by docstore servers.

/// Magic byte of a classic request packet.
pub const REQUEST_MAGIC: u8 = 0x80;

/// Magic byte of a classic response packet.
pub const RESPONSE_MAGIC: u8 = 0x81;

/// Magic byte of a request packet carrying framing extras.
pub const ALT_REQUEST_MAGIC: u8 = 0x08;

/// Magic byte of a response packet carrying framing extras.
pub const ALT_RESPONSE_MAGIC: u8 = 0x18;

/// Size of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Offset of the total body length field in the packet header.
pub const BODY_LENGTH_OFFSET: usize = 8;

/// Number of partitions in this protocol generation.
pub const PARTITION_COUNT: usize = 1024;

/// Mask applied to the key hash to obtain a partition index.
pub const PARTITION_MASK: u32 = (PARTITION_COUNT as u32) - 1;

/// Maximum number of path specs the server accepts in one multi-path operation.
pub const MAX_SUBDOC_SPECS: usize = 16;

/// Size of a lookup spec header: opcode, flags, path length.
pub const LOOKUP_SPEC_HEADER_SIZE: usize = 1 + 1 + 2;

/// Size of a mutation spec header: opcode, flags, path length, value length.
pub const MUTATION_SPEC_HEADER_SIZE: usize = 1 + 1 + 2 + 4;

/// Size of a lookup result entry header: status, value length.
pub const LOOKUP_RESULT_HEADER_SIZE: usize = 2 + 4;

/// Datatype byte for raw bytes.
pub const DATATYPE_RAW: u8 = 0x00;

/// Datatype bit marking a JSON body.
pub const DATATYPE_JSON: u8 = 0x01;

/// Datatype bit marking a compressed body.
pub const DATATYPE_SNAPPY: u8 = 0x02;

/// Datatype bit marking a body prefixed with extended attributes.
pub const DATATYPE_XATTR: u8 = 0x04;

/// Framing extra id carrying a durability requirement.
pub const FRAMING_EXTRA_DURABILITY: u8 = 0x01;

/// Virtual attribute holding the document expiry as epoch seconds.
pub const VATTR_DOCUMENT_EXPIRY: &str = "$document.exptime";

/// Virtual attribute holding the whole document metadata object.
pub const VATTR_DOCUMENT: &str = "$document";

/// Shift of the format nibble inside the common flags.
pub const COMMON_FLAGS_SHIFT: u32 = 24;

/// Mask of the format nibble once shifted.
pub const COMMON_FLAGS_MASK: u32 = 0x0f;

/// Common flags format: private/legacy.
pub const FORMAT_PRIVATE: u32 = 0x01;

/// Common flags format: JSON.
pub const FORMAT_JSON: u32 = 0x02;

/// Common flags format: binary.
pub const FORMAT_BINARY: u32 = 0x03;

/// Common flags format: UTF-8 string.
pub const FORMAT_STRING: u32 = 0x04;

/// Returns the common flags value for the given format nibble.
pub const fn common_flags(format: u32) -> u32 {
    format << COMMON_FLAGS_SHIFT
}
