//! Key-to-partition hashing.
//!
//! Every key maps to one of [`PARTITION_COUNT`] partitions. The mapping is a
//! pure function of the key bytes and the bucket's hash algorithm, so it can
//! be computed on any thread without coordination.
//!
//! # Example
//!
//! ```
//! use docstore_core::partition::{Crc32Hasher, PartitionHasher};
//!
//! let hasher = Crc32Hasher;
//! assert_eq!(hasher.partition(b"foo"), 115);
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::DocstoreError;
use crate::protocol::{PARTITION_COUNT, PARTITION_MASK};

/// Index of a partition, always below [`PARTITION_COUNT`].
pub type PartitionIndex = u16;

/// Hashes keys onto partitions.
pub trait PartitionHasher: Send + Sync + fmt::Debug {
    /// Returns the raw 32-bit hash of `key`.
    fn hash(&self, key: &[u8]) -> u32;

    /// Returns the partition owning `key`: the hash masked with `PARTITION_MASK`.
    fn partition(&self, key: &[u8]) -> PartitionIndex {
        (self.hash(key) & PARTITION_MASK) as PartitionIndex
    }
}

/// The CRC32 key hash used by partitioned buckets.
///
/// The hash keeps bits 16..31 of the IEEE CRC32 of the key, which is what
/// servers use when they assign keys to partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crc32Hasher;

impl PartitionHasher for Crc32Hasher {
    fn hash(&self, key: &[u8]) -> u32 {
        (crc32fast::hash(key) >> 16) & 0x7fff
    }
}

/// Hash algorithm named by a topology document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// CRC32, the only algorithm servers currently advertise.
    #[default]
    Crc,
}

impl HashAlgorithm {
    /// Returns a hasher for this algorithm.
    pub fn hasher(self) -> &'static dyn PartitionHasher {
        match self {
            HashAlgorithm::Crc => &Crc32Hasher,
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = DocstoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("crc") {
            Ok(HashAlgorithm::Crc)
        } else {
            Err(DocstoreError::Configuration(format!(
                "unsupported hash algorithm: {s}"
            )))
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Crc => f.write_str("CRC"),
        }
    }
}

const _: () = assert!(PARTITION_COUNT == 1024);
