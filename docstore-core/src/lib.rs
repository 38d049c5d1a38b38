//! Core types and protocols for the docstore client.
//!
//! This crate is free of I/O: it holds the error taxonomy, the binary protocol
//! (packets, sub-document specs, encoder and decoder), key partitioning and
//! the serialization seams shared by the async client.

#![warn(missing_docs)]

pub mod error;
pub mod partition;
pub mod protocol;
pub mod serialization;

pub use error::{DocstoreError, Result, SourceFailure, SubDocErrorKind};
pub use partition::{Crc32Hasher, HashAlgorithm, PartitionHasher, PartitionIndex};
pub use serialization::{DataFormat, JsonSerializer, JsonTranscoder, Serializer, Transcoder};
