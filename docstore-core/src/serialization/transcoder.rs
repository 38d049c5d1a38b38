//! Whole-document transcoding driven by the common flags format.

use std::fmt::Debug;

use serde_json::Value;

use crate::error::{DocstoreError, Result};
use crate::protocol::{
    common_flags, COMMON_FLAGS_MASK, COMMON_FLAGS_SHIFT, FORMAT_BINARY, FORMAT_JSON,
    FORMAT_PRIVATE, FORMAT_STRING,
};

/// Content format recorded in the top byte of the document flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFormat {
    /// Legacy or client-private encoding.
    Private,
    /// JSON document.
    Json,
    /// Opaque binary.
    Binary,
    /// UTF-8 text.
    String,
}

impl DataFormat {
    /// Extracts the format from document flags. Flags without a format are JSON.
    pub fn from_flags(flags: u32) -> Self {
        match (flags >> COMMON_FLAGS_SHIFT) & COMMON_FLAGS_MASK {
            FORMAT_PRIVATE => DataFormat::Private,
            FORMAT_BINARY => DataFormat::Binary,
            FORMAT_STRING => DataFormat::String,
            _ => DataFormat::Json,
        }
    }

    /// Returns the document flags advertising this format.
    pub fn flags(self) -> u32 {
        match self {
            DataFormat::Private => common_flags(FORMAT_PRIVATE),
            DataFormat::Json => common_flags(FORMAT_JSON),
            DataFormat::Binary => common_flags(FORMAT_BINARY),
            DataFormat::String => common_flags(FORMAT_STRING),
        }
    }
}

/// Decodes whole-document bodies.
pub trait Transcoder: Send + Sync + Debug {
    /// Decodes `bytes` stored with `flags` into a JSON tree.
    fn decode(&self, bytes: &[u8], flags: u32) -> Result<Value>;
}

/// Default transcoder: JSON bodies parse as JSON, string bodies become JSON strings.
///
/// Binary and private bodies are refused; read them through the raw content accessor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonTranscoder;

impl Transcoder for JsonTranscoder {
    fn decode(&self, bytes: &[u8], flags: u32) -> Result<Value> {
        match DataFormat::from_flags(flags) {
            DataFormat::Json => serde_json::from_slice(bytes)
                .map_err(|e| DocstoreError::Serialization(e.to_string())),
            DataFormat::String => std::str::from_utf8(bytes)
                .map(|s| Value::String(s.to_string()))
                .map_err(|e| DocstoreError::Serialization(e.to_string())),
            format => Err(DocstoreError::Serialization(format!(
                "{format:?} content cannot be decoded as JSON"
            ))),
        }
    }
}
