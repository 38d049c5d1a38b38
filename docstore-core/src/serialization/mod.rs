//! Document content serialization.
//!
//! Two seams exist: a [`Serializer`] turns individual sub-document values
//! to and from bytes, and a [`Transcoder`] decodes whole-document bodies
//! according to the format recorded in the document's common flags.

mod json;
mod transcoder;

pub use json::JsonSerializer;
pub use transcoder::{DataFormat, JsonTranscoder, Transcoder};

use std::fmt::Debug;

use serde_json::Value;

use crate::error::Result;

/// Converts sub-document values between bytes and JSON trees.
pub trait Serializer: Send + Sync + Debug {
    /// Decodes `bytes` into a JSON tree.
    fn deserialize(&self, bytes: &[u8]) -> Result<Value>;

    /// Encodes a JSON tree into bytes.
    fn serialize(&self, value: &Value) -> Result<Vec<u8>>;
}
