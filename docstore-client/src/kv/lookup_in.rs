//! Multi-path lookups.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use docstore_core::protocol::{OpCode, OperationSpec, PathFlags, ResponseStatus, SpecQueue};
use docstore_core::{DocstoreError, Result, Serializer, SubDocErrorKind};

use super::collection::Collection;
use super::options::LookupInOptions;

/// One path-level read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupInSpec {
    opcode: OpCode,
    path: String,
    flags: PathFlags,
}

impl LookupInSpec {
    fn new(opcode: OpCode, path: impl Into<String>) -> Self {
        Self {
            opcode,
            path: path.into(),
            flags: PathFlags::NONE,
        }
    }

    /// Reads the value at `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(OpCode::SubGet, path)
    }

    /// Checks whether `path` exists.
    pub fn exists(path: impl Into<String>) -> Self {
        Self::new(OpCode::SubExist, path)
    }

    /// Counts the elements of the array or object at `path`.
    pub fn count(path: impl Into<String>) -> Self {
        Self::new(OpCode::SubGetCount, path)
    }

    /// Reads the whole document body.
    pub fn get_full() -> Self {
        Self::new(OpCode::Get, "")
    }

    /// Targets the extended attributes section.
    pub fn xattr(mut self) -> Self {
        self.flags |= PathFlags::XATTR;
        self
    }

    pub(crate) fn into_operation(self) -> OperationSpec {
        OperationSpec::new(self.opcode, self.path, self.flags)
    }
}

/// Accumulates lookup specs for one document, then executes them as one request.
///
/// Specs are answered in the order they were added. `Clone` yields an
/// independent builder with fresh specs.
#[derive(Debug, Clone)]
pub struct LookupInBuilder {
    collection: Collection,
    key: String,
    specs: SpecQueue,
    options: LookupInOptions,
}

impl LookupInBuilder {
    pub(crate) fn new(collection: Collection, key: impl Into<String>) -> Self {
        Self {
            collection,
            key: key.into(),
            specs: SpecQueue::new(),
            options: LookupInOptions::default(),
        }
    }

    /// Appends a spec.
    pub fn spec(&self, spec: LookupInSpec) -> &Self {
        self.specs.push(spec.into_operation());
        self
    }

    /// Appends a `get` of `path`.
    pub fn get(&self, path: impl Into<String>) -> &Self {
        self.spec(LookupInSpec::get(path))
    }

    /// Appends an `exists` check of `path`.
    pub fn exists(&self, path: impl Into<String>) -> &Self {
        self.spec(LookupInSpec::exists(path))
    }

    /// Sets the options.
    pub fn options(mut self, options: LookupInOptions) -> Self {
        self.options = options;
        self
    }

    /// Document key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of specs queued.
    pub fn count(&self) -> usize {
        self.specs.len()
    }

    /// Sends the lookup.
    pub async fn execute(self) -> Result<LookupInResult> {
        self.collection
            .lookup_in_specs(&self.key, self.specs.into_specs(), self.options)
            .await
    }
}

impl PartialEq for LookupInBuilder {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.specs == other.specs
    }
}

/// Result of a multi-path lookup.
///
/// Path errors are raised when the content of the failing spec is requested.
pub struct LookupInResult {
    key: String,
    cas: u64,
    deleted: bool,
    specs: Vec<OperationSpec>,
    serializer: Arc<dyn Serializer>,
}

impl LookupInResult {
    pub(crate) fn new(
        key: String,
        cas: u64,
        deleted: bool,
        specs: Vec<OperationSpec>,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        Self {
            key,
            cas,
            deleted,
            specs,
            serializer,
        }
    }

    /// Document key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Document CAS.
    pub fn cas(&self) -> u64 {
        self.cas
    }

    /// Returns true if the document is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Number of specs answered.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if no spec was sent.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Status of spec `index`.
    pub fn status(&self, index: usize) -> Option<ResponseStatus> {
        self.specs.get(index).and_then(OperationSpec::status)
    }

    /// Decodes the content of spec `index`.
    ///
    /// An `exists` spec decodes as a boolean.
    pub fn content_as<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let spec = self.spec(index)?;
        if spec.opcode() == OpCode::SubExist {
            return serde_json::from_value(serde_json::Value::Bool(self.exists(index)?))
                .map_err(|e| DocstoreError::Serialization(e.to_string()));
        }
        if let Some(err) = spec.status().and_then(|s| s.to_path_error(index)) {
            return Err(err);
        }
        let bytes = spec.bytes().map(|b| &b[..]).unwrap_or(&[]);
        let value = self.serializer.deserialize(bytes)?;
        serde_json::from_value(value).map_err(|e| DocstoreError::Serialization(e.to_string()))
    }

    /// Returns whether the path of spec `index` exists.
    pub fn exists(&self, index: usize) -> Result<bool> {
        let spec = self.spec(index)?;
        match spec.status() {
            Some(status) if status.is_success() => Ok(true),
            Some(ResponseStatus::SubDoc(SubDocErrorKind::PathNotFound)) => Ok(false),
            Some(status) => match status.to_path_error(index) {
                Some(err) => Err(err),
                None => Ok(true),
            },
            None => Ok(false),
        }
    }

    /// Raw bytes of spec `index`.
    pub fn content_bytes(&self, index: usize) -> Result<&[u8]> {
        let spec = self.spec(index)?;
        if let Some(err) = spec.status().and_then(|s| s.to_path_error(index)) {
            return Err(err);
        }
        Ok(spec.bytes().map(|b| &b[..]).unwrap_or(&[]))
    }

    fn spec(&self, index: usize) -> Result<&OperationSpec> {
        self.specs.get(index).ok_or_else(|| {
            DocstoreError::Protocol(format!(
                "no spec at index {index}, lookup had {}",
                self.specs.len()
            ))
        })
    }
}

impl fmt::Debug for LookupInResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupInResult")
            .field("key", &self.key)
            .field("cas", &self.cas)
            .field("deleted", &self.deleted)
            .field("specs", &self.specs.len())
            .finish()
    }
}
