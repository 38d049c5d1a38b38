//! Multi-path mutations.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use docstore_core::protocol::{OpCode, OperationSpec, PathFlags, SpecQueue};
use docstore_core::{DocstoreError, JsonSerializer, Result, Serializer};

use super::collection::Collection;
use super::options::MutateInOptions;

/// One path-level mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutateInSpec {
    opcode: OpCode,
    path: String,
    value: Option<Bytes>,
    flags: PathFlags,
}

impl MutateInSpec {
    fn new(opcode: OpCode, path: impl Into<String>, value: Option<Bytes>) -> Self {
        Self {
            opcode,
            path: path.into(),
            value,
            flags: PathFlags::NONE,
        }
    }

    fn with_json<T: Serialize + ?Sized>(
        opcode: OpCode,
        path: impl Into<String>,
        value: &T,
    ) -> Result<Self> {
        let bytes = JsonSerializer::to_bytes(value)?;
        Ok(Self::new(opcode, path, Some(Bytes::from(bytes))))
    }

    /// Serializes `values` as a JSON array and drops the outer brackets, so
    /// the server inserts the elements rather than a nested array.
    fn with_json_elements<T: Serialize>(
        opcode: OpCode,
        path: impl Into<String>,
        values: &[T],
    ) -> Result<Self> {
        if values.is_empty() {
            return Err(DocstoreError::Serialization(
                "array operations need at least one value".to_string(),
            ));
        }
        let bytes = JsonSerializer::to_bytes(values)?;
        let inner = Bytes::from(bytes).slice(1..);
        let inner = inner.slice(..inner.len() - 1);
        Ok(Self::new(opcode, path, Some(inner)))
    }

    /// Adds `value` at `path`, failing if the path exists.
    pub fn insert<T: Serialize + ?Sized>(path: impl Into<String>, value: &T) -> Result<Self> {
        Self::with_json(OpCode::SubDictAdd, path, value)
    }

    /// Sets `value` at `path`, creating or replacing it.
    pub fn upsert<T: Serialize + ?Sized>(path: impl Into<String>, value: &T) -> Result<Self> {
        Self::with_json(OpCode::SubDictUpsert, path, value)
    }

    /// Replaces the value at `path`; an empty path replaces the whole body.
    pub fn replace<T: Serialize + ?Sized>(path: impl Into<String>, value: &T) -> Result<Self> {
        let path = path.into();
        let opcode = if path.is_empty() {
            OpCode::Set
        } else {
            OpCode::SubReplace
        };
        Self::with_json(opcode, path, value)
    }

    /// Removes `path`; an empty path removes the whole body.
    pub fn remove(path: impl Into<String>) -> Self {
        let path = path.into();
        let opcode = if path.is_empty() {
            OpCode::Delete
        } else {
            OpCode::SubDelete
        };
        Self::new(opcode, path, None)
    }

    /// Appends `values` to the array at `path`.
    pub fn array_append<T: Serialize>(path: impl Into<String>, values: &[T]) -> Result<Self> {
        Self::with_json_elements(OpCode::SubArrayPushLast, path, values)
    }

    /// Prepends `values` to the array at `path`.
    pub fn array_prepend<T: Serialize>(path: impl Into<String>, values: &[T]) -> Result<Self> {
        Self::with_json_elements(OpCode::SubArrayPushFirst, path, values)
    }

    /// Inserts `values` at the array position named by `path` (e.g. `tags[1]`).
    pub fn array_insert<T: Serialize>(path: impl Into<String>, values: &[T]) -> Result<Self> {
        Self::with_json_elements(OpCode::SubArrayInsert, path, values)
    }

    /// Appends `value` to the array at `path` unless it is already present.
    pub fn array_add_unique<T: Serialize + ?Sized>(
        path: impl Into<String>,
        value: &T,
    ) -> Result<Self> {
        Self::with_json(OpCode::SubArrayAddUnique, path, value)
    }

    /// Adds `delta` to the number at `path`.
    pub fn increment(path: impl Into<String>, delta: u64) -> Self {
        Self::new(OpCode::SubCounter, path, Some(Bytes::from(delta.to_string())))
    }

    /// Subtracts `delta` from the number at `path`.
    pub fn decrement(path: impl Into<String>, delta: u64) -> Self {
        Self::new(
            OpCode::SubCounter,
            path,
            Some(Bytes::from(format!("-{delta}"))),
        )
    }

    /// Replaces the document body with the content of the xattr at `path`.
    pub fn replace_body_with_xattr(path: impl Into<String>) -> Self {
        let mut spec = Self::new(OpCode::SubReplaceBodyWithXattr, path, None);
        spec.flags |= PathFlags::XATTR;
        spec
    }

    /// Creates missing intermediate paths.
    pub fn create_path(mut self) -> Self {
        self.flags |= PathFlags::CREATE_PATH;
        self
    }

    /// Targets the extended attributes section.
    pub fn xattr(mut self) -> Self {
        self.flags |= PathFlags::XATTR;
        self
    }

    /// Lets the server expand macros such as `${Mutation.CAS}` in the value.
    /// Implies [`xattr`](Self::xattr).
    pub fn expand_macros(mut self) -> Self {
        self.flags |= PathFlags::EXPAND_MACROS;
        self
    }

    pub(crate) fn into_operation(self) -> OperationSpec {
        match self.value {
            Some(value) => OperationSpec::with_value(self.opcode, self.path, value, self.flags),
            None => OperationSpec::new(self.opcode, self.path, self.flags),
        }
    }
}

/// Accumulates mutation specs for one document, then executes them as one request.
#[derive(Debug, Clone)]
pub struct MutateInBuilder {
    collection: Collection,
    key: String,
    specs: SpecQueue,
    options: MutateInOptions,
}

impl MutateInBuilder {
    pub(crate) fn new(collection: Collection, key: impl Into<String>) -> Self {
        Self {
            collection,
            key: key.into(),
            specs: SpecQueue::new(),
            options: MutateInOptions::default(),
        }
    }

    /// Appends a spec.
    pub fn spec(&self, spec: MutateInSpec) -> &Self {
        self.specs.push(spec.into_operation());
        self
    }

    /// Sets the options.
    pub fn options(mut self, options: MutateInOptions) -> Self {
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

    /// Sends the mutation.
    pub async fn execute(self) -> Result<MutateInResult> {
        self.collection
            .mutate_in_specs(&self.key, self.specs.into_specs(), self.options)
            .await
    }
}

impl PartialEq for MutateInBuilder {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.specs == other.specs
    }
}

/// Result of a multi-path mutation.
pub struct MutateInResult {
    cas: u64,
    specs: Vec<OperationSpec>,
    serializer: Arc<dyn Serializer>,
}

impl MutateInResult {
    pub(crate) fn new(cas: u64, specs: Vec<OperationSpec>, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            cas,
            specs,
            serializer,
        }
    }

    /// New document CAS.
    pub fn cas(&self) -> u64 {
        self.cas
    }

    /// Number of specs applied.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if no spec was sent.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Decodes the value returned by spec `index`, e.g. a counter's new value.
    pub fn content_as<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let spec = self.specs.get(index).ok_or_else(|| {
            DocstoreError::Protocol(format!("no spec at index {index}"))
        })?;
        if let Some(err) = spec.status().and_then(|s| s.to_path_error(index)) {
            return Err(err);
        }
        match spec.bytes() {
            Some(bytes) if !bytes.is_empty() => {
                let value = self.serializer.deserialize(bytes)?;
                serde_json::from_value(value).map_err(|e| DocstoreError::Serialization(e.to_string()))
            }
            _ => Err(DocstoreError::Serialization(format!(
                "spec {index} returned no value"
            ))),
        }
    }
}

impl fmt::Debug for MutateInResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutateInResult")
            .field("cas", &self.cas)
            .field("specs", &self.specs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::protocol::ResponseStatus;

    #[test]
    fn test_array_values_lose_outer_brackets() {
        let spec = MutateInSpec::array_append("tags", &["a", "b"]).unwrap();
        assert_eq!(spec.value.as_deref(), Some(&br#""a","b""#[..]));

        let single = MutateInSpec::array_prepend("nums", &[1]).unwrap();
        assert_eq!(single.value.as_deref(), Some(&b"1"[..]));

        assert!(MutateInSpec::array_insert::<u8>("nums[0]", &[]).is_err());
    }

    #[test]
    fn test_empty_path_targets_whole_body() {
        assert_eq!(MutateInSpec::remove("").opcode, OpCode::Delete);
        assert_eq!(MutateInSpec::remove("a").opcode, OpCode::SubDelete);
        assert_eq!(
            MutateInSpec::replace("", &serde_json::json!({"x": 1})).unwrap().opcode,
            OpCode::Set
        );
    }

    #[test]
    fn test_counters_encode_signed_delta() {
        assert_eq!(MutateInSpec::increment("n", 5).value.as_deref(), Some(&b"5"[..]));
        assert_eq!(MutateInSpec::decrement("n", 3).value.as_deref(), Some(&b"-3"[..]));
    }

    #[test]
    fn test_expand_macros_implies_xattr() {
        let op = MutateInSpec::upsert("meta.cas", "${Mutation.CAS}")
            .unwrap()
            .expand_macros()
            .into_operation();
        assert!(op.path_flags().contains(PathFlags::XATTR));
        assert!(op.path_flags().contains(PathFlags::EXPAND_MACROS));

        let op = MutateInSpec::replace_body_with_xattr("staged").into_operation();
        assert!(op.is_xattr());
    }

    #[test]
    fn test_result_content_for_counter() {
        let mut counter = MutateInSpec::increment("n", 1).into_operation();
        counter.set_result(ResponseStatus::Success, Bytes::from_static(b"11"));
        let mut plain = MutateInSpec::remove("x").into_operation();
        plain.set_result(ResponseStatus::Success, Bytes::new());

        let result = MutateInResult::new(77, vec![counter, plain], Arc::new(JsonSerializer));
        assert_eq!(result.content_as::<i64>(0).unwrap(), 11);
        assert!(result.content_as::<i64>(1).is_err());
        assert_eq!(result.cas(), 77);
    }
}
