//! Whole-document and projected get results.
//!
//! A get either fetches the body directly, or runs a lookup whose entries are
//! stitched back into one JSON tree. Which of the two is used depends on how
//! many paths were asked for: the server answers at most
//! [`MAX_SUBDOC_SPECS`] paths per lookup, so larger projections fall back to a
//! whole-document lookup and are extracted on the client.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use docstore_core::protocol::{
    common_flags, OpCode, OperationSpec, PathFlags, ResponseStatus, FORMAT_JSON,
    MAX_SUBDOC_SPECS, VATTR_DOCUMENT_EXPIRY,
};
use docstore_core::{DocstoreError, Result, Serializer, SubDocErrorKind, Transcoder};

use super::options::GetOptions;
use super::projection::{extract_path, insert_path, parse_path, Segment};

/// How a get is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GetPlan {
    /// Plain whole-document fetch.
    Document,
    /// Multi-path lookup.
    Lookup {
        specs: Vec<OperationSpec>,
        /// The lookup ends with a full-body spec instead of one spec per path.
        whole_document: bool,
    },
}

/// Chooses how to serve `options`.
///
/// Projection paths are validated here, before anything is sent.
pub(crate) fn plan_get(options: &GetOptions) -> Result<GetPlan> {
    for path in options.projections() {
        parse_path(path)?;
    }

    let projections = options.projections();
    let with_expiry = options.expiry_requested();
    let spec_count = projections.len() + usize::from(with_expiry);
    if spec_count == 0 {
        return Ok(GetPlan::Document);
    }

    let mut specs = Vec::with_capacity(spec_count.min(MAX_SUBDOC_SPECS));
    if with_expiry {
        specs.push(OperationSpec::new(
            OpCode::SubGet,
            VATTR_DOCUMENT_EXPIRY,
            PathFlags::XATTR,
        ));
    }

    let whole_document = projections.is_empty() || spec_count > MAX_SUBDOC_SPECS;
    if whole_document {
        if !projections.is_empty() {
            tracing::debug!(
                paths = projections.len(),
                limit = MAX_SUBDOC_SPECS,
                "projection exceeds the per-lookup limit, fetching the whole document"
            );
        }
        specs.push(OperationSpec::new(OpCode::Get, "", PathFlags::NONE));
    } else {
        specs.extend(
            projections
                .iter()
                .map(|path| OperationSpec::new(OpCode::SubGet, path.as_str(), PathFlags::NONE)),
        );
    }
    Ok(GetPlan::Lookup {
        specs,
        whole_document,
    })
}

#[derive(Clone)]
enum Body {
    Document(Bytes),
    Projected {
        tree: Value,
        single: Option<Value>,
        failures: Vec<(usize, ResponseStatus)>,
    },
}

/// Result of [`Collection::get`](super::Collection::get).
#[derive(Clone)]
pub struct GetResult {
    key: String,
    cas: u64,
    flags: u32,
    body: Body,
    expiry: Option<u64>,
    transcoder: Arc<dyn Transcoder>,
}

impl GetResult {
    pub(crate) fn from_document(
        key: String,
        cas: u64,
        flags: u32,
        content: Bytes,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            key,
            cas,
            flags,
            body: Body::Document(content),
            expiry: None,
            transcoder,
        }
    }

    /// Rebuilds a result from the specs of a lookup planned by [`plan_get`].
    pub(crate) fn from_lookup(
        key: String,
        cas: u64,
        specs: Vec<OperationSpec>,
        options: &GetOptions,
        whole_document: bool,
        serializer: &dyn Serializer,
        transcoder: Arc<dyn Transcoder>,
    ) -> Result<Self> {
        let mut content_specs = specs.into_iter().enumerate();

        let mut expiry = None;
        if options.expiry_requested() {
            if let Some((index, spec)) = content_specs.next() {
                expiry = read_expiry(index, &spec)?;
            }
        }

        let flags = common_flags(FORMAT_JSON);
        let body = if whole_document {
            let (index, spec) = content_specs.next().ok_or_else(|| {
                DocstoreError::Protocol("lookup returned no document body".to_string())
            })?;
            if let Some(err) = spec.status().and_then(|s| s.to_path_error(index)) {
                return Err(err);
            }
            let content = spec.bytes().cloned().unwrap_or_default();
            if options.projections().is_empty() {
                Body::Document(content)
            } else {
                extract_projections(&content, options.projections(), serializer)?
            }
        } else {
            let mut tree = Value::Null;
            let mut single = None;
            let mut failures = Vec::new();
            let requested = options.projections().len();
            for (index, spec) in content_specs {
                match spec.status() {
                    Some(status) if status.is_success() => {}
                    Some(ResponseStatus::SubDoc(SubDocErrorKind::PathNotFound)) => {
                        tracing::debug!(path = spec.path(), "projected path not found");
                        continue;
                    }
                    Some(status) => {
                        failures.push((index, status));
                        continue;
                    }
                    None => continue,
                }
                let bytes = spec.bytes().map(|b| &b[..]).unwrap_or(&[]);
                let value = serializer.deserialize(bytes)?;
                let path = parse_path(spec.path())?;
                if requested == 1 {
                    single = Some(value.clone());
                }
                place(&mut tree, spec.path(), &path, value);
            }
            Body::Projected {
                tree: object_or_empty(tree),
                single,
                failures,
            }
        };

        Ok(Self {
            key,
            cas,
            flags,
            body,
            expiry,
            transcoder,
        })
    }

    /// Document key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Document CAS.
    pub fn cas(&self) -> u64 {
        self.cas
    }

    /// Format flags stored with the document.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Returns true if the result holds only the requested paths.
    pub fn is_projected(&self) -> bool {
        matches!(self.body, Body::Projected { .. })
    }

    /// Absolute expiry, if requested and the document has one.
    pub fn expiry_time(&self) -> Option<SystemTime> {
        self.expiry
            .map(|seconds| UNIX_EPOCH + Duration::from_secs(seconds))
    }

    /// Decodes the content into `T`.
    ///
    /// Whole documents go through the transcoder. Projections are returned
    /// as the reassembled tree; when a single path was projected and the
    /// tree does not fit `T`, the value of that path is decoded directly.
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.body {
            Body::Document(bytes) => {
                let value = self.transcoder.decode(bytes, self.flags)?;
                from_value(value)
            }
            Body::Projected {
                tree,
                single,
                failures,
            } => {
                if let Some((index, status)) = failures.first() {
                    if let Some(err) = status.to_path_error(*index) {
                        return Err(err);
                    }
                }
                match serde_json::from_value::<T>(tree.clone()) {
                    Ok(value) => Ok(value),
                    Err(e) => match single {
                        Some(value) => from_value(value.clone()),
                        None => Err(DocstoreError::Serialization(e.to_string())),
                    },
                }
            }
        }
    }

    /// Raw body of a whole-document result.
    pub fn content_bytes(&self) -> Result<&[u8]> {
        match &self.body {
            Body::Document(bytes) => Ok(bytes),
            Body::Projected { .. } => Err(DocstoreError::Unsupported(
                "projected results have no raw body, use content_as".to_string(),
            )),
        }
    }
}

impl fmt::Debug for GetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetResult")
            .field("key", &self.key)
            .field("cas", &self.cas)
            .field("flags", &format_args!("0x{:08x}", self.flags))
            .field("projected", &self.is_projected())
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Expiry is server metadata: it is always read as plain JSON, whatever
/// serializer the collection uses for content.
fn read_expiry(index: usize, spec: &OperationSpec) -> Result<Option<u64>> {
    if let Some(err) = spec.status().and_then(|s| s.to_path_error(index)) {
        return Err(err);
    }
    let bytes = spec.bytes().map(|b| &b[..]).unwrap_or(&[]);
    if bytes.is_empty() {
        return Ok(None);
    }
    let seconds: u64 = serde_json::from_slice(bytes)
        .map_err(|e| DocstoreError::Serialization(format!("invalid expiry: {e}")))?;
    Ok((seconds != 0).then_some(seconds))
}

fn extract_projections(
    content: &[u8],
    projections: &[String],
    serializer: &dyn Serializer,
) -> Result<Body> {
    let document = serializer.deserialize(content)?;
    let mut tree = Value::Null;
    for raw in projections {
        let path = parse_path(raw)?;
        match extract_path(&document, &path) {
            Some(value) => place(&mut tree, raw, &path, value.clone()),
            None => tracing::debug!(path = %raw, "projected path not found"),
        }
    }
    let single = match projections {
        [only] => parse_path(only)
            .ok()
            .and_then(|path| extract_path(&document, &path).cloned()),
        _ => None,
    };
    Ok(Body::Projected {
        tree: object_or_empty(tree),
        single,
        failures: Vec::new(),
    })
}

fn place(tree: &mut Value, raw: &str, path: &[Segment], value: Value) {
    if !insert_path(tree, path, value) {
        tracing::warn!(path = %raw, "projection overlaps an earlier path, skipping");
    }
}

fn object_or_empty(tree: Value) -> Value {
    match tree {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    }
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| DocstoreError::Serialization(e.to_string()))
}
