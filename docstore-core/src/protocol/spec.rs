//! Path-level operation specs and the ordered queue that carries them.

use bytes::Bytes;
use parking_lot::Mutex;

use super::flags::{DocFlags, PathFlags};
use super::opcode::OpCode;
use super::status::ResponseStatus;

/// One path-level command inside a multi-path operation.
///
/// The result fields are written once by the decoder and only read afterwards.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    opcode: OpCode,
    path: String,
    value: Option<Bytes>,
    path_flags: PathFlags,
    doc_flags: DocFlags,
    status: Option<ResponseStatus>,
    bytes: Option<Bytes>,
}

impl OperationSpec {
    /// Creates a spec without a value. Flags are normalized.
    pub fn new(opcode: OpCode, path: impl Into<String>, path_flags: PathFlags) -> Self {
        Self {
            opcode,
            path: path.into(),
            value: None,
            path_flags: path_flags.normalized(),
            doc_flags: DocFlags::NONE,
            status: None,
            bytes: None,
        }
    }

    /// Creates a spec carrying an encoded value. Flags are normalized.
    pub fn with_value(
        opcode: OpCode,
        path: impl Into<String>,
        value: Bytes,
        path_flags: PathFlags,
    ) -> Self {
        let mut spec = Self::new(opcode, path, path_flags);
        spec.value = Some(value);
        spec
    }

    /// Adds document-level flags requested by this spec.
    ///
    /// Access to deleted documents goes through their attributes, so
    /// `ACCESS_DELETED` also marks the path as an xattr path.
    pub fn with_doc_flags(mut self, doc_flags: DocFlags) -> Self {
        if doc_flags.contains(DocFlags::ACCESS_DELETED) {
            self.path_flags |= PathFlags::XATTR;
        }
        self.doc_flags |= doc_flags;
        self
    }

    /// Returns the opcode.
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Returns the path. Empty for whole-document specs.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the encoded value, if any.
    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    /// Returns the path flags.
    pub fn path_flags(&self) -> PathFlags {
        self.path_flags
    }

    /// Returns the document flags this spec asked for.
    pub fn doc_flags(&self) -> DocFlags {
        self.doc_flags
    }

    /// Returns true if the path addresses the attributes section.
    pub fn is_xattr(&self) -> bool {
        self.path_flags.contains(PathFlags::XATTR)
    }

    /// Returns true if the path is a server-computed virtual attribute.
    pub fn is_virtual_xattr(&self) -> bool {
        self.is_xattr() && self.path.starts_with('$')
    }

    /// Returns the response status, once decoded.
    pub fn status(&self) -> Option<ResponseStatus> {
        self.status
    }

    /// Returns the response body, once decoded.
    pub fn bytes(&self) -> Option<&Bytes> {
        self.bytes.as_ref()
    }

    /// Records the decoded response for this spec.
    pub fn set_result(&mut self, status: ResponseStatus, bytes: Bytes) {
        self.status = Some(status);
        self.bytes = Some(bytes);
    }

    /// Returns a copy of the request part with empty result fields.
    pub fn fresh_copy(&self) -> Self {
        Self {
            opcode: self.opcode,
            path: self.path.clone(),
            value: self.value.clone(),
            path_flags: self.path_flags,
            doc_flags: self.doc_flags,
            status: None,
            bytes: None,
        }
    }
}

impl PartialEq for OperationSpec {
    fn eq(&self, other: &Self) -> bool {
        self.opcode == other.opcode
            && self.path == other.path
            && self.path_flags == other.path_flags
            && self.doc_flags == other.doc_flags
            && self.value == other.value
    }
}

impl Eq for OperationSpec {}

/// Insertion-ordered queue of specs for one document.
///
/// Safe to append to from several threads, but response correlation follows
/// the order in which appends complete.
#[derive(Debug, Default)]
pub struct SpecQueue {
    specs: Mutex<Vec<OperationSpec>>,
}

impl SpecQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a spec.
    pub fn push(&self, spec: OperationSpec) {
        self.specs.lock().push(spec);
    }

    /// Number of queued specs.
    pub fn len(&self) -> usize {
        self.specs.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.specs.lock().is_empty()
    }

    /// Document flags requested by any queued spec.
    pub fn doc_flags(&self) -> DocFlags {
        self.specs
            .lock()
            .iter()
            .fold(DocFlags::NONE, |acc, spec| acc | spec.doc_flags())
    }

    /// Returns a copy of the queued specs in send order.
    pub fn snapshot(&self) -> Vec<OperationSpec> {
        self.specs.lock().clone()
    }

    /// Consumes the queue, yielding the specs in send order.
    pub fn into_specs(self) -> Vec<OperationSpec> {
        self.specs.into_inner()
    }
}

impl Clone for SpecQueue {
    fn clone(&self) -> Self {
        let specs = self.specs.lock().iter().map(OperationSpec::fresh_copy).collect();
        Self {
            specs: Mutex::new(specs),
        }
    }
}

impl PartialEq for SpecQueue {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.snapshot() == other.snapshot()
    }
}

impl Eq for SpecQueue {}

impl From<Vec<OperationSpec>> for SpecQueue {
    fn from(specs: Vec<OperationSpec>) -> Self {
        Self {
            specs: Mutex::new(specs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_normalizes_expand_macros() {
        let spec = OperationSpec::with_value(
            OpCode::SubDictUpsert,
            "meta.cas",
            Bytes::from_static(b"\"${Mutation.CAS}\""),
            PathFlags::EXPAND_MACROS,
        );
        assert!(spec.is_xattr());
    }

    #[test]
    fn test_access_deleted_implies_xattr() {
        let spec = OperationSpec::new(OpCode::SubGet, "txn", PathFlags::NONE)
            .with_doc_flags(DocFlags::ACCESS_DELETED);
        assert!(spec.is_xattr());
        assert!(spec.doc_flags().contains(DocFlags::ACCESS_DELETED));
    }

    #[test]
    fn test_virtual_xattr_detection() {
        let vattr = OperationSpec::new(OpCode::SubGet, "$document.exptime", PathFlags::XATTR);
        let body = OperationSpec::new(OpCode::SubGet, "$document", PathFlags::NONE);
        assert!(vattr.is_virtual_xattr());
        assert!(!body.is_virtual_xattr());
    }

    #[test]
    fn test_equality_ignores_results() {
        let mut a = OperationSpec::new(OpCode::SubGet, "a.b", PathFlags::NONE);
        let b = OperationSpec::new(OpCode::SubGet, "a.b", PathFlags::NONE);
        a.set_result(ResponseStatus::Success, Bytes::from_static(b"1"));
        assert_eq!(a, b);
        assert_ne!(a, OperationSpec::new(OpCode::SubExist, "a.b", PathFlags::NONE));
    }

    #[test]
    fn test_queue_preserves_insertion_order() {
        let queue = SpecQueue::new();
        queue.push(OperationSpec::new(OpCode::SubGet, "a.b", PathFlags::NONE));
        queue.push(OperationSpec::new(OpCode::SubExist, "c", PathFlags::NONE));

        let specs = queue.snapshot();
        assert_eq!(queue.len(), 2);
        assert_eq!(specs[0].path(), "a.b");
        assert_eq!(specs[1].path(), "c");
    }

    #[test]
    fn test_clone_is_independent_with_fresh_results() {
        let mut first = OperationSpec::new(OpCode::SubGet, "a", PathFlags::NONE);
        first.set_result(ResponseStatus::Success, Bytes::from_static(b"42"));
        let queue = SpecQueue::from(vec![first]);

        let copy = queue.clone();
        assert_eq!(copy, queue);
        assert!(copy.snapshot()[0].status().is_none());

        copy.push(OperationSpec::new(OpCode::SubExist, "b", PathFlags::NONE));
        assert_eq!(copy.len(), 2);
        assert_eq!(queue.len(), 1);
        assert_ne!(copy, queue);
    }

    #[test]
    fn test_queue_doc_flags_union() {
        let queue = SpecQueue::new();
        queue.push(OperationSpec::new(OpCode::SubGet, "a", PathFlags::XATTR));
        queue.push(
            OperationSpec::new(OpCode::SubGet, "b", PathFlags::NONE)
                .with_doc_flags(DocFlags::ACCESS_DELETED),
        );
        assert_eq!(queue.doc_flags(), DocFlags::ACCESS_DELETED);
    }

    #[test]
    fn test_concurrent_pushes_are_not_lost() {
        let queue = std::sync::Arc::new(SpecQueue::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for j in 0..16 {
                        queue.push(OperationSpec::new(
                            OpCode::SubGet,
                            format!("p{i}_{j}"),
                            PathFlags::NONE,
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 128);
    }
}
