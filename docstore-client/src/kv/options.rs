//! Per-operation options.

use std::time::Duration;

use docstore_core::protocol::{DocFlags, DurabilityLevel, DurabilityRequirement, StoreSemantics};

/// Options for [`Collection::get`](super::Collection::get).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    projections: Vec<String>,
    with_expiry: bool,
    timeout: Option<Duration>,
}

impl GetOptions {
    /// Default options: a plain whole-document fetch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches only `paths`, reassembled into one document.
    pub fn project<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projections.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Also fetches the document expiry.
    pub fn with_expiry(mut self, with_expiry: bool) -> Self {
        self.with_expiry = with_expiry;
        self
    }

    /// Overrides the key-value timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Requested projection paths.
    pub fn projections(&self) -> &[String] {
        &self.projections
    }

    /// Whether the expiry is requested.
    pub fn expiry_requested(&self) -> bool {
        self.with_expiry
    }

    pub(crate) fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Options for lookup-in operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupInOptions {
    access_deleted: bool,
    timeout: Option<Duration>,
}

impl LookupInOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows reading tombstones.
    pub fn access_deleted(mut self, access_deleted: bool) -> Self {
        self.access_deleted = access_deleted;
        self
    }

    /// Overrides the key-value timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn doc_flags(&self) -> DocFlags {
        if self.access_deleted {
            DocFlags::ACCESS_DELETED
        } else {
            DocFlags::NONE
        }
    }

    pub(crate) fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Options for mutate-in operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutateInOptions {
    store_semantics: StoreSemantics,
    create_as_deleted: bool,
    cas: u64,
    expiry: Option<Duration>,
    durability: DurabilityRequirement,
    timeout: Option<Duration>,
}

impl MutateInOptions {
    /// Default options: replace an existing document.
    pub fn new() -> Self {
        Self::default()
    }

    /// How the document itself is treated if it does or does not exist.
    pub fn store_semantics(mut self, semantics: StoreSemantics) -> Self {
        self.store_semantics = semantics;
        self
    }

    /// Creates the document as a tombstone.
    pub fn create_as_deleted(mut self, create_as_deleted: bool) -> Self {
        self.create_as_deleted = create_as_deleted;
        self
    }

    /// Applies the mutation only if the document's CAS matches.
    pub fn cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    /// Sets the document expiry.
    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Requires the given durability level.
    pub fn durability(mut self, level: DurabilityLevel) -> Self {
        self.durability = DurabilityRequirement::new(level);
        self
    }

    /// Requires the given durability level within `timeout`.
    pub fn durability_with_timeout(mut self, level: DurabilityLevel, timeout: Duration) -> Self {
        self.durability = DurabilityRequirement::new(level).with_timeout(timeout);
        self
    }

    /// Overrides the key-value timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn doc_flags(&self) -> DocFlags {
        let mut flags = self.store_semantics.doc_flags();
        if self.create_as_deleted {
            flags |= DocFlags::CREATE_AS_DELETED;
        }
        flags
    }

    pub(crate) fn cas_value(&self) -> u64 {
        self.cas
    }

    pub(crate) fn expiry_value(&self) -> Option<Duration> {
        self.expiry
    }

    pub(crate) fn durability_requirement(&self) -> DurabilityRequirement {
        self.durability
    }

    pub(crate) fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutate_in_doc_flags() {
        assert_eq!(MutateInOptions::new().doc_flags(), DocFlags::NONE);
        let options = MutateInOptions::new()
            .store_semantics(StoreSemantics::Upsert)
            .create_as_deleted(true);
        assert_eq!(options.doc_flags().bits(), 0x09);
        assert_eq!(
            MutateInOptions::new()
                .store_semantics(StoreSemantics::Insert)
                .doc_flags(),
            DocFlags::INSERT
        );
    }

    #[test]
    fn test_get_options_collect_projections() {
        let options = GetOptions::new().project(["a", "b.c"]).with_expiry(true);
        assert_eq!(options.projections(), &["a".to_string(), "b.c".to_string()]);
        assert!(options.expiry_requested());
    }

    #[test]
    fn test_lookup_access_deleted_flag() {
        assert_eq!(
            LookupInOptions::new().access_deleted(true).doc_flags(),
            DocFlags::ACCESS_DELETED
        );
    }
}
