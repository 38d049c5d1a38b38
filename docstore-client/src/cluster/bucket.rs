//! Bucket handles and their lifecycle.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::topology::{Topology, TopologyDocument};

use super::config_source::{ConfigObserver, RefCountable};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How a bucket places keys on servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketKind {
    /// Fixed partition table.
    Partitioned,
    /// Consistent-hash ring.
    ConsistentHash,
}

impl BucketKind {
    /// Classifies a topology document.
    pub fn of(document: &TopologyDocument) -> Self {
        if document.is_partitioned() {
            BucketKind::Partitioned
        } else {
            BucketKind::ConsistentHash
        }
    }
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKind::Partitioned => write!(f, "PARTITIONED"),
            BucketKind::ConsistentHash => write!(f, "CONSISTENT_HASH"),
        }
    }
}

/// Lifecycle state of a bucket handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BucketState {
    /// Created, no topology requested yet.
    Unbootstrapped = 0,
    /// Topology is being fetched.
    Bootstrapping = 1,
    /// Topology installed, ready for operations.
    Active = 2,
    /// Torn down; never reused.
    Destroyed = 3,
}

impl BucketState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BucketState::Unbootstrapped,
            1 => BucketState::Bootstrapping,
            2 => BucketState::Active,
            _ => BucketState::Destroyed,
        }
    }
}

/// Fired whenever a handle installs a new topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyEvent {
    /// Bucket name.
    pub bucket: String,
    /// Installed revision.
    pub revision: u64,
}

/// A logical bucket shared by every caller that opened it.
///
/// Handles are created and destroyed by the
/// [`TopologyController`](super::TopologyController). The current topology
/// is swapped atomically, so operations read it without locking.
#[derive(Debug)]
pub struct BucketHandle {
    id: Uuid,
    name: String,
    kind: BucketKind,
    state: AtomicU8,
    refs: AtomicI64,
    topology: ArcSwapOption<Topology>,
    events: broadcast::Sender<TopologyEvent>,
}

impl BucketHandle {
    /// Creates an unbootstrapped handle holding one reference.
    pub fn new(name: impl Into<String>, kind: BucketKind) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            state: AtomicU8::new(BucketState::Unbootstrapped as u8),
            refs: AtomicI64::new(1),
            topology: ArcSwapOption::empty(),
            events,
        }
    }

    /// Unique id of this handle instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key placement scheme.
    pub fn kind(&self) -> BucketKind {
        self.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BucketState {
        BucketState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns true if the handle is active and not disposed.
    pub fn is_active(&self) -> bool {
        self.state() == BucketState::Active && self.ref_count() >= 0
    }

    /// Current reference count, `-1` once disposed.
    pub fn ref_count(&self) -> i64 {
        self.refs.load(Ordering::Acquire)
    }

    /// Currently installed topology.
    pub fn topology(&self) -> Option<Arc<Topology>> {
        self.topology.load_full()
    }

    /// Revision of the installed topology, zero if none.
    pub fn revision(&self) -> u64 {
        match &*self.topology.load() {
            Some(topology) => topology.revision(),
            None => 0,
        }
    }

    /// Subscribes to topology installs.
    pub fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        self.events.subscribe()
    }

    pub(crate) fn mark_bootstrapping(&self) {
        let _ = self.state.compare_exchange(
            BucketState::Unbootstrapped as u8,
            BucketState::Bootstrapping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn mark_active(&self) {
        let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
            (s != BucketState::Destroyed as u8).then_some(BucketState::Active as u8)
        });
    }

    /// Installs `topology` only if it is newer than the held snapshot.
    ///
    /// Returns true if it was installed.
    pub(crate) fn install_if_newer(&self, topology: Arc<Topology>) -> bool {
        if self.state() == BucketState::Destroyed {
            return false;
        }
        let revision = topology.revision();
        let previous = self.topology.rcu(|current| match current {
            Some(held) if held.revision() >= revision => Some(held.clone()),
            _ => Some(topology.clone()),
        });
        let installed = previous.map_or(true, |held| held.revision() < revision);
        if installed {
            self.publish(revision);
        }
        installed
    }

    fn publish(&self, revision: u64) {
        tracing::debug!(bucket = %self.name, handle = %self.id, revision, "bucket topology updated");
        // No subscribers is fine.
        let _ = self.events.send(TopologyEvent {
            bucket: self.name.clone(),
            revision,
        });
    }

    /// Moves the handle to `Destroyed` and drops its topology.
    ///
    /// Returns false if it was already destroyed.
    pub(crate) fn destroy(&self) -> bool {
        let previous = self
            .state
            .swap(BucketState::Destroyed as u8, Ordering::AcqRel);
        self.refs.store(-1, Ordering::Release);
        self.topology.store(None);
        previous != BucketState::Destroyed as u8
    }
}

impl ConfigObserver for BucketHandle {
    fn bucket_name(&self) -> &str {
        &self.name
    }

    fn on_topology_changed(&self, topology: Arc<Topology>) {
        if self.state() == BucketState::Destroyed {
            return;
        }
        let revision = topology.revision();
        self.topology.store(Some(topology));
        self.publish(revision);
    }
}

impl RefCountable for BucketHandle {
    fn add_ref(&self) -> i64 {
        match self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n > 0).then_some(n + 1))
        {
            Ok(previous) => previous + 1,
            Err(_) => -1,
        }
    }

    fn release(&self) -> i64 {
        match self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n > 0).then_some(n - 1))
        {
            Ok(previous) => previous - 1,
            Err(current) => current.min(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(rev: u64) -> Arc<Topology> {
        let json = format!(
            r#"{{"rev": {rev}, "name": "default",
                "vBucketServerMap": {{"serverList": ["a:11210"], "vBucketMap": [[0]]}}}}"#
        );
        let doc = TopologyDocument::from_json(json.as_bytes(), None).unwrap();
        Arc::new(Topology::from_document(doc).unwrap())
    }

    #[test]
    fn test_lifecycle_transitions() {
        let handle = BucketHandle::new("default", BucketKind::Partitioned);
        assert_eq!(handle.state(), BucketState::Unbootstrapped);
        handle.mark_bootstrapping();
        assert_eq!(handle.state(), BucketState::Bootstrapping);
        handle.mark_active();
        assert!(handle.is_active());

        assert!(handle.destroy());
        assert!(!handle.destroy());
        assert_eq!(handle.state(), BucketState::Destroyed);
        handle.mark_active();
        assert_eq!(handle.state(), BucketState::Destroyed);
    }

    #[test]
    fn test_ref_counting() {
        let handle = BucketHandle::new("default", BucketKind::Partitioned);
        assert_eq!(handle.ref_count(), 1);
        assert_eq!(handle.add_ref(), 2);
        assert_eq!(handle.release(), 1);
        assert_eq!(handle.release(), 0);
        assert_eq!(handle.release(), 0);

        handle.destroy();
        assert_eq!(handle.add_ref(), -1);
        assert_eq!(handle.release(), -1);
    }

    #[test]
    fn test_released_handle_cannot_be_revived() {
        let handle = BucketHandle::new("default", BucketKind::Partitioned);
        assert_eq!(handle.release(), 0);
        assert_eq!(handle.add_ref(), -1);
        assert_eq!(handle.ref_count(), 0);
    }

    #[tokio::test]
    async fn test_install_if_newer_keeps_newest_revision() {
        let handle = BucketHandle::new("default", BucketKind::Partitioned);
        let mut events = handle.subscribe();

        assert!(handle.install_if_newer(topology(5)));
        assert!(!handle.install_if_newer(topology(1)));
        assert!(!handle.install_if_newer(topology(5)));
        assert_eq!(handle.revision(), 5);

        assert_eq!(events.recv().await.unwrap().revision, 5);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_topology_change_publishes_event() {
        let handle = BucketHandle::new("default", BucketKind::Partitioned);
        let mut events = handle.subscribe();

        handle.on_topology_changed(topology(42));
        assert_eq!(handle.revision(), 42);
        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            TopologyEvent {
                bucket: "default".to_string(),
                revision: 42
            }
        );
    }

    #[test]
    fn test_destroyed_handle_ignores_updates() {
        let handle = BucketHandle::new("default", BucketKind::Partitioned);
        handle.destroy();
        handle.on_topology_changed(topology(3));
        assert!(handle.topology().is_none());
        assert_eq!(handle.revision(), 0);
    }

    #[test]
    fn test_kind_classification() {
        let json = r#"{"rev": 1, "name": "c", "nodeLocator": "ketama"}"#;
        let doc = TopologyDocument::from_json(json.as_bytes(), None).unwrap();
        assert_eq!(BucketKind::of(&doc), BucketKind::ConsistentHash);
        assert_eq!(BucketKind::of(topology(1).document()), BucketKind::Partitioned);
    }
}
