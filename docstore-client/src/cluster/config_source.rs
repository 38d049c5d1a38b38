//! Config source contract, collaborator traits and the source registry.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use docstore_core::{DocstoreError, Result};

use crate::config::Credentials;
use crate::topology::{Topology, TopologyDocument};

use super::protocol_source::ProtocolConfigSource;
use super::streaming_source::HttpStreamingConfigSource;

/// The closed set of config source implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigSourceKind {
    /// Configs fetched from and pushed by the key-value servers.
    Protocol,
    /// Configs streamed over the management HTTP endpoint.
    HttpStreaming,
}

impl ConfigSourceKind {
    /// Bootstrap order used when none is configured.
    pub const DEFAULT_ORDER: [ConfigSourceKind; 2] =
        [ConfigSourceKind::Protocol, ConfigSourceKind::HttpStreaming];

    /// Short name used in logs and aggregated errors.
    pub fn name(self) -> &'static str {
        match self {
            ConfigSourceKind::Protocol => "protocol",
            ConfigSourceKind::HttpStreaming => "http-streaming",
        }
    }
}

impl fmt::Display for ConfigSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConfigSourceKind {
    type Err = DocstoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "protocol" => Ok(ConfigSourceKind::Protocol),
            "http-streaming" | "http_streaming" => Ok(ConfigSourceKind::HttpStreaming),
            other => Err(DocstoreError::Configuration(format!(
                "unknown config source: {other}"
            ))),
        }
    }
}

/// Receives topology snapshots installed by a config source.
pub trait ConfigObserver: Send + Sync + fmt::Debug {
    /// Bucket the observer follows.
    fn bucket_name(&self) -> &str;

    /// Called with every snapshot the source installs for the bucket.
    fn on_topology_changed(&self, topology: Arc<Topology>);
}

/// Reference counting for shared handles.
pub trait RefCountable {
    /// Adds a reference and returns the new count, or `-1` if no references
    /// remain or the handle is disposed.
    fn add_ref(&self) -> i64;

    /// Drops a reference and returns the remaining count, or `-1` if already disposed.
    fn release(&self) -> i64;
}

/// A channel that produces topology documents for buckets.
#[async_trait]
pub trait ConfigSource: Send + Sync + fmt::Debug {
    /// Which implementation this is.
    fn kind(&self) -> ConfigSourceKind;

    /// Fetches the current topology of `bucket` and installs it in the source.
    async fn get_topology(
        &self,
        bucket: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<Topology>>;

    /// Snapshot currently held for `bucket`, without fetching.
    fn current_topology(&self, bucket: &str) -> Option<Arc<Topology>>;

    /// Registers the observer for `bucket`. Returns `false` if one is already registered.
    async fn register_observer(&self, bucket: &str, observer: Arc<dyn ConfigObserver>) -> bool;

    /// Removes the observer for `bucket`. Removing a missing observer is a no-op.
    async fn unregister_observer(&self, bucket: &str);

    /// Returns true if an observer is registered for `bucket`.
    async fn observer_exists(&self, bucket: &str) -> bool;

    /// Merges a document published out of band.
    ///
    /// Returns `true` if the document was installed.
    async fn update_config(&self, document: TopologyDocument, force: bool) -> Result<bool> {
        let _ = (document, force);
        Err(DocstoreError::Unsupported(format!(
            "{} source does not accept published configs",
            self.kind()
        )))
    }

    /// Stops background work and drops every observer.
    async fn shutdown(&self);
}

/// Fetches topology documents on demand.
#[async_trait]
pub trait ConfigFetcher: Send + Sync + fmt::Debug {
    /// Fetches the current document for `bucket`.
    async fn fetch(
        &self,
        bucket: &str,
        credentials: Option<&Credentials>,
    ) -> Result<TopologyDocument>;
}

/// Fetches topology documents and opens long-lived config streams.
#[async_trait]
pub trait ConfigStreamer: Send + Sync + fmt::Debug {
    /// Fetches the current document for `bucket`.
    async fn fetch(
        &self,
        bucket: &str,
        credentials: Option<&Credentials>,
    ) -> Result<TopologyDocument>;

    /// Opens a stream of documents for `bucket`; the stream ends when the sender is dropped.
    async fn stream(
        &self,
        bucket: &str,
        credentials: Option<&Credentials>,
    ) -> Result<mpsc::Receiver<TopologyDocument>>;
}

/// External collaborators the config sources are built from.
#[derive(Debug, Clone)]
pub struct ConfigCollaborators {
    /// Backs the protocol source.
    pub fetcher: Option<Arc<dyn ConfigFetcher>>,
    /// Backs the HTTP streaming source.
    pub streamer: Option<Arc<dyn ConfigStreamer>>,
    /// Delay before a closed stream is reopened.
    pub stream_reconnect_delay: Duration,
}

impl ConfigCollaborators {
    /// Collaborators with only a fetcher.
    pub fn with_fetcher(fetcher: Arc<dyn ConfigFetcher>) -> Self {
        Self {
            fetcher: Some(fetcher),
            streamer: None,
            stream_reconnect_delay: Duration::from_secs(1),
        }
    }

    /// Adds a streamer.
    pub fn streamer(mut self, streamer: Arc<dyn ConfigStreamer>) -> Self {
        self.streamer = Some(streamer);
        self
    }
}

/// Builds the config sources for `kinds`, in order.
pub fn build_config_sources(
    kinds: &[ConfigSourceKind],
    collaborators: &ConfigCollaborators,
) -> Result<Vec<Arc<dyn ConfigSource>>> {
    kinds
        .iter()
        .map(|kind| -> Result<Arc<dyn ConfigSource>> {
            match kind {
                ConfigSourceKind::Protocol => {
                    let fetcher = collaborators.fetcher.clone().ok_or_else(|| {
                        DocstoreError::Configuration(
                            "protocol config source requires a config fetcher".to_string(),
                        )
                    })?;
                    Ok(Arc::new(ProtocolConfigSource::new(fetcher)))
                }
                ConfigSourceKind::HttpStreaming => {
                    let streamer = collaborators.streamer.clone().ok_or_else(|| {
                        DocstoreError::Configuration(
                            "http-streaming config source requires a config streamer".to_string(),
                        )
                    })?;
                    Ok(Arc::new(HttpStreamingConfigSource::new(
                        streamer,
                        collaborators.stream_reconnect_delay,
                    )))
                }
            }
        })
        .collect()
}

/// Per-source table of installed topologies and observers.
///
/// Merges are serialized by an async mutex; readers load the table without
/// locking.
#[derive(Debug)]
pub(crate) struct TopologyTable {
    source: ConfigSourceKind,
    topologies: ArcSwap<HashMap<String, Arc<Topology>>>,
    observers: parking_lot::Mutex<HashMap<String, Arc<dyn ConfigObserver>>>,
    merge_lock: tokio::sync::Mutex<()>,
}

impl TopologyTable {
    pub(crate) fn new(source: ConfigSourceKind) -> Self {
        Self {
            source,
            topologies: ArcSwap::from_pointee(HashMap::new()),
            observers: parking_lot::Mutex::new(HashMap::new()),
            merge_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn current(&self, bucket: &str) -> Option<Arc<Topology>> {
        self.topologies.load().get(bucket).cloned()
    }

    /// Installs `document` if it is newer than the held revision or `force` is set.
    ///
    /// Returns the installed snapshot, or `None` when the document was stale.
    pub(crate) async fn merge(
        &self,
        document: TopologyDocument,
        force: bool,
    ) -> Result<Option<Arc<Topology>>> {
        let _guard = self.merge_lock.lock().await;

        let bucket = document.name.clone();
        let revision = document.revision();
        if let Some(current) = self.current(&bucket) {
            if !force && revision <= current.revision() {
                tracing::debug!(
                    source = %self.source,
                    bucket = %bucket,
                    revision,
                    current = current.revision(),
                    "skipping stale topology"
                );
                return Ok(None);
            }
        }

        let topology = Arc::new(Topology::from_document(document)?);
        let mut next = (**self.topologies.load()).clone();
        next.insert(bucket.clone(), topology.clone());
        self.topologies.store(Arc::new(next));

        tracing::info!(source = %self.source, bucket = %bucket, revision, force, "installed topology");

        let observer = self.observers.lock().get(&bucket).cloned();
        if let Some(observer) = observer {
            observer.on_topology_changed(topology.clone());
        }
        Ok(Some(topology))
    }

    /// Installs `document` and returns whichever snapshot is current afterwards.
    pub(crate) async fn merge_or_current(
        &self,
        document: TopologyDocument,
    ) -> Result<Arc<Topology>> {
        let bucket = document.name.clone();
        match self.merge(document, false).await? {
            Some(topology) => Ok(topology),
            None => self.current(&bucket).ok_or_else(|| {
                DocstoreError::Configuration(format!("no topology installed for {bucket}"))
            }),
        }
    }

    pub(crate) fn register(&self, bucket: &str, observer: Arc<dyn ConfigObserver>) -> bool {
        let mut observers = self.observers.lock();
        if observers.contains_key(bucket) {
            return false;
        }
        observers.insert(bucket.to_string(), observer);
        true
    }

    pub(crate) fn unregister(&self, bucket: &str) -> bool {
        self.observers.lock().remove(bucket).is_some()
    }

    pub(crate) fn observer_exists(&self, bucket: &str) -> bool {
        self.observers.lock().contains_key(bucket)
    }

    pub(crate) fn clear(&self) {
        self.observers.lock().clear();
        self.topologies.store(Arc::new(HashMap::new()));
    }
}

/// Rejects documents that describe a different bucket than the one requested.
pub(crate) fn check_bucket(requested: &str, document: &TopologyDocument) -> Result<()> {
    if document.name != requested {
        return Err(DocstoreError::Configuration(format!(
            "requested topology for {requested} but received {}",
            document.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        revisions: parking_lot::Mutex<Vec<u64>>,
    }

    impl ConfigObserver for Recorder {
        fn bucket_name(&self) -> &str {
            "default"
        }

        fn on_topology_changed(&self, topology: Arc<Topology>) {
            self.revisions.lock().push(topology.revision());
        }
    }

    fn doc(rev: u64) -> TopologyDocument {
        let json = format!(
            r#"{{"rev": {rev}, "name": "default",
                "vBucketServerMap": {{"serverList": ["a:1"], "vBucketMap": [[0]]}}}}"#
        );
        TopologyDocument::from_json(json.as_bytes(), None).unwrap()
    }

    #[test]
    fn test_kind_names_and_parsing() {
        assert_eq!(ConfigSourceKind::Protocol.to_string(), "protocol");
        assert_eq!(ConfigSourceKind::HttpStreaming.to_string(), "http-streaming");
        assert_eq!(
            "HTTP_STREAMING".parse::<ConfigSourceKind>().unwrap(),
            ConfigSourceKind::HttpStreaming
        );
        assert!("carrier-pigeon".parse::<ConfigSourceKind>().is_err());
        assert_eq!(ConfigSourceKind::DEFAULT_ORDER[0], ConfigSourceKind::Protocol);
    }

    #[test]
    fn test_build_requires_collaborators() {
        let collaborators = ConfigCollaborators {
            fetcher: None,
            streamer: None,
            stream_reconnect_delay: Duration::from_secs(1),
        };
        let err = build_config_sources(&[ConfigSourceKind::Protocol], &collaborators).unwrap_err();
        assert!(matches!(err, DocstoreError::Configuration(_)));
        assert!(build_config_sources(&[], &collaborators).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_installs_newer_and_skips_stale() {
        let table = TopologyTable::new(ConfigSourceKind::Protocol);
        let recorder = Arc::new(Recorder::default());
        assert!(table.register("default", recorder.clone()));

        assert!(table.merge(doc(5), false).await.unwrap().is_some());
        assert!(table.merge(doc(4), false).await.unwrap().is_none());
        assert!(table.merge(doc(5), false).await.unwrap().is_none());
        assert!(table.merge(doc(6), false).await.unwrap().is_some());

        assert_eq!(table.current("default").unwrap().revision(), 6);
        assert_eq!(*recorder.revisions.lock(), vec![5, 6]);
    }

    #[tokio::test]
    async fn test_forced_merge_ignores_revision() {
        let table = TopologyTable::new(ConfigSourceKind::Protocol);
        table.merge(doc(10), false).await.unwrap();
        assert!(table.merge(doc(3), true).await.unwrap().is_some());
        assert_eq!(table.current("default").unwrap().revision(), 3);
    }

    #[tokio::test]
    async fn test_merge_or_current_returns_held_snapshot_for_stale_doc() {
        let table = TopologyTable::new(ConfigSourceKind::Protocol);
        table.merge(doc(8), false).await.unwrap();
        let topology = table.merge_or_current(doc(2)).await.unwrap();
        assert_eq!(topology.revision(), 8);
    }

    #[test]
    fn test_register_is_exclusive_and_unregister_idempotent() {
        let table = TopologyTable::new(ConfigSourceKind::Protocol);
        assert!(table.register("default", Arc::new(Recorder::default())));
        assert!(!table.register("default", Arc::new(Recorder::default())));
        assert!(table.observer_exists("default"));
        assert!(table.unregister("default"));
        assert!(!table.unregister("default"));
        assert!(!table.observer_exists("default"));
    }

    #[test]
    fn test_check_bucket() {
        assert!(check_bucket("default", &doc(1)).is_ok());
        assert!(check_bucket("other", &doc(1)).is_err());
    }
}
