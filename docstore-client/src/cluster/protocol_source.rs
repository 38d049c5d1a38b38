//! Config source backed by the key-value servers themselves.

use std::sync::Arc;

use async_trait::async_trait;

use docstore_core::Result;

use crate::config::Credentials;
use crate::topology::{Topology, TopologyDocument};

use super::config_source::{
    check_bucket, ConfigFetcher, ConfigObserver, ConfigSource, ConfigSourceKind, TopologyTable,
};

/// Fetches configs from servers and accepts configs they push back.
///
/// Servers attach their current topology to "not my partition" replies;
/// those documents arrive through [`ConfigSource::update_config`].
#[derive(Debug)]
pub struct ProtocolConfigSource {
    fetcher: Arc<dyn ConfigFetcher>,
    table: TopologyTable,
}

impl ProtocolConfigSource {
    /// Creates a source that fetches through `fetcher`.
    pub fn new(fetcher: Arc<dyn ConfigFetcher>) -> Self {
        Self {
            fetcher,
            table: TopologyTable::new(ConfigSourceKind::Protocol),
        }
    }

    /// Currently installed snapshot for `bucket`.
    pub fn current(&self, bucket: &str) -> Option<Arc<Topology>> {
        self.table.current(bucket)
    }
}

#[async_trait]
impl ConfigSource for ProtocolConfigSource {
    fn kind(&self) -> ConfigSourceKind {
        ConfigSourceKind::Protocol
    }

    async fn get_topology(
        &self,
        bucket: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<Topology>> {
        tracing::debug!(bucket = %bucket, "fetching topology from servers");
        let document = self.fetcher.fetch(bucket, credentials).await?;
        check_bucket(bucket, &document)?;
        self.table.merge_or_current(document).await
    }

    fn current_topology(&self, bucket: &str) -> Option<Arc<Topology>> {
        self.table.current(bucket)
    }

    async fn register_observer(&self, bucket: &str, observer: Arc<dyn ConfigObserver>) -> bool {
        self.table.register(bucket, observer)
    }

    async fn unregister_observer(&self, bucket: &str) {
        if self.table.unregister(bucket) {
            tracing::debug!(bucket = %bucket, "unregistered protocol observer");
        }
    }

    async fn observer_exists(&self, bucket: &str) -> bool {
        self.table.observer_exists(bucket)
    }

    async fn update_config(&self, document: TopologyDocument, force: bool) -> Result<bool> {
        Ok(self.table.merge(document, force).await?.is_some())
    }

    async fn shutdown(&self) {
        self.table.clear();
    }
}
