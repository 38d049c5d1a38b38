//! Config source backed by a streaming management endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use docstore_core::Result;

use crate::config::Credentials;
use crate::topology::Topology;

use super::config_source::{
    check_bucket, ConfigObserver, ConfigSource, ConfigSourceKind, ConfigStreamer, TopologyTable,
};

/// Follows a long-lived config stream per observed bucket.
///
/// The first document is fetched directly. Registering an observer starts a
/// listener task that merges every streamed document with the usual revision
/// rule and reopens the stream after `reconnect_delay` when it closes.
#[derive(Debug)]
pub struct HttpStreamingConfigSource {
    streamer: Arc<dyn ConfigStreamer>,
    table: Arc<TopologyTable>,
    credentials: parking_lot::Mutex<HashMap<String, Option<Credentials>>>,
    listeners: parking_lot::Mutex<HashMap<String, CancellationToken>>,
    shutdown: CancellationToken,
    reconnect_delay: Duration,
}

impl HttpStreamingConfigSource {
    /// Creates a source streaming through `streamer`.
    pub fn new(streamer: Arc<dyn ConfigStreamer>, reconnect_delay: Duration) -> Self {
        Self {
            streamer,
            table: Arc::new(TopologyTable::new(ConfigSourceKind::HttpStreaming)),
            credentials: parking_lot::Mutex::new(HashMap::new()),
            listeners: parking_lot::Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            reconnect_delay,
        }
    }

    /// Currently installed snapshot for `bucket`.
    pub fn current(&self, bucket: &str) -> Option<Arc<Topology>> {
        self.table.current(bucket)
    }

    /// Returns true if a listener task is running for `bucket`.
    pub fn is_listening(&self, bucket: &str) -> bool {
        self.listeners.lock().contains_key(bucket)
    }

    fn spawn_listener(&self, bucket: &str) {
        let token = self.shutdown.child_token();
        let credentials = self.credentials.lock().get(bucket).cloned().flatten();
        let listener = StreamListener {
            bucket: bucket.to_string(),
            credentials,
            streamer: self.streamer.clone(),
            table: self.table.clone(),
            token: token.clone(),
            reconnect_delay: self.reconnect_delay,
        };
        if let Some(previous) = self.listeners.lock().insert(bucket.to_string(), token) {
            previous.cancel();
        }
        tokio::spawn(listener.run());
    }
}

#[async_trait]
impl ConfigSource for HttpStreamingConfigSource {
    fn kind(&self) -> ConfigSourceKind {
        ConfigSourceKind::HttpStreaming
    }

    async fn get_topology(
        &self,
        bucket: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<Topology>> {
        tracing::debug!(bucket = %bucket, "fetching topology from streaming endpoint");
        let document = self.streamer.fetch(bucket, credentials).await?;
        check_bucket(bucket, &document)?;
        self.credentials
            .lock()
            .insert(bucket.to_string(), credentials.cloned());
        self.table.merge_or_current(document).await
    }

    fn current_topology(&self, bucket: &str) -> Option<Arc<Topology>> {
        self.table.current(bucket)
    }

    async fn register_observer(&self, bucket: &str, observer: Arc<dyn ConfigObserver>) -> bool {
        if !self.table.register(bucket, observer) {
            return false;
        }
        self.spawn_listener(bucket);
        true
    }

    async fn unregister_observer(&self, bucket: &str) {
        self.table.unregister(bucket);
        if let Some(token) = self.listeners.lock().remove(bucket) {
            token.cancel();
            tracing::debug!(bucket = %bucket, "stopped config stream listener");
        }
    }

    async fn observer_exists(&self, bucket: &str) -> bool {
        self.table.observer_exists(bucket)
    }

    async fn shutdown(&self) {
        self.shutdown.cancel();
        self.listeners.lock().clear();
        self.credentials.lock().clear();
        self.table.clear();
    }
}

struct StreamListener {
    bucket: String,
    credentials: Option<Credentials>,
    streamer: Arc<dyn ConfigStreamer>,
    table: Arc<TopologyTable>,
    token: CancellationToken,
    reconnect_delay: Duration,
}

impl StreamListener {
    async fn run(self) {
        loop {
            let opened = tokio::select! {
                _ = self.token.cancelled() => return,
                opened = self.streamer.stream(&self.bucket, self.credentials.as_ref()) => opened,
            };

            match opened {
                Ok(mut stream) => loop {
                    let next = tokio::select! {
                        _ = self.token.cancelled() => return,
                        next = stream.recv() => next,
                    };
                    let Some(document) = next else { break };
                    if document.name != self.bucket {
                        tracing::warn!(
                            bucket = %self.bucket,
                            received = %document.name,
                            "ignoring streamed topology for another bucket"
                        );
                        continue;
                    }
                    if let Err(e) = self.table.merge(document, false).await {
                        tracing::warn!(bucket = %self.bucket, error = %e, "rejected streamed topology");
                    }
                },
                Err(e) => {
                    tracing::warn!(bucket = %self.bucket, error = %e, "failed to open config stream");
                }
            }

            tracing::debug!(
                bucket = %self.bucket,
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "config stream closed, reopening"
            );
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
    }
}
