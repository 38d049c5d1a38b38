//! Bucket bootstrap and lifecycle coordination.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::instrument;

use docstore_core::{DocstoreError, Result, SourceFailure};

use crate::config::Credentials;
use crate::topology::TopologyDocument;

use super::bucket::{BucketHandle, BucketKind};
use super::config_source::{ConfigObserver, ConfigSource, ConfigSourceKind, RefCountable};

/// Creates, shares and destroys bucket handles.
///
/// Bootstraps run one at a time under a single controller-wide lock, so two
/// callers opening the same bucket concurrently share one bootstrap and one
/// handle. Topology updates do not take this lock; they flow from the
/// sources straight into the handles.
#[derive(Debug)]
pub struct TopologyController {
    sources: Vec<Arc<dyn ConfigSource>>,
    buckets: Mutex<HashMap<String, Arc<BucketHandle>>>,
    bootstrap_timeout: Duration,
    disposed: AtomicBool,
}

impl TopologyController {
    /// Creates a controller that bootstraps from `sources` in order.
    pub fn new(sources: Vec<Arc<dyn ConfigSource>>, bootstrap_timeout: Duration) -> Self {
        Self {
            sources,
            buckets: Mutex::new(HashMap::new()),
            bootstrap_timeout,
            disposed: AtomicBool::new(false),
        }
    }

    /// Config sources in bootstrap order.
    pub fn sources(&self) -> &[Arc<dyn ConfigSource>] {
        &self.sources
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Returns the registered handle for `name` without taking a reference.
    pub async fn bucket(&self, name: &str) -> Option<Arc<BucketHandle>> {
        self.buckets.lock().await.get(name).cloned()
    }

    /// Opens `name`, bootstrapping it if no active handle exists.
    ///
    /// Every call that returns a handle holds one reference to it; give it
    /// back with [`release_bucket`](Self::release_bucket). If every source
    /// fails, the error lists each source's failure.
    #[instrument(
        name = "topology_controller.create_bucket",
        skip(self, credentials),
        fields(bucket = %name)
    )]
    pub async fn create_bucket(
        &self,
        name: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<BucketHandle>> {
        self.ensure_live()?;
        let mut buckets = self.buckets.lock().await;
        self.ensure_live()?;

        if let Some(existing) = buckets.get(name) {
            if existing.is_active() && existing.add_ref() != -1 {
                tracing::debug!(handle = %existing.id(), "reusing active bucket");
                return Ok(existing.clone());
            }
        }
        if let Some(stale) = buckets.remove(name) {
            tracing::debug!(handle = %stale.id(), "replacing inactive bucket handle");
            self.teardown(&stale).await;
        }

        let mut failures = Vec::new();
        for source in &self.sources {
            tracing::debug!(source = %source.kind(), "requesting bucket topology");
            let fetched =
                tokio::time::timeout(self.bootstrap_timeout, source.get_topology(name, credentials))
                    .await
                    .unwrap_or_else(|_| {
                        Err(DocstoreError::Timeout(format!(
                            "no topology within {:?}",
                            self.bootstrap_timeout
                        )))
                    });
            let topology = match fetched {
                Ok(topology) => topology,
                Err(e) => {
                    tracing::warn!(source = %source.kind(), error = %e, "bootstrap source failed");
                    failures.push(SourceFailure::new(source.kind().name(), e));
                    continue;
                }
            };

            let kind = BucketKind::of(topology.document());
            let handle = Arc::new(BucketHandle::new(name, kind));
            handle.mark_bootstrapping();
            handle.install_if_newer(topology.clone());

            let observer: Arc<dyn ConfigObserver> = handle.clone();
            if !source.register_observer(name, observer).await {
                tracing::warn!(source = %source.kind(), "observer already registered");
            }
            // Merges that landed between the fetch and the registration.
            if let Some(current) = source.current_topology(name) {
                handle.install_if_newer(current);
            }

            handle.mark_active();
            buckets.insert(name.to_string(), handle.clone());

            tracing::info!(
                source = %source.kind(),
                kind = %kind,
                revision = handle.revision(),
                handle = %handle.id(),
                "bucket bootstrapped"
            );
            return Ok(handle);
        }

        Err(DocstoreError::Bootstrap {
            bucket: name.to_string(),
            failures,
        })
    }

    /// Drops one reference to `handle`, destroying the bucket when none remain.
    ///
    /// Returns true if the bucket was destroyed.
    pub async fn release_bucket(&self, handle: &Arc<BucketHandle>) -> bool {
        // Released under the registry lock: create_bucket never revives a zero count.
        let mut buckets = self.buckets.lock().await;
        if handle.release() != 0 {
            return false;
        }
        self.destroy_locked(&mut buckets, handle).await;
        true
    }

    /// Removes `handle` from the registry and from every source's observers.
    ///
    /// Destroying an already destroyed handle is a no-op.
    #[instrument(
        name = "topology_controller.destroy_bucket",
        skip(self, handle),
        fields(bucket = %handle.name())
    )]
    pub async fn destroy_bucket(&self, handle: &Arc<BucketHandle>) {
        let mut buckets = self.buckets.lock().await;
        self.destroy_locked(&mut buckets, handle).await;
    }

    async fn destroy_locked(
        &self,
        buckets: &mut HashMap<String, Arc<BucketHandle>>,
        handle: &Arc<BucketHandle>,
    ) {
        if buckets
            .get(handle.name())
            .is_some_and(|registered| Arc::ptr_eq(registered, handle))
        {
            buckets.remove(handle.name());
            self.teardown(handle).await;
        } else if handle.destroy() {
            tracing::info!(bucket = %handle.name(), handle = %handle.id(), "unregistered bucket destroyed");
        }
    }

    /// Hands a document published by a server to the protocol source.
    ///
    /// `force` installs it even if its revision is not newer than the held
    /// one. Returns true if it was installed.
    #[instrument(
        name = "topology_controller.notify_config_published",
        skip(self, document),
        fields(bucket = %document.name, revision = document.rev)
    )]
    pub async fn notify_config_published(
        &self,
        document: TopologyDocument,
        force: bool,
    ) -> Result<bool> {
        self.ensure_live()?;
        match self
            .sources
            .iter()
            .find(|s| s.kind() == ConfigSourceKind::Protocol)
        {
            Some(source) => source.update_config(document, force).await,
            None => {
                tracing::debug!("no protocol source configured, dropping published config");
                Ok(false)
            }
        }
    }

    /// Destroys every bucket and shuts every source down, once.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let handles: Vec<_> = self.buckets.lock().await.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            self.teardown(handle).await;
        }
        for source in &self.sources {
            source.shutdown().await;
        }
        tracing::info!(buckets = handles.len(), "topology controller disposed");
    }

    async fn teardown(&self, handle: &Arc<BucketHandle>) {
        for source in &self.sources {
            source.unregister_observer(handle.name()).await;
        }
        if handle.destroy() {
            tracing::info!(bucket = %handle.name(), handle = %handle.id(), "bucket destroyed");
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(DocstoreError::Disposed(
                "topology controller has been disposed".to_string(),
            ));
        }
        Ok(())
    }
}
