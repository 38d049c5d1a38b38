//! Docstore client entry point.

use std::fmt;
use std::sync::Arc;

use docstore_core::Result;

use crate::cluster::{build_config_sources, BucketHandle, ConfigCollaborators, TopologyController};
use crate::config::ClientConfig;
use crate::kv::{Collection, KvSettings};
use crate::transport::Transport;

/// The main entry point for talking to a docstore cluster.
///
/// `DocstoreClient` owns the topology controller and the transport, and hands
/// out [`Bucket`]s whose collections run key-value operations.
///
/// # Example
///
/// ```ignore
/// use docstore_client::{ClientConfig, ConfigCollaborators, DocstoreClient, GetOptions, TcpTransport};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::builder().address("10.0.0.1:11210").build()?;
///     let client = DocstoreClient::new(
///         config,
///         ConfigCollaborators::with_fetcher(my_fetcher()),
///         Arc::new(TcpTransport::new(Duration::from_secs(2))),
///     )?;
///
///     let bucket = client.bucket("travel").await?;
///     let doc = bucket
///         .default_collection()
///         .get("airline::10", GetOptions::new().project(["name", "country"]))
///         .await?;
///     println!("{:?}", doc.content_as::<serde_json::Value>()?);
///
///     bucket.close().await;
///     client.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct DocstoreClient {
    config: Arc<ClientConfig>,
    controller: Arc<TopologyController>,
    transport: Arc<dyn Transport>,
    settings: KvSettings,
}

impl DocstoreClient {
    /// Creates a client whose config sources are built from `collaborators`
    /// in the order the configuration lists them.
    ///
    /// No bucket is opened yet; see [`bucket`](Self::bucket).
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a configured source kind has no
    /// matching collaborator.
    pub fn new(
        config: ClientConfig,
        mut collaborators: ConfigCollaborators,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        collaborators.stream_reconnect_delay = config.stream_reconnect_delay();
        let sources = build_config_sources(config.config_sources(), &collaborators)?;
        let controller = Arc::new(TopologyController::new(
            sources,
            config.timeouts().bootstrap_timeout(),
        ));
        let settings = KvSettings::from_config(&config);

        tracing::info!(
            addresses = ?config.bootstrap_addresses(),
            sources = ?config.config_sources(),
            "docstore client created"
        );

        Ok(Self {
            config: Arc::new(config),
            controller,
            transport,
            settings,
        })
    }

    /// Replaces the key-value settings, e.g. to install a custom serializer.
    pub fn with_kv_settings(mut self, settings: KvSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Opens `name`, bootstrapping it on first use.
    ///
    /// Opening a bucket that is already open shares its handle. Each returned
    /// [`Bucket`] holds one reference; [`Bucket::close`] gives it back.
    pub async fn bucket(&self, name: &str) -> Result<Bucket> {
        let handle = self
            .controller
            .create_bucket(name, self.config.credentials())
            .await?;
        let collection = Collection::new(
            handle.clone(),
            self.controller.clone(),
            self.transport.clone(),
            self.settings.clone(),
        );
        Ok(Bucket {
            handle,
            controller: self.controller.clone(),
            collection,
        })
    }

    /// Returns the topology controller.
    pub fn controller(&self) -> &Arc<TopologyController> {
        &self.controller
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Destroys every open bucket and stops every config source.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        tracing::info!("shutting down docstore client");
        self.controller.dispose().await;
    }
}

impl fmt::Debug for DocstoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocstoreClient")
            .field("addresses", &self.config.bootstrap_addresses())
            .field("disposed", &self.controller.is_disposed())
            .finish()
    }
}

/// An open bucket.
#[derive(Debug, Clone)]
pub struct Bucket {
    handle: Arc<BucketHandle>,
    controller: Arc<TopologyController>,
    collection: Collection,
}

impl Bucket {
    /// Bucket name.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Shared handle carrying the bucket's topology.
    pub fn handle(&self) -> &Arc<BucketHandle> {
        &self.handle
    }

    /// The bucket's default collection.
    pub fn default_collection(&self) -> Collection {
        self.collection.clone()
    }

    /// Gives back this bucket's reference, destroying the bucket if it was
    /// the last one. Returns true if the bucket was destroyed.
    pub async fn close(self) -> bool {
        self.controller.release_bucket(&self.handle).await
    }
}
