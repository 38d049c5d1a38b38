//! Key-value operations against one bucket.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use tracing::instrument;

use docstore_core::protocol::{
    decode_lookup_response, decode_mutation_response, first_failure, get_request,
    lookup_request, mutation_request, replica_read_request, MutationEnvelope, OperationSpec,
    RequestPacket, ResponsePacket, ResponseStatus,
};
use docstore_core::{
    DocstoreError, JsonSerializer, JsonTranscoder, PartitionIndex, Result, Serializer, Transcoder,
};

use crate::cluster::{BucketHandle, TopologyController};
use crate::config::{ClientConfig, RetryConfig};
use crate::topology::{Server, TopologyDocument};
use crate::transport::Transport;

use super::get_result::{plan_get, GetPlan, GetResult};
use super::lookup_in::{LookupInBuilder, LookupInResult, LookupInSpec};
use super::mutate_in::{MutateInBuilder, MutateInResult, MutateInSpec};
use super::options::{GetOptions, LookupInOptions, MutateInOptions};
use super::replica::{as_completed, first_completed, GetReplicaResult};
use super::timeout::OperationTimeout;

/// Settings shared by every operation of a collection.
#[derive(Debug, Clone)]
pub struct KvSettings {
    /// Default deadline of one operation.
    pub kv_timeout: Duration,
    /// Backoff between attempts after a wrong-owner rejection.
    pub retry: RetryConfig,
    /// Codec for sub-document values.
    pub serializer: Arc<dyn Serializer>,
    /// Codec for whole-document bodies.
    pub transcoder: Arc<dyn Transcoder>,
}

impl KvSettings {
    /// Takes timeouts and retry settings from `config`, with JSON codecs.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            kv_timeout: config.timeouts().kv_timeout(),
            retry: config.retry().clone(),
            ..Self::default()
        }
    }
}

impl Default for KvSettings {
    fn default() -> Self {
        Self {
            kv_timeout: Duration::from_millis(2500),
            retry: RetryConfig::default(),
            serializer: Arc::new(JsonSerializer),
            transcoder: Arc::new(JsonTranscoder),
        }
    }
}

/// Which copy of a document a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Primary,
    Replica(usize),
}

/// Key-value access to the documents of one bucket.
///
/// Cheap to clone; clones share the bucket handle and transport.
#[derive(Debug, Clone)]
pub struct Collection {
    bucket: Arc<BucketHandle>,
    controller: Arc<TopologyController>,
    transport: Arc<dyn Transport>,
    settings: Arc<KvSettings>,
}

impl Collection {
    /// Creates a collection routing through `bucket`'s topology.
    pub fn new(
        bucket: Arc<BucketHandle>,
        controller: Arc<TopologyController>,
        transport: Arc<dyn Transport>,
        settings: KvSettings,
    ) -> Self {
        Self {
            bucket,
            controller,
            transport,
            settings: Arc::new(settings),
        }
    }

    /// Bucket this collection belongs to.
    pub fn bucket(&self) -> &Arc<BucketHandle> {
        &self.bucket
    }

    /// Fetches a document, optionally only some of its paths and its expiry.
    #[instrument(name = "collection.get", skip(self, options), fields(bucket = %self.bucket.name()))]
    pub async fn get(&self, key: &str, options: GetOptions) -> Result<GetResult> {
        let timeout = self.deadline(options.timeout_override());
        match plan_get(&options)? {
            GetPlan::Document => {
                let (response, _) = self
                    .dispatch(key, Target::Primary, &timeout, |partition| {
                        get_request(key.as_bytes(), partition)
                    })
                    .await?;
                self.document_result(key, response)
            }
            GetPlan::Lookup {
                mut specs,
                whole_document,
            } => {
                let (cas, _) = self
                    .send_lookup(key, &mut specs, LookupInOptions::default(), &timeout)
                    .await?;
                GetResult::from_lookup(
                    key.to_string(),
                    cas,
                    specs,
                    &options,
                    whole_document,
                    self.settings.serializer.as_ref(),
                    self.settings.transcoder.clone(),
                )
            }
        }
    }

    /// Reads several paths of one document in a single request.
    pub async fn lookup_in(
        &self,
        key: &str,
        specs: impl IntoIterator<Item = LookupInSpec>,
        options: LookupInOptions,
    ) -> Result<LookupInResult> {
        let specs = specs.into_iter().map(LookupInSpec::into_operation).collect();
        self.lookup_in_specs(key, specs, options).await
    }

    /// Starts a lookup builder for `key`.
    pub fn lookup_in_builder(&self, key: impl Into<String>) -> LookupInBuilder {
        LookupInBuilder::new(self.clone(), key)
    }

    /// Changes several paths of one document atomically.
    pub async fn mutate_in(
        &self,
        key: &str,
        specs: impl IntoIterator<Item = MutateInSpec>,
        options: MutateInOptions,
    ) -> Result<MutateInResult> {
        let specs = specs.into_iter().map(MutateInSpec::into_operation).collect();
        self.mutate_in_specs(key, specs, options).await
    }

    /// Starts a mutation builder for `key`.
    pub fn mutate_in_builder(&self, key: impl Into<String>) -> MutateInBuilder {
        MutateInBuilder::new(self.clone(), key)
    }

    /// Reads the document from the primary and every replica at once and
    /// returns whichever answers first.
    ///
    /// A replica may answer with an older version than the primary holds.
    /// Reads still running when the first one finishes are aborted.
    #[instrument(name = "collection.get_any_replica", skip(self), fields(bucket = %self.bucket.name()))]
    pub async fn get_any_replica(&self, key: &str) -> Result<GetReplicaResult> {
        first_completed(self.spawn_replica_reads(key)?).await
    }

    /// Reads the document from the primary and every replica at once and
    /// yields each answer as it arrives.
    pub fn get_all_replicas(&self, key: &str) -> Result<BoxStream<'static, Result<GetReplicaResult>>> {
        Ok(as_completed(self.spawn_replica_reads(key)?))
    }

    pub(crate) async fn lookup_in_specs(
        &self,
        key: &str,
        mut specs: Vec<OperationSpec>,
        options: LookupInOptions,
    ) -> Result<LookupInResult> {
        let timeout = self.deadline(options.timeout_override());
        let (cas, deleted) = self.send_lookup(key, &mut specs, options, &timeout).await?;
        Ok(LookupInResult::new(
            key.to_string(),
            cas,
            deleted,
            specs,
            self.settings.serializer.clone(),
        ))
    }

    #[instrument(
        name = "collection.mutate_in",
        skip(self, specs, options),
        fields(bucket = %self.bucket.name(), specs = specs.len())
    )]
    pub(crate) async fn mutate_in_specs(
        &self,
        key: &str,
        mut specs: Vec<OperationSpec>,
        options: MutateInOptions,
    ) -> Result<MutateInResult> {
        let timeout = self.deadline(options.timeout_override());
        let envelope = MutationEnvelope {
            cas: options.cas_value(),
            expiry: options.expiry_value(),
            doc_flags: options.doc_flags(),
            durability: options.durability_requirement(),
        };
        let (response, _) = self
            .dispatch(key, Target::Primary, &timeout, |partition| {
                mutation_request(key.as_bytes(), partition, &specs, &envelope)
            })
            .await?;

        if let Some(err) = response.status.to_document_error(key, envelope.cas != 0) {
            return Err(err);
        }
        decode_mutation_response(response.status, &response.value, &mut specs)?;
        if !response.status.is_success() {
            return Err(first_failure(&specs).unwrap_or_else(|| {
                DocstoreError::Protocol("multi-path failure without a failing spec".to_string())
            }));
        }
        Ok(MutateInResult::new(
            response.cas,
            specs,
            self.settings.serializer.clone(),
        ))
    }

    #[instrument(
        name = "collection.lookup_in",
        skip(self, specs, options, timeout),
        fields(bucket = %self.bucket.name(), specs = specs.len())
    )]
    async fn send_lookup(
        &self,
        key: &str,
        specs: &mut [OperationSpec],
        options: LookupInOptions,
        timeout: &OperationTimeout,
    ) -> Result<(u64, bool)> {
        let doc_flags = options.doc_flags();
        let (response, _) = {
            let specs: &[OperationSpec] = specs;
            self.dispatch(key, Target::Primary, timeout, |partition| {
                lookup_request(key.as_bytes(), partition, specs, doc_flags)
            })
            .await?
        };
        if let Some(err) = response.status.to_document_error(key, false) {
            return Err(err);
        }
        decode_lookup_response(&response.value, specs)?;
        Ok((response.cas, response.status.is_deleted()))
    }

    fn spawn_replica_reads(
        &self,
        key: &str,
    ) -> Result<Vec<tokio::task::JoinHandle<Result<GetReplicaResult>>>> {
        let topology = self.current_topology()?;
        let resolver = topology.resolver().ok_or_else(|| self.unsupported())?;
        let map = topology.map().ok_or_else(|| self.unsupported())?;
        let entry = map.map_key(key.as_bytes());

        if !resolver.has_replicas(entry) {
            tracing::warn!(
                bucket = %self.bucket.name(),
                partition = entry.index(),
                "partition has no replicas, reading the primary only"
            );
        }

        let copies = std::iter::once(Target::Primary).chain(
            (0..entry.replicas().len())
                .filter(|&slot| resolver.locate_replica(entry, slot).is_some())
                .map(Target::Replica),
        );
        let timeout = self.deadline(None);
        Ok(copies
            .map(|copy| {
                let collection = self.clone();
                let key = key.to_string();
                tokio::spawn(async move { collection.read_copy(&key, copy, timeout).await })
            })
            .collect())
    }

    async fn read_copy(
        &self,
        key: &str,
        copy: Target,
        timeout: OperationTimeout,
    ) -> Result<GetReplicaResult> {
        let (response, server) = self
            .dispatch(key, copy, &timeout, |partition| match copy {
                Target::Primary => get_request(key.as_bytes(), partition),
                Target::Replica(_) => replica_read_request(key.as_bytes(), partition),
            })
            .await?;
        tracing::debug!(server = %server, ?copy, "copy answered");
        let result = self.document_result(key, response)?;
        Ok(GetReplicaResult::new(result, copy != Target::Primary))
    }

    fn document_result(&self, key: &str, response: ResponsePacket) -> Result<GetResult> {
        if !response.status.is_success() {
            return Err(response
                .status
                .to_document_error(key, false)
                .unwrap_or(DocstoreError::Server {
                    status: response.status.value(),
                }));
        }
        let flags = response.flags();
        Ok(GetResult::from_document(
            key.to_string(),
            response.cas,
            flags,
            response.value,
            self.settings.transcoder.clone(),
        ))
    }

    /// Routes a request for `key` and retries while servers reject it as not
    /// theirs, refreshing the topology from each rejection.
    async fn dispatch<F>(
        &self,
        key: &str,
        copy: Target,
        timeout: &OperationTimeout,
        build: F,
    ) -> Result<(ResponsePacket, Arc<Server>)>
    where
        F: Fn(PartitionIndex) -> Result<RequestPacket>,
    {
        let retry = &self.settings.retry;
        let mut attempt = 0u32;
        loop {
            if timeout.is_expired() {
                return Err(DocstoreError::Timeout(format!(
                    "operation on {key:?} did not complete within {:?}",
                    timeout.duration()
                )));
            }

            let (partition, server) = self.route(key, copy)?;
            let request = build(partition)?;
            let response = tokio::time::timeout(
                timeout.remaining(),
                self.transport.send(&server, request),
            )
            .await
            .map_err(|_| {
                DocstoreError::Timeout(format!(
                    "{server} did not answer for {key:?} within {:?}",
                    timeout.duration()
                ))
            })??;

            if response.status != ResponseStatus::NotMyVbucket {
                return Ok((response, server));
            }

            attempt += 1;
            self.refresh_from_rejection(&response, &server).await;
            if attempt > retry.max_retries() {
                return Err(DocstoreError::NotMyPartition {
                    partition,
                    server: server.address().to_string(),
                });
            }
            let delay = retry.backoff_for(attempt - 1).min(timeout.remaining());
            tracing::warn!(
                bucket = %self.bucket.name(),
                partition,
                server = %server,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "server does not own partition, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn route(&self, key: &str, copy: Target) -> Result<(PartitionIndex, Arc<Server>)> {
        let topology = self.current_topology()?;
        let resolver = topology.resolver().ok_or_else(|| self.unsupported())?;
        let map = topology.map().ok_or_else(|| self.unsupported())?;
        let entry = map.map_key(key.as_bytes());
        let server = match copy {
            Target::Primary => resolver.locate_primary(entry),
            Target::Replica(slot) => resolver.locate_replica(entry, slot),
        };
        let server = server.ok_or_else(|| {
            DocstoreError::Connection(format!(
                "no server available for partition {} of bucket {}",
                entry.index(),
                self.bucket.name()
            ))
        })?;
        Ok((entry.index(), server))
    }

    /// Installs the topology a server attached to its wrong-owner rejection.
    ///
    /// A document of the same revision as the one the request was routed
    /// with is forced in: the server disagrees with a map the client
    /// believes current, so the server's copy wins.
    async fn refresh_from_rejection(&self, response: &ResponsePacket, server: &Server) {
        if response.value.is_empty() {
            return;
        }
        let host = server
            .address()
            .rsplit_once(':')
            .map_or(server.address(), |(host, _)| host);
        let document = match TopologyDocument::from_json(&response.value, Some(host)) {
            Ok(document) => document,
            Err(e) => {
                tracing::debug!(server = %server, error = %e, "rejection carried no usable topology");
                return;
            }
        };
        let force = document.rev == self.bucket.revision();
        if let Err(e) = self.controller.notify_config_published(document, force).await {
            tracing::warn!(error = %e, "failed to publish topology from rejection");
        }
    }

    fn current_topology(&self) -> Result<Arc<crate::topology::Topology>> {
        self.bucket.topology().ok_or_else(|| {
            DocstoreError::Connection(format!(
                "bucket {} has no topology ({:?})",
                self.bucket.name(),
                self.bucket.state()
            ))
        })
    }

    fn unsupported(&self) -> DocstoreError {
        DocstoreError::Unsupported(format!(
            "key-value routing is not available for {} bucket {}",
            self.bucket.kind(),
            self.bucket.name()
        ))
    }

    fn deadline(&self, timeout: Option<Duration>) -> OperationTimeout {
        OperationTimeout::new(timeout.unwrap_or(self.settings.kv_timeout))
    }
}
