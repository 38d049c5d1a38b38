//! Common test utilities for integration tests.
//!
//! The fakes here stand in for the network: a config fetcher serving canned
//! topology documents and a transport answering requests from a closure.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use docstore_client::core::protocol::{OpCode, RequestPacket, ResponsePacket, ResponseStatus};
use docstore_client::topology::Server;
use docstore_client::{
    ClientConfig, Collection, ConfigCollaborators, ConfigFetcher, ConfigStreamer, Credentials,
    DocstoreClient, DocstoreError, Result, TopologyController,
    TopologyDocument, Transport,
};

pub const SERVER_A: &str = "10.0.0.1:11210";
pub const SERVER_B: &str = "10.0.0.2:11210";
pub const SERVER_C: &str = "10.0.0.3:11210";

/// Builds a partitioned topology where every one of `partitions` partitions
/// uses the same server chain.
pub fn partitioned_document(
    bucket: &str,
    rev: u64,
    servers: &[&str],
    chain: &[i16],
    partitions: usize,
) -> TopologyDocument {
    TopologyDocument::from_json(&partitioned_json(bucket, rev, servers, chain, partitions), None)
        .expect("test document must parse")
}

/// JSON form of [`partitioned_document`], as a server would attach it to a rejection.
pub fn partitioned_json(
    bucket: &str,
    rev: u64,
    servers: &[&str],
    chain: &[i16],
    partitions: usize,
) -> Vec<u8> {
    let map: Vec<&[i16]> = std::iter::repeat(chain).take(partitions).collect();
    serde_json::to_vec(&serde_json::json!({
        "rev": rev,
        "name": bucket,
        "nodeLocator": "vbucket",
        "vBucketServerMap": {
            "hashAlgorithm": "CRC",
            "numReplicas": chain.len().saturating_sub(1),
            "serverList": servers,
            "vBucketMap": map,
        }
    }))
    .expect("test document must serialize")
}

/// Serves one canned document per bucket and counts fetches.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    documents: Mutex<HashMap<String, TopologyDocument>>,
    fetches: AtomicUsize,
    delay: Duration,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every fetch, widening race windows.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn serve(&self, document: TopologyDocument) {
        self.documents.lock().insert(document.name.clone(), document);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigFetcher for StaticFetcher {
    async fn fetch(
        &self,
        bucket: &str,
        _credentials: Option<&Credentials>,
    ) -> Result<TopologyDocument> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.documents
            .lock()
            .get(bucket)
            .cloned()
            .ok_or_else(|| DocstoreError::Connection(format!("no config for {bucket}")))
    }
}

/// A fetcher and streamer whose every call fails.
#[derive(Debug)]
pub struct UnreachableCluster;

#[async_trait]
impl ConfigFetcher for UnreachableCluster {
    async fn fetch(
        &self,
        bucket: &str,
        _credentials: Option<&Credentials>,
    ) -> Result<TopologyDocument> {
        Err(DocstoreError::Connection(format!("kv config for {bucket} unreachable")))
    }
}

#[async_trait]
impl ConfigStreamer for UnreachableCluster {
    async fn fetch(
        &self,
        bucket: &str,
        _credentials: Option<&Credentials>,
    ) -> Result<TopologyDocument> {
        Err(DocstoreError::Connection(format!("http config for {bucket} unreachable")))
    }

    async fn stream(
        &self,
        bucket: &str,
        _credentials: Option<&Credentials>,
    ) -> Result<mpsc::Receiver<TopologyDocument>> {
        Err(DocstoreError::Connection(format!("http stream for {bucket} unreachable")))
    }
}

type Handler = dyn Fn(&Server, &RequestPacket) -> Result<ResponsePacket> + Send + Sync;

/// One request as seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub server: String,
    pub opcode: OpCode,
    pub partition: u16,
    pub extras: Bytes,
    pub value: Bytes,
}

/// Answers every request from a closure and records what was sent.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    delays: HashMap<String, Duration>,
    sent: Mutex<Vec<SentRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Server, &RequestPacket) -> Result<ResponsePacket> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delays: HashMap::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Makes `address` answer only after `delay`.
    pub fn delay(mut self, address: &str, delay: Duration) -> Self {
        self.delays.insert(address.to_string(), delay);
        self
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().clone()
    }
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("sent", &self.sent.lock().len())
            .finish()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, server: &Server, request: RequestPacket) -> Result<ResponsePacket> {
        self.sent.lock().push(SentRequest {
            server: server.address().to_string(),
            opcode: request.opcode,
            partition: request.partition,
            extras: request.extras.clone(),
            value: request.value.clone(),
        });
        if let Some(delay) = self.delays.get(server.address()) {
            tokio::time::sleep(*delay).await;
        }
        let mut response = (self.handler)(server, &request)?;
        response.opaque = request.opaque;
        Ok(response)
    }
}

/// Builds a response carrying `value`.
pub fn response(opcode: OpCode, status: ResponseStatus, cas: u64, value: impl Into<Bytes>) -> ResponsePacket {
    let mut packet = ResponsePacket::new(opcode, status);
    packet.cas = cas;
    packet.value = value.into();
    packet
}

/// Builds a whole-document fetch response with the given document flags.
pub fn document_response(opcode: OpCode, cas: u64, flags: u32, body: &[u8]) -> ResponsePacket {
    let mut packet = response(opcode, ResponseStatus::Success, cas, Bytes::copy_from_slice(body));
    packet.extras = Bytes::copy_from_slice(&flags.to_be_bytes());
    packet
}

/// Encodes multi-lookup result entries.
pub fn lookup_body(entries: &[(ResponseStatus, &[u8])]) -> Bytes {
    let mut buf = BytesMut::new();
    for (status, value) in entries {
        buf.put_u16(status.value());
        buf.put_u32(value.len() as u32);
        buf.put_slice(value);
    }
    buf.freeze()
}

/// Decodes the lookup specs of a request body into `(opcode, flags, path)`.
pub fn lookup_specs(body: &Bytes) -> Vec<(u8, u8, String)> {
    let mut cursor = body.clone();
    let mut specs = Vec::new();
    while cursor.has_remaining() {
        let opcode = cursor.get_u8();
        let flags = cursor.get_u8();
        let len = cursor.get_u16() as usize;
        let path = String::from_utf8(cursor.split_to(len).to_vec()).expect("path is UTF-8");
        specs.push((opcode, flags, path));
    }
    specs
}

/// Decodes the mutation specs of a request body into `(opcode, flags, path, value)`.
pub fn mutation_specs(body: &Bytes) -> Vec<(u8, u8, String, Bytes)> {
    let mut cursor = body.clone();
    let mut specs = Vec::new();
    while cursor.has_remaining() {
        let opcode = cursor.get_u8();
        let flags = cursor.get_u8();
        let path_len = cursor.get_u16() as usize;
        let value_len = cursor.get_u32() as usize;
        let path = String::from_utf8(cursor.split_to(path_len).to_vec()).expect("path is UTF-8");
        let value = cursor.split_to(value_len);
        specs.push((opcode, flags, path, value));
    }
    specs
}

/// Routes library logs to the test harness; set `RUST_LOG` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Opens `bucket` through a protocol-only client backed by `fetcher` and `transport`.
pub async fn open_collection(
    bucket: &str,
    fetcher: Arc<StaticFetcher>,
    transport: Arc<ScriptedTransport>,
) -> (DocstoreClient, Collection) {
    init_tracing();
    let config = ClientConfig::builder()
        .address(SERVER_A)
        .config_sources(vec![docstore_client::ConfigSourceKind::Protocol])
        .kv_timeout(Duration::from_secs(2))
        .retry(|r| {
            r.initial_backoff(Duration::from_millis(1))
                .max_backoff(Duration::from_millis(5))
                .max_retries(3)
        })
        .build()
        .expect("failed to build config");
    let client = DocstoreClient::new(config, ConfigCollaborators::with_fetcher(fetcher), transport)
        .expect("failed to create client");
    let bucket = client.bucket(bucket).await.expect("bucket must bootstrap");
    let collection = bucket.default_collection();
    (client, collection)
}

pub fn protocol_controller(fetcher: Arc<StaticFetcher>) -> TopologyController {
    let sources = docstore_client::build_config_sources(
        &[docstore_client::ConfigSourceKind::Protocol],
        &ConfigCollaborators::with_fetcher(fetcher),
    )
    .expect("protocol source must build");
    TopologyController::new(sources, Duration::from_secs(2))
}
