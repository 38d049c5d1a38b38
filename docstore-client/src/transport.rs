//! The boundary between key-value operations and the network.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, Encoder};

use docstore_core::protocol::{PacketCodec, RequestPacket, ResponsePacket};
use docstore_core::{DocstoreError, Result};

use crate::topology::Server;

/// Sends one request to a server and returns its response.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends `request` to `server` and waits for the matching response.
    async fn send(&self, server: &Server, request: RequestPacket) -> Result<ResponsePacket>;
}

/// One plain TCP connection to a key-value server.
///
/// Requests are strictly sequential per connection: a request is written and
/// the connection is read until the response with the same opaque arrives.
#[derive(Debug)]
struct KvConnection {
    address: String,
    stream: TcpStream,
    codec: PacketCodec,
    read_buffer: BytesMut,
}

impl KvConnection {
    async fn connect(address: &str, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                DocstoreError::Timeout(format!("connecting to {address} took longer than {timeout:?}"))
            })?
            .map_err(|e| DocstoreError::Connection(format!("failed to connect to {address}: {e}")))?;

        stream.set_nodelay(true).map_err(|e| {
            DocstoreError::Connection(format!("failed to set TCP_NODELAY: {e}"))
        })?;

        tracing::debug!(address = %address, "established connection");
        Ok(Self {
            address: address.to_string(),
            stream,
            codec: PacketCodec::new(),
            read_buffer: BytesMut::with_capacity(8192),
        })
    }

    async fn round_trip(&mut self, request: RequestPacket) -> Result<ResponsePacket> {
        let opaque = request.opaque;
        let mut buf = BytesMut::with_capacity(request.wire_size());
        self.codec.encode(request, &mut buf)?;
        self.stream.write_all(&buf).await.map_err(|e| {
            DocstoreError::Connection(format!("failed to write to {}: {e}", self.address))
        })?;

        loop {
            let response = self.receive().await?;
            if response.opaque == opaque {
                return Ok(response);
            }
            tracing::debug!(
                address = %self.address,
                expected = opaque,
                received = response.opaque,
                "discarding unmatched response"
            );
        }
    }

    async fn receive(&mut self) -> Result<ResponsePacket> {
        loop {
            if let Some(response) = self.codec.decode(&mut self.read_buffer)? {
                return Ok(response);
            }
            let bytes_read = self.stream.read_buf(&mut self.read_buffer).await.map_err(|e| {
                DocstoreError::Connection(format!("failed to read from {}: {e}", self.address))
            })?;
            if bytes_read == 0 {
                return Err(DocstoreError::Connection(format!(
                    "connection to {} closed unexpectedly",
                    self.address
                )));
            }
        }
    }
}

/// A [`Transport`] keeping one TCP connection per server.
///
/// Authentication and connection pooling are left to the deployment; this
/// transport suits servers that accept unauthenticated binary connections.
#[derive(Debug)]
pub struct TcpTransport {
    connections: Mutex<HashMap<String, Arc<Mutex<KvConnection>>>>,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Creates a transport that gives up connecting after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            connect_timeout,
        }
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    async fn connection(&self, address: &str) -> Result<Arc<Mutex<KvConnection>>> {
        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(address) {
            return Ok(existing.clone());
        }
        let connection = Arc::new(Mutex::new(
            KvConnection::connect(address, self.connect_timeout).await?,
        ));
        connections.insert(address.to_string(), connection.clone());
        Ok(connection)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, server: &Server, request: RequestPacket) -> Result<ResponsePacket> {
        let connection = self.connection(server.address()).await?;
        let result = connection.lock().await.round_trip(request).await;
        if let Err(DocstoreError::Connection(_)) = &result {
            self.connections.lock().await.remove(server.address());
            tracing::warn!(server = %server, "dropped broken connection");
        }
        result
    }
}
