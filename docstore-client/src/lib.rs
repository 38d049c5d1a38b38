//! Async Rust client core for partitioned document databases.
//!
//! This crate routes key-value and sub-document operations to the server that
//! owns each key, keeps every open bucket's topology current, and reassembles
//! multi-path responses into typed results. It is built on
//! [Tokio](https://tokio.rs/) and exposes every operation as an `async fn`.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use docstore_client::{
//!     ClientConfig, ConfigCollaborators, DocstoreClient, GetOptions, LookupInSpec,
//!     LookupInOptions, TcpTransport,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .address("10.0.0.1:11210")
//!         .credentials("app", "secret")
//!         .build()?;
//!     let client = DocstoreClient::new(
//!         config,
//!         ConfigCollaborators::with_fetcher(my_fetcher()),
//!         Arc::new(TcpTransport::new(Duration::from_secs(2))),
//!     )?;
//!
//!     let bucket = client.bucket("travel").await?;
//!     let airlines = bucket.default_collection();
//!
//!     // Only two fields travel over the wire
//!     let airline = airlines
//!         .get("airline::10", GetOptions::new().project(["name", "country"]))
//!         .await?;
//!
//!     let lookup = airlines
//!         .lookup_in(
//!             "airline::10",
//!             [LookupInSpec::get("callsign"), LookupInSpec::exists("iata")],
//!             LookupInOptions::new(),
//!         )
//!         .await?;
//!     let callsign: String = lookup.content_as(0)?;
//!
//!     bucket.close().await;
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Topology
//!
//! Buckets are bootstrapped by [`TopologyController`] from an ordered list of
//! [`ConfigSource`]s. The first source that answers wins; if every source
//! fails, the error lists each failure. Later topology revisions flow from
//! the sources into the bucket handle and are picked up by the next
//! operation without blocking it.
//!
//! A server that receives a request for a partition it does not own answers
//! with its current topology; the collection publishes that topology and
//! retries with backoff.
//!
//! # Configuration
//!
//! Use [`ClientConfig::builder()`](ClientConfig::builder), or with the
//! `config-file` feature load YAML or TOML through
//! [`config_file::load_config`]. [`ClientConfig::from_env`] reads
//! `DOCSTORE_*` variables.
//!
//! # Feature Flags
//!
//! | Flag | Purpose |
//! |------|---------|
//! | `config-file` | YAML and TOML configuration files |

#![warn(missing_docs)]

mod client;
pub mod cluster;
pub mod config;
pub mod config_file;
pub mod kv;
pub mod topology;
mod transport;

pub use client::{Bucket, DocstoreClient};
pub use cluster::{
    build_config_sources, BucketHandle, BucketKind, BucketState, ConfigCollaborators,
    ConfigFetcher, ConfigObserver, ConfigSource, ConfigSourceKind, ConfigStreamer,
    HttpStreamingConfigSource, ProtocolConfigSource, RefCountable, TopologyController,
    TopologyEvent,
};
pub use config::{
    ClientConfig, ClientConfigBuilder, ConfigError, Credentials, RetryConfig, RetryConfigBuilder,
    TimeoutConfig, TimeoutConfigBuilder,
};
pub use docstore_core as core;
pub use docstore_core::protocol::{DurabilityLevel, StoreSemantics};
pub use docstore_core::{DocstoreError, Result, SubDocErrorKind};
pub use kv::{
    Collection, GetOptions, GetReplicaResult, GetResult, KvSettings, LookupInBuilder,
    LookupInOptions, LookupInResult, LookupInSpec, MutateInBuilder, MutateInOptions,
    MutateInResult, MutateInSpec, OperationTimeout,
};
pub use topology::{PartitionEntry, PartitionMap, Resolver, Server, ServerSet, Topology, TopologyDocument};
pub use transport::{TcpTransport, Transport};
