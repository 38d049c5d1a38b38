//! Bucket topology documents as published by the cluster.

use serde::{Deserialize, Serialize};

use docstore_core::{DocstoreError, HashAlgorithm, Result};

/// Placeholder servers use for "the host you fetched this document from".
const HOST_PLACEHOLDER: &str = "$HOST";

/// How keys of a bucket are assigned to servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeLocator {
    /// Fixed partition table.
    #[default]
    Vbucket,
    /// Consistent-hash ring.
    Ketama,
}

/// Ports a node exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePorts {
    /// Key-value port.
    #[serde(default)]
    pub direct: Option<u16>,
}

/// One node entry of a topology document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// `host:port` of the node's management endpoint.
    pub hostname: String,
    /// Service ports.
    #[serde(default)]
    pub ports: NodePorts,
}

impl NodeInfo {
    /// Returns the `host:port` of the key-value service, if advertised.
    pub fn kv_address(&self) -> Option<String> {
        let port = self.ports.direct?;
        let host = match self.hostname.rsplit_once(':') {
            Some((host, _)) => host,
            None => self.hostname.as_str(),
        };
        Some(format!("{host}:{port}"))
    }
}

/// Partition table section of a topology document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VBucketServerMap {
    /// Name of the key hash algorithm.
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,
    /// Number of replicas configured for the bucket.
    #[serde(default)]
    pub num_replicas: usize,
    /// Key-value addresses, indexed by server id.
    pub server_list: Vec<String>,
    /// One row per partition: primary server id, then replica ids; `-1` means none.
    #[serde(rename = "vBucketMap")]
    pub vbucket_map: Vec<Vec<i16>>,
    /// Future partition table during a rebalance.
    #[serde(rename = "vBucketMapForward", default, skip_serializing_if = "Option::is_none")]
    pub vbucket_map_forward: Option<Vec<Vec<i16>>>,
}

fn default_hash_algorithm() -> String {
    HashAlgorithm::Crc.to_string()
}

/// A versioned description of a bucket's servers and partition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyDocument {
    /// Revision, increasing with every topology change.
    #[serde(default)]
    pub rev: u64,
    /// Bucket name.
    pub name: String,
    /// Key placement scheme.
    #[serde(default)]
    pub node_locator: NodeLocator,
    /// Cluster nodes.
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
    /// Partition table, present for partitioned buckets.
    #[serde(rename = "vBucketServerMap", default, skip_serializing_if = "Option::is_none")]
    pub vbucket_server_map: Option<VBucketServerMap>,
}

impl TopologyDocument {
    /// Parses a document, substituting `$HOST` with `origin_host` when given.
    pub fn from_json(bytes: &[u8], origin_host: Option<&str>) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| DocstoreError::Configuration(format!("topology is not UTF-8: {e}")))?;
        let text = match origin_host {
            Some(host) if text.contains(HOST_PLACEHOLDER) => {
                text.replace(HOST_PLACEHOLDER, host)
            }
            _ => text.to_string(),
        };
        let document: TopologyDocument = serde_json::from_str(&text)
            .map_err(|e| DocstoreError::Configuration(format!("invalid topology document: {e}")))?;
        document.validate()?;
        Ok(document)
    }

    /// Serializes the document back to JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| DocstoreError::Serialization(e.to_string()))
    }

    /// Returns the revision.
    pub fn revision(&self) -> u64 {
        self.rev
    }

    /// Returns true if the bucket uses a partition table.
    pub fn is_partitioned(&self) -> bool {
        self.node_locator == NodeLocator::Vbucket
    }

    /// Returns the key-value addresses of every node.
    pub fn node_kv_addresses(&self) -> Vec<String> {
        self.nodes.iter().filter_map(NodeInfo::kv_address).collect()
    }

    /// Returns the parsed hash algorithm.
    pub fn hash_algorithm(&self) -> Result<HashAlgorithm> {
        match &self.vbucket_server_map {
            Some(map) => map.hash_algorithm.parse(),
            None => Ok(HashAlgorithm::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DocstoreError::Configuration(
                "topology document has no bucket name".to_string(),
            ));
        }
        if self.is_partitioned() && self.vbucket_server_map.is_none() {
            return Err(DocstoreError::Configuration(format!(
                "partitioned bucket {} has no vBucketServerMap",
                self.name
            )));
        }
        self.hash_algorithm()?;
        Ok(())
    }
}
