//! Bucket topology: documents, partition maps, servers and owner resolution.

mod document;
mod partition_map;
mod resolver;
mod server_set;

pub use document::{NodeInfo, NodeLocator, NodePorts, TopologyDocument, VBucketServerMap};
pub use partition_map::{PartitionEntry, PartitionMap, ServerId};
pub use resolver::Resolver;
pub use server_set::{Server, ServerSet};

use docstore_core::Result;

/// An installed topology snapshot for one bucket.
///
/// Built completely from a document before it is published, then shared
/// read-only through an `Arc`.
#[derive(Debug, Clone)]
pub struct Topology {
    document: TopologyDocument,
    map: Option<PartitionMap>,
    servers: ServerSet,
}

impl Topology {
    /// Builds a snapshot from `document`.
    ///
    /// Partitioned buckets take their servers from the partition table's
    /// server list, consistent-hash buckets from the node list.
    pub fn from_document(document: TopologyDocument) -> Result<Self> {
        let (map, servers) = if document.is_partitioned() {
            let map = PartitionMap::from_document(&document)?;
            let servers = map.server_addresses().iter().cloned().collect();
            (Some(map), servers)
        } else {
            (None, document.node_kv_addresses().into_iter().collect())
        };
        Ok(Self {
            document,
            map,
            servers,
        })
    }

    /// Revision of the underlying document.
    pub fn revision(&self) -> u64 {
        self.document.revision()
    }

    /// Bucket name.
    pub fn bucket(&self) -> &str {
        &self.document.name
    }

    /// The document this snapshot was built from.
    pub fn document(&self) -> &TopologyDocument {
        &self.document
    }

    /// Partition table, absent for consistent-hash buckets.
    pub fn map(&self) -> Option<&PartitionMap> {
        self.map.as_ref()
    }

    /// Addressable servers.
    pub fn servers(&self) -> &ServerSet {
        &self.servers
    }

    /// Resolver over this snapshot, absent for consistent-hash buckets.
    pub fn resolver(&self) -> Option<Resolver<'_>> {
        self.map
            .as_ref()
            .map(|map| Resolver::new(map, &self.servers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitioned_topology_uses_server_list() {
        let json = r#"{"rev": 3, "name": "travel", "nodeLocator": "vbucket",
            "vBucketServerMap": {"serverList": ["a:11210", "b:11210"],
                                 "vBucketMap": [[0, 1], [1, 0]]}}"#;
        let doc = TopologyDocument::from_json(json.as_bytes(), None).unwrap();
        let topology = Topology::from_document(doc).unwrap();

        assert_eq!(topology.revision(), 3);
        assert_eq!(topology.bucket(), "travel");
        assert_eq!(topology.servers().len(), 2);
        assert!(topology.map().is_some());

        let resolver = topology.resolver().unwrap();
        let entry = topology.map().unwrap().entry(1).unwrap();
        assert_eq!(resolver.locate_primary(entry).unwrap().address(), "b:11210");
    }

    #[test]
    fn test_consistent_hash_topology_has_no_resolver() {
        let json = r#"{"rev": 9, "name": "cache", "nodeLocator": "ketama",
            "nodes": [{"hostname": "c:8091", "ports": {"direct": 11210}}]}"#;
        let doc = TopologyDocument::from_json(json.as_bytes(), None).unwrap();
        let topology = Topology::from_document(doc).unwrap();

        assert!(topology.map().is_none());
        assert!(topology.resolver().is_none());
        assert!(topology.servers().get("c:11210").is_some());
    }
}
