//! Immutable partition-to-server table.

use std::fmt;

use docstore_core::{DocstoreError, HashAlgorithm, PartitionIndex, Result};

use super::document::TopologyDocument;

/// Index into the map's server address table.
pub type ServerId = usize;

/// Owners of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    index: PartitionIndex,
    primary: Option<ServerId>,
    replicas: Vec<Option<ServerId>>,
    revision: u64,
}

impl PartitionEntry {
    /// Creates an entry.
    pub fn new(
        index: PartitionIndex,
        primary: Option<ServerId>,
        replicas: Vec<Option<ServerId>>,
        revision: u64,
    ) -> Self {
        Self {
            index,
            primary,
            replicas,
            revision,
        }
    }

    /// Partition index.
    pub fn index(&self) -> PartitionIndex {
        self.index
    }

    /// Primary server, if the partition currently has one.
    pub fn primary(&self) -> Option<ServerId> {
        self.primary
    }

    /// Replica slots in order; each may be empty.
    pub fn replicas(&self) -> &[Option<ServerId>] {
        &self.replicas
    }

    /// Revision of the map this entry belongs to.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns true if at least one replica slot is filled.
    pub fn has_replicas(&self) -> bool {
        self.replicas.iter().any(Option::is_some)
    }
}

impl fmt::Display for PartitionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Partition[index={}, primary={:?}, replicas={:?}, rev={}]",
            self.index, self.primary, self.replicas, self.revision
        )
    }
}

/// Snapshot of a bucket's partition table.
///
/// Never mutated after construction; a topology change builds a new map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMap {
    revision: u64,
    entries: Vec<PartitionEntry>,
    servers: Vec<String>,
    num_replicas: usize,
    algorithm: HashAlgorithm,
}

impl PartitionMap {
    /// Builds the map from a partitioned bucket's topology document.
    ///
    /// The partition count must be a power of two, and every server id must
    /// name an entry of the server list.
    pub fn from_document(document: &TopologyDocument) -> Result<Self> {
        let section = document.vbucket_server_map.as_ref().ok_or_else(|| {
            DocstoreError::Configuration(format!(
                "bucket {} has no partition table",
                document.name
            ))
        })?;

        let count = section.vbucket_map.len();
        if count == 0 || !count.is_power_of_two() || count > usize::from(u16::MAX) {
            return Err(DocstoreError::Configuration(format!(
                "partition count {count} is not a supported power of two"
            )));
        }

        let server_count = section.server_list.len();
        let resolve = |raw: i16, index: usize| -> Result<Option<ServerId>> {
            if raw < 0 {
                return Ok(None);
            }
            let id = raw as usize;
            if id >= server_count {
                return Err(DocstoreError::Configuration(format!(
                    "partition {index} refers to server {id} but only {server_count} are listed"
                )));
            }
            Ok(Some(id))
        };

        let mut entries = Vec::with_capacity(count);
        for (index, row) in section.vbucket_map.iter().enumerate() {
            let primary = match row.first() {
                Some(&raw) => resolve(raw, index)?,
                None => None,
            };
            let replicas = row
                .iter()
                .skip(1)
                .map(|&raw| resolve(raw, index))
                .collect::<Result<Vec<_>>>()?;
            entries.push(PartitionEntry::new(
                index as PartitionIndex,
                primary,
                replicas,
                document.rev,
            ));
        }

        Ok(Self {
            revision: document.rev,
            entries,
            servers: section.server_list.clone(),
            num_replicas: section.num_replicas,
            algorithm: document.hash_algorithm()?,
        })
    }

    /// Revision of the document the map was built from.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of partitions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: a map has at least one partition.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured replica count.
    pub fn num_replicas(&self) -> usize {
        self.num_replicas
    }

    /// Entry for `index`.
    pub fn entry(&self, index: PartitionIndex) -> Option<&PartitionEntry> {
        self.entries.get(usize::from(index))
    }

    /// Address of server `id`.
    pub fn server_address(&self, id: ServerId) -> Option<&str> {
        self.servers.get(id).map(String::as_str)
    }

    /// Server address table, indexed by server id.
    pub fn server_addresses(&self) -> &[String] {
        &self.servers
    }

    /// Partition index of `key`.
    pub fn partition_of(&self, key: &[u8]) -> PartitionIndex {
        let mask = (self.entries.len() - 1) as u32;
        (self.algorithm.hasher().hash(key) & mask) as PartitionIndex
    }

    /// Entry owning `key`.
    pub fn map_key(&self, key: &[u8]) -> &PartitionEntry {
        &self.entries[usize::from(self.partition_of(key))]
    }
}
