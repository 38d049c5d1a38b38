//! Partition owner resolution with fallbacks.
//!
//! Resolution never fails while servers exist: when no authoritative owner
//! can be found a random server is returned, and its "not my partition"
//! rejection later triggers a topology refresh.

use std::sync::Arc;

use rand::seq::IteratorRandom;

use super::partition_map::{PartitionEntry, PartitionMap, ServerId};
use super::server_set::{Server, ServerSet};

/// Resolves partition entries against a map and the live server set.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    map: &'a PartitionMap,
    servers: &'a ServerSet,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over `map` and `servers`.
    pub fn new(map: &'a PartitionMap, servers: &'a ServerSet) -> Self {
        Self { map, servers }
    }

    /// Picks the server to send a primary operation to.
    ///
    /// Order: the primary; else a random filled replica slot; else a random
    /// server. Returns `None` only if the server set is empty.
    pub fn locate_primary(&self, entry: &PartitionEntry) -> Option<Arc<Server>> {
        if let Some(server) = entry.primary().and_then(|id| self.server(id)) {
            return Some(server);
        }

        let replica = entry
            .replicas()
            .iter()
            .flatten()
            .choose(&mut rand::thread_rng())
            .and_then(|&id| self.server(id));
        if let Some(server) = replica {
            tracing::debug!(
                partition = entry.index(),
                server = %server,
                "no reachable primary, routing to replica"
            );
            return Some(server);
        }

        let fallback = self.servers.random().cloned();
        if let Some(server) = &fallback {
            tracing::debug!(
                partition = entry.index(),
                server = %server,
                "no owner resolvable, routing to random server"
            );
        }
        fallback
    }

    /// Server holding replica slot `index`, if the slot is filled and the server is live.
    pub fn locate_replica(&self, entry: &PartitionEntry, index: usize) -> Option<Arc<Server>> {
        let id = (*entry.replicas().get(index)?)?;
        self.server(id)
    }

    /// Returns true if at least one replica slot of `entry` is filled.
    pub fn has_replicas(&self, entry: &PartitionEntry) -> bool {
        entry.has_replicas()
    }

    fn server(&self, id: ServerId) -> Option<Arc<Server>> {
        let address = self.map.server_address(id)?;
        self.servers.get(address).cloned()
    }
}
