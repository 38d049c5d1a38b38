//! The set of addressable key-value servers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::seq::SliceRandom;

/// A key-value server, identified by its `host:port` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Server {
    address: String,
}

impl Server {
    /// Creates a server for `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// Returns the `host:port` address.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Live servers keyed by address, in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct ServerSet {
    by_address: HashMap<String, Arc<Server>>,
    ordered: Vec<Arc<Server>>,
}

impl ServerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a server unless one with the same address is present.
    pub fn insert(&mut self, server: Server) -> Arc<Server> {
        if let Some(existing) = self.by_address.get(server.address()) {
            return existing.clone();
        }
        let server = Arc::new(server);
        self.by_address
            .insert(server.address().to_string(), server.clone());
        self.ordered.push(server.clone());
        server
    }

    /// Removes the server at `address`.
    pub fn remove(&mut self, address: &str) -> Option<Arc<Server>> {
        let removed = self.by_address.remove(address)?;
        self.ordered.retain(|s| s.address() != address);
        Some(removed)
    }

    /// Looks a server up by address.
    pub fn get(&self, address: &str) -> Option<&Arc<Server>> {
        self.by_address.get(address)
    }

    /// Returns a uniformly random server, `None` only if the set is empty.
    pub fn random(&self) -> Option<&Arc<Server>> {
        self.ordered.choose(&mut rand::thread_rng())
    }

    /// Number of servers.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Iterates servers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Server>> {
        self.ordered.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for ServerSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = ServerSet::new();
        for address in iter {
            set.insert(Server::new(address));
        }
        set
    }
}
