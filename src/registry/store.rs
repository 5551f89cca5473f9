//! Connection registry implementation

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::connection::{Connection, ConnectionId};

/// Concurrency-safe set of live connections
///
/// None of the operations fail. Removal is tolerant of connections that are
/// already gone, since a read loop and a failed broadcast may race to remove
/// the same connection.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection
    ///
    /// Returns `false` if it was already registered.
    pub async fn add(&self, conn: Arc<Connection>) -> bool {
        let mut connections = self.connections.write().await;

        if connections.contains_key(&conn.id()) {
            return false;
        }

        tracing::debug!(
            conn = %conn.id(),
            peer = conn.remote_identity(),
            registered = connections.len() + 1,
            "Connection registered"
        );
        connections.insert(conn.id(), conn);
        true
    }

    /// Remove a connection if present
    ///
    /// Returns the removed handle, or `None` if it was not registered.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(&id);

        if removed.is_some() {
            tracing::debug!(
                conn = %id,
                registered = connections.len(),
                "Connection deregistered"
            );
        }

        removed
    }

    /// Point-in-time copy of the registered connections
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Ids of the registered connections, in ascending order
    pub async fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Check whether a connection is registered
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Number of registered connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether no connections are registered
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
