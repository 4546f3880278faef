//! Connection records for the multiplexer.
//!
//! Each accepted socket gets one `Connection`, stored in a slab-backed
//! `ConnectionRegistry`. The slab key doubles as the mio token, so a socket
//! can never be tracked twice.

use crate::runtime::buffer::OutboundQueue;
use crate::runtime::handler::ConnectionInfo;
use slab::Slab;
use std::net::SocketAddr;

/// A single client connection.
#[derive(Debug)]
pub struct Connection<S> {
    /// The socket, owned for the connection's whole life.
    pub stream: S,
    peer: SocketAddr,
    /// Bytes waiting for the socket to become writable.
    pub outbound: OutboundQueue,
    pending_close: bool,
}

impl<S> Connection<S> {
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            outbound: OutboundQueue::new(),
            pending_close: false,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Identity handed to message handlers.
    pub fn info(&self, id: usize) -> ConnectionInfo {
        ConnectionInfo {
            id,
            peer: self.peer,
        }
    }

    /// Schedule the connection for teardown.
    ///
    /// Returns `false` if it was already scheduled.
    pub fn mark_closing(&mut self) -> bool {
        !std::mem::replace(&mut self.pending_close, true)
    }

    pub fn is_closing(&self) -> bool {
        self.pending_close
    }
}

/// Registry of active connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations.
pub struct ConnectionRegistry<S> {
    connections: Slab<Connection<S>>,
    max_connections: usize,
}

impl<S> ConnectionRegistry<S> {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Insert a new connection into the registry.
    ///
    /// Hands the connection back if the registry is at capacity.
    pub fn insert(&mut self, conn: Connection<S>) -> Result<usize, Connection<S>> {
        if self.connections.len() >= self.max_connections {
            return Err(conn);
        }
        Ok(self.connections.insert(conn))
    }

    #[cfg(test)]
    pub fn get(&self, id: usize) -> Option<&Connection<S>> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Connection<S>> {
        self.connections.get_mut(id)
    }

    /// Remove a connection from the registry.
    pub fn remove(&mut self, id: usize) -> Option<Connection<S>> {
        self.connections.try_remove(id)
    }

    #[cfg(test)]
    pub fn contains(&self, id: usize) -> bool {
        self.connections.contains(id)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Maximum number of connections allowed.
    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_mark_closing_is_idempotent() {
        let mut conn = Connection::new((), addr(4000));
        assert!(!conn.is_closing());

        assert!(conn.mark_closing());
        assert!(!conn.mark_closing());
        assert!(conn.is_closing());
    }

    #[test]
    fn test_info_carries_peer() {
        let conn = Connection::new((), addr(4001));
        let info = conn.info(7);
        assert_eq!(info.id, 7);
        assert_eq!(info.peer, addr(4001));
    }

    #[test]
    fn test_connection_registry() {
        let mut registry = ConnectionRegistry::new(2);

        let id1 = registry.insert(Connection::new(10, addr(5001))).unwrap();
        let id2 = registry.insert(Connection::new(11, addr(5002))).unwrap();
        assert_ne!(id1, id2);

        // At capacity
        match registry.insert(Connection::new(12, addr(5003))) {
            Err(rejected) => assert_eq!(rejected.stream, 12),
            Ok(id) => panic!("inserted past capacity as {}", id),
        }

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.capacity(), 2);
        assert_eq!(registry.get(id1).unwrap().stream, 10);
        assert_eq!(registry.get(id2).unwrap().peer(), addr(5002));

        assert!(registry.remove(id1).is_some());
        assert!(registry.remove(id1).is_none());
        assert!(!registry.contains(id1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_buffers_are_per_connection() {
        let mut registry = ConnectionRegistry::new(4);
        let a = registry.insert(Connection::new((), addr(6001))).unwrap();
        let b = registry.insert(Connection::new((), addr(6002))).unwrap();

        registry.get_mut(a).unwrap().outbound.push(b"200:a");
        registry.get_mut(b).unwrap().outbound.push(b"200:b");
        registry.get_mut(a).unwrap().outbound.push(b"200:aa");

        assert_eq!(registry.get(a).unwrap().outbound.pending(), b"200:a200:aa");
        assert_eq!(registry.get(b).unwrap().outbound.pending(), b"200:b");
    }
}
