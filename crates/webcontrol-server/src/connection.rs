//! Connection bookkeeping shared by the socket handlers, the dispatcher and
//! download subscribers.
//!
//! The registry only holds outbound channel endpoints.  A connection's
//! writer branch owns the receiving side, so frames queued for one client
//! reach it in order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use webcontrol_proto::protocol::Response;

pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Where a command's responses go.  Cheap to clone; sending after the
/// connection closed is silently dropped.
#[derive(Debug, Clone)]
pub struct Reply {
    conn: ConnectionId,
    tx: mpsc::UnboundedSender<Response>,
}

impl Reply {
    pub fn new(conn: ConnectionId, tx: mpsc::UnboundedSender<Response>) -> Self {
        Self { conn, tx }
    }

    pub fn connection(&self) -> ConnectionId {
        self.conn
    }

    /// Returns `false` when the connection is already gone.
    pub fn send(&self, response: Response) -> bool {
        if self.tx.send(response).is_err() {
            debug!("Connection {} gone, reply dropped", self.conn);
            return false;
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct ConnectionHandle {
    state: ConnectionState,
    outbox: mpsc::UnboundedSender<Response>,
}

pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate an id and outbound queue for a new connection, in state
    /// `Connecting`.
    pub fn register(&self) -> (Reply, mpsc::UnboundedReceiver<Response>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.write().insert(
            id,
            ConnectionHandle {
                state: ConnectionState::Connecting,
                outbox: tx.clone(),
            },
        );
        (Reply::new(id, tx), rx)
    }

    pub fn mark_open(&self, id: ConnectionId) {
        if let Some(handle) = self.connections.write().get_mut(&id) {
            handle.state = ConnectionState::Open;
        }
    }

    /// Unknown ids report `Closed`.
    pub fn state(&self, id: ConnectionId) -> ConnectionState {
        self.connections
            .read()
            .get(&id)
            .map(|h| h.state)
            .unwrap_or(ConnectionState::Closed)
    }

    /// Remove a connection.  Returns whether it was still registered, so a
    /// second call is a harmless `false`.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        self.connections.write().remove(&id).is_some()
    }

    /// Queue `response` on every open connection; returns how many took it.
    pub fn broadcast(&self, response: &Response) -> usize {
        self.connections
            .read()
            .values()
            .filter(|h| h.state == ConnectionState::Open)
            .filter(|h| h.outbox.send(response.clone()).is_ok())
            .count()
    }

    pub fn open_count(&self) -> usize {
        self.connections
            .read()
            .values()
            .filter(|h| h.state == ConnectionState::Open)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let registry = ConnectionRegistry::new();
        let (reply, _rx) = registry.register();
        let id = reply.connection();

        assert_eq!(registry.state(id), ConnectionState::Connecting);
        assert_eq!(registry.open_count(), 0);

        registry.mark_open(id);
        assert_eq!(registry.state(id), ConnectionState::Open);
        assert_eq!(registry.open_count(), 1);

        assert!(registry.deregister(id));
        assert!(!registry.deregister(id));
        assert_eq!(registry.state(id), ConnectionState::Closed);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_broadcast_reaches_open_connections_only() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = registry.register();
        let (_b, mut rx_b) = registry.register();
        registry.mark_open(a.connection());

        let msg = Response::VideoList { files: vec![] };
        assert_eq!(registry.broadcast(&msg), 1);
        assert_eq!(rx_a.try_recv().unwrap(), msg);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_reply_after_close_is_dropped() {
        let registry = ConnectionRegistry::new();
        let (reply, rx) = registry.register();
        drop(rx);
        assert!(reply.is_closed());
        assert!(!reply.send(Response::GlbList { files: vec![] }));
    }
}
