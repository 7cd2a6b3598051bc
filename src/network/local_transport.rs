//! In-memory transport implementation for local testing and development.
//!
//! Enables direct message passing between nodes without network I/O,
//! ideal for unit tests and single-process simulations.

use crate::network::rpc::Rpc;
use crate::network::transport::{BoxFuture, Transport, TransportError};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{Receiver, Sender, channel};

/// In-memory transport using async channels for local message passing.
///
/// Maintains a peer registry and routes messages directly through memory.
pub struct LocalTransport {
    peers: DashMap<String, Arc<LocalTransport>>,
    tx: Sender<Rpc>,
    rx: Arc<Mutex<Option<Receiver<Rpc>>>>,
    address: String,
}

impl LocalTransport {
    /// Creates a new LocalTransport instance with the given address.
    pub fn new(address: &str) -> Arc<LocalTransport> {
        let (tx, rx) = channel(1024);

        Arc::new(LocalTransport {
            address: address.to_string(),
            peers: DashMap::new(),
            tx,
            rx: Arc::new(Mutex::new(Some(rx))),
        })
    }

    /// Adds both transports to each other's routing tables.
    pub fn connect(self: &Arc<LocalTransport>, other: &Arc<LocalTransport>) {
        self.peers.insert(other.addr(), other.clone());
        other.peers.insert(self.addr(), self.clone());
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

impl Transport for LocalTransport {
    fn consume(&self) -> BoxFuture<'static, Result<Receiver<Rpc>, TransportError>> {
        let rx = self.rx.clone();
        let address = self.address.clone();

        Box::pin(async move {
            let mut guard = rx.lock().await;
            guard.take().ok_or(TransportError::ReceiverTaken(address))
        })
    }

    fn send_message(&self, to: String, payload: Bytes) -> BoxFuture<'static, Result<(), TransportError>> {
        let peer = self.peers.get(to.trim()).map(|r| r.value().clone());
        let address = self.address.clone();

        Box::pin(async move {
            let peer = peer.ok_or_else(|| TransportError::PeerNotFound(to.clone()))?;
            peer.tx
                .send(Rpc::new(address, payload))
                .await
                .map_err(|_| TransportError::SendFailed(to))
        })
    }

    fn broadcast(&self, data: Bytes) -> BoxFuture<'static, Result<(), TransportError>> {
        let peers: Vec<Arc<LocalTransport>> = self.peers.iter().map(|p| p.value().clone()).collect();
        let address = self.address.clone();

        Box::pin(async move {
            for peer in peers {
                peer.tx
                    .send(Rpc::new(address.clone(), data.clone()))
                    .await
                    .map_err(|_| TransportError::BroadcastFailed(peer.addr()))?;
            }
            Ok(())
        })
    }

    fn addr(&self) -> String {
        self.address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect() {
        let tr_a = LocalTransport::new("A");
        let tr_b = LocalTransport::new("B");

        tr_a.connect(&tr_b);

        assert!(tr_a.peers.contains_key("B"));
        assert!(tr_b.peers.contains_key("A"));
        assert_eq!(tr_a.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_send_message() {
        let tr_a = LocalTransport::new("A");
        let tr_b = LocalTransport::new("B");
        tr_a.connect(&tr_b);

        let mut rx = tr_b.consume().await.unwrap();
        tr_a.send_message("B".into(), Bytes::from_static(b"hello")).await.unwrap();

        let rpc = rx.recv().await.unwrap();
        assert_eq!(rpc.from, "A");
        assert_eq!(&rpc.payload[..], b"hello");
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer() {
        let tr_a = LocalTransport::new("A");
        assert!(matches!(
            tr_a.send_message("Z".into(), Bytes::new()).await,
            Err(TransportError::PeerNotFound(addr)) if addr == "Z"
        ));
    }

    #[tokio::test]
    async fn test_consume_only_once() {
        let tr_a = LocalTransport::new("A");
        assert!(tr_a.consume().await.is_ok());
        assert!(matches!(tr_a.consume().await, Err(TransportError::ReceiverTaken(_))));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_peers() {
        let tr_a = LocalTransport::new("A");
        let tr_b = LocalTransport::new("B");
        let tr_c = LocalTransport::new("C");
        tr_a.connect(&tr_b);
        tr_a.connect(&tr_c);

        let mut rx_b = tr_b.consume().await.unwrap();
        let mut rx_c = tr_c.consume().await.unwrap();
        tr_a.broadcast(Bytes::from_static(b"block")).await.unwrap();

        assert_eq!(&rx_b.recv().await.unwrap().payload[..], b"block");
        assert_eq!(&rx_c.recv().await.unwrap().payload[..], b"block");
    }
}
