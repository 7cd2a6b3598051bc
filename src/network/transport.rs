//! Core transport abstractions for network communication.
//!
//! [`Transport`] moves raw payloads between nodes. [`Broadcaster`] is the
//! synchronous hook the ledger calls after a local commit;
//! [`TransportBroadcaster`] bridges the two.

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::network::message::Message;
use crate::network::rpc::Rpc;
use crate::utils::log::Logger;
use crate::{error, warn};
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{Receiver, UnboundedSender, unbounded_channel};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Peer with the specified address was not found.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// Failed to send message to the specified address.
    #[error("failed to send message to {0}")]
    SendFailed(String),

    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    /// `consume` was already called on this transport.
    #[error("receiver of {0} already taken")]
    ReceiverTaken(String),
}

/// Async transport layer for network communication between nodes.
pub trait Transport: Send + Sync {
    /// Hands out the receiver for incoming RPCs. Only the first call succeeds.
    fn consume(&self) -> BoxFuture<'static, Result<Receiver<Rpc>, TransportError>>;

    /// Sends a message to a specific address.
    ///
    /// # Errors
    /// Returns `TransportError::PeerNotFound` if the peer is not in the routing table.
    /// Returns `TransportError::SendFailed` if the message cannot be sent.
    fn send_message(&self, to: String, payload: Bytes) -> BoxFuture<'static, Result<(), TransportError>>;

    /// Sends `data` to every connected peer.
    fn broadcast(&self, data: Bytes) -> BoxFuture<'static, Result<(), TransportError>>;

    /// Returns the local address of this transport.
    fn addr(&self) -> String;
}

/// Fire-and-forget notification of locally committed activity.
pub trait Broadcaster: Send + Sync {
    fn broadcast_transaction(&self, tx: &Transaction);
    fn broadcast_block(&self, block: &Block);
}

/// [`Broadcaster`] that encodes messages and sends them over a [`Transport`].
///
/// Messages are queued and sent by one background task, so peers see them
/// in the order they were broadcast.
pub struct TransportBroadcaster {
    queue: UnboundedSender<Bytes>,
    logger: Arc<Logger>,
}

impl TransportBroadcaster {
    /// Spawns the sending task on `handle`.
    pub fn new(transport: Arc<dyn Transport>, logger: Arc<Logger>, handle: &Handle) -> Self {
        let (queue, mut rx) = unbounded_channel::<Bytes>();
        let task_logger = logger.clone();
        handle.spawn(async move {
            while let Some(data) = rx.recv().await {
                if let Err(e) = transport.broadcast(data).await {
                    warn!(task_logger, "Broadcast from {} failed: {e}", transport.addr());
                }
            }
        });
        Self { queue, logger }
    }

    fn enqueue(&self, message: Message) {
        match message.to_bytes() {
            Ok(data) => {
                if self.queue.send(data).is_err() {
                    warn!(self.logger, "Broadcast task has stopped, dropping message");
                }
            }
            Err(e) => error!(self.logger, "Failed to encode message: {e}"),
        }
    }
}

impl Broadcaster for TransportBroadcaster {
    fn broadcast_transaction(&self, tx: &Transaction) {
        self.enqueue(Message::transaction(tx));
    }

    fn broadcast_block(&self, block: &Block) {
        self.enqueue(Message::block(block));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::local_transport::LocalTransport;
    use crate::utils::test_utils::utils::{test_logger, transfer};

    #[tokio::test]
    async fn broadcaster_delivers_in_order() {
        let a = LocalTransport::new("A");
        let b = LocalTransport::new("B");
        a.connect(&b);
        let mut rx = b.consume().await.unwrap();

        let broadcaster = TransportBroadcaster::new(a.clone(), test_logger(), &Handle::current());
        broadcaster.broadcast_transaction(&transfer("x", "y", 1));
        broadcaster.broadcast_transaction(&transfer("x", "y", 2));

        for minor in [1, 2] {
            let rpc = rx.recv().await.unwrap();
            assert_eq!(rpc.from, "A");
            match Message::from_bytes(&rpc.payload).unwrap() {
                Message::Transaction(p) => assert_eq!(p.amount.minor(), minor),
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
