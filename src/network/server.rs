//! Node server feeding inbound RPCs from every transport into the ledger.
//!
//! Ledger calls may mine, so they run on the blocking pool.

use crate::core::blockchain::{CommitReport, Ledger, LedgerError};
use crate::network::message::MessageError;
use crate::network::rpc::{DecodedMessageData, Rpc};
use crate::network::transport::Transport;
use crate::utils::log::Logger;
use crate::{info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::{Sender, channel};
use tokio::task::{JoinError, spawn_blocking};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("ledger task failed: {0}")]
    Join(#[from] JoinError),
}

/// What an inbound RPC did to the ledger.
#[derive(Debug)]
pub enum Delivery {
    Transaction,
    Block(CommitReport),
}

/// Configuration options for the server.
pub struct ServerOps {
    /// Transport layers to aggregate for message processing.
    pub transports: Vec<Arc<dyn Transport>>,
    /// Capacity of the merged inbound channel.
    pub channel_capacity: usize,
}

impl Default for ServerOps {
    fn default() -> Self {
        Self {
            transports: Vec::new(),
            channel_capacity: 1024,
        }
    }
}

/// Multiplexes RPC messages from all transports into a single event loop.
pub struct Server {
    options: ServerOps,
    ledger: Arc<Ledger>,
    logger: Arc<Logger>,
}

impl Server {
    pub fn new(options: ServerOps, ledger: Arc<Ledger>) -> Self {
        let logger = ledger.logger().clone();
        Server {
            options,
            ledger,
            logger,
        }
    }

    /// Processes inbound RPCs until `shutdown` resolves or every transport
    /// channel closes.
    pub async fn start(self, shutdown: impl Future<Output = ()> + Send) {
        let (sx, mut rx) = channel::<Rpc>(self.options.channel_capacity.max(1));
        self.init_transports(&sx).await;
        // Only the forwarding tasks keep the channel open from here on.
        drop(sx);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                rpc = rx.recv() => {
                    let Some(rpc) = rpc else { break };
                    let from = rpc.from.clone();
                    match self.handle_rpc(rpc).await {
                        Ok(Delivery::Transaction) => {}
                        Ok(Delivery::Block(report)) => info!(
                            self.logger,
                            "Committed peer block: index={} hash={}",
                            report.index,
                            report.hash
                        ),
                        Err(e) => warn!(self.logger, "Rejected message from {from}: {e}"),
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        info!(self.logger, "Server shut down");
    }

    /// Spawns async tasks to forward messages from each transport to the main channel.
    async fn init_transports(&self, sx: &Sender<Rpc>) {
        for transport in &self.options.transports {
            let tr = transport.clone();
            let sender = sx.clone();
            let logger = self.logger.clone();

            match tr.consume().await {
                Ok(mut rx) => {
                    tokio::spawn(async move {
                        while let Some(rpc) = rx.recv().await {
                            if sender.send(rpc).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => warn!(logger, "Skipping transport {}: {e}", tr.addr()),
            }
        }
    }

    /// Decodes `rpc` and hands it to the ledger.
    pub async fn handle_rpc(&self, rpc: Rpc) -> Result<Delivery, ServerError> {
        let decoded = rpc.decode()?;
        let ledger = self.ledger.clone();

        match decoded.data {
            DecodedMessageData::Transaction(tx) => {
                spawn_blocking(move || ledger.deliver_transaction(tx)).await?;
                Ok(Delivery::Transaction)
            }
            DecodedMessageData::Block(block) => {
                let report = spawn_blocking(move || ledger.deliver_block(block)).await??;
                Ok(Delivery::Block(report))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{LedgerConfig, OverdraftPolicy};
    use crate::network::local_transport::LocalTransport;
    use crate::network::message::Message;
    use crate::network::transport::TransportBroadcaster;
    use crate::utils::test_utils::utils::{test_logger, transfer};
    use std::time::Duration;
    use tokio::runtime::Handle;
    use tokio::sync::oneshot;

    fn ledger() -> Arc<Ledger> {
        let config = LedgerConfig::default()
            .with_difficulty(1)
            .with_mining_threads(1)
            .with_overdraft_policy(OverdraftPolicy::Allow);
        Arc::new(Ledger::new(config, test_logger()).unwrap())
    }

    #[tokio::test]
    async fn handle_rpc_pools_transactions() {
        let ledger = ledger();
        let server = Server::new(ServerOps::default(), ledger.clone());
        let rpc = Rpc::new("peer", Message::transaction(&transfer("a", "b", 1)).to_bytes().unwrap());

        assert!(matches!(server.handle_rpc(rpc).await, Ok(Delivery::Transaction)));
        assert_eq!(ledger.pool_len(), 1);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn handle_rpc_rejects_garbage_and_stale_blocks() {
        let ledger = ledger();
        let server = Server::new(ServerOps::default(), ledger.clone());

        let garbage = Rpc::new("peer", b"{}".to_vec());
        assert!(matches!(server.handle_rpc(garbage).await, Err(ServerError::Message(_))));

        let stale = br#"{"type":"block","data":{"index":7,"timestamp":0,"prevHash":"0","hash":"","nonce":0,"transactions":[]}}"#;
        assert!(matches!(
            server.handle_rpc(Rpc::new("peer", stale.to_vec())).await,
            Err(ServerError::Ledger(LedgerError::UnexpectedBlock { .. }))
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn peers_follow_consecutive_local_commits() {
        let tr_a = LocalTransport::new("A");
        let tr_b = LocalTransport::new("B");
        tr_a.connect(&tr_b);

        let ledger_a = Arc::new(
            Arc::into_inner(ledger())
                .unwrap()
                .with_broadcaster(Arc::new(TransportBroadcaster::new(
                    tr_a.clone(),
                    test_logger(),
                    &Handle::current(),
                ))),
        );
        let ledger_b = ledger();
        assert_eq!(ledger_a.tip_hash(), ledger_b.tip_hash());

        let server = Server::new(
            ServerOps {
                transports: vec![tr_b.clone()],
                ..ServerOps::default()
            },
            ledger_b.clone(),
        );
        let (stop, stopped) = oneshot::channel::<()>();
        let running = tokio::spawn(server.start(async {
            let _ = stopped.await;
        }));

        let committer = ledger_a.clone();
        spawn_blocking(move || {
            committer.add_transaction(transfer("alice", "bob", 250))?;
            // Next second, so the two blocks carry different timestamps.
            std::thread::sleep(Duration::from_millis(1100));
            committer.add_transaction(transfer("bob", "carol", 100))
        })
        .await
        .unwrap()
        .unwrap();

        tokio::time::timeout(Duration::from_secs(10), async {
            while ledger_b.len() < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert!(ledger_b.is_chain_valid());
        assert_eq!(ledger_b.pool_len(), 0);
        assert_eq!(ledger_b.balance("bob"), 150);
        assert_eq!(ledger_b.balance("carol"), 100);
        assert_eq!(ledger_b.tip_hash(), ledger_a.tip_hash());
        assert_eq!(ledger_b.block(1), ledger_a.block(1));

        stop.send(()).unwrap();
        running.await.unwrap();
    }
}
