//! Test utilities shared across modules.

#[cfg(test)]
pub mod utils {
    use crate::core::block::Block;
    use crate::core::blockchain::Ledger;
    use crate::core::config::LedgerConfig;
    use crate::core::transaction::Transaction;
    use crate::network::transport::Broadcaster;
    use crate::types::amount::Amount;
    use crate::utils::log::Logger;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub fn test_logger() -> Arc<Logger> {
        Arc::new(Logger::new("test"))
    }

    /// Valid transfer of `minor` units with a generous gas limit.
    pub fn transfer(from: &str, to: &str, minor: i64) -> Transaction {
        Transaction::new(from, to, Amount::from_minor(minor), "sig", 10_000).unwrap()
    }

    /// Difficulty-2 ledger mining on a single thread.
    pub fn test_ledger() -> Ledger {
        Ledger::new(
            LedgerConfig::default().with_difficulty(2).with_mining_threads(1),
            test_logger(),
        )
        .unwrap()
    }

    /// Counts broadcast calls.
    #[derive(Default)]
    pub struct RecordingBroadcaster {
        transactions: AtomicUsize,
        blocks: AtomicUsize,
    }

    impl RecordingBroadcaster {
        pub fn transactions(&self) -> usize {
            self.transactions.load(Ordering::SeqCst)
        }

        pub fn blocks(&self) -> usize {
            self.blocks.load(Ordering::SeqCst)
        }
    }

    impl Broadcaster for RecordingBroadcaster {
        fn broadcast_transaction(&self, _: &Transaction) {
            self.transactions.fetch_add(1, Ordering::SeqCst);
        }

        fn broadcast_block(&self, _: &Block) {
            self.blocks.fetch_add(1, Ordering::SeqCst);
        }
    }
}
