//! Ledger configuration.

use crate::core::miner::Difficulty;

/// What happens to a transaction's value transfer when its contract traps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransferPolicy {
    /// Apply the transfer regardless of the contract outcome.
    #[default]
    Unconditional,
    /// Skip the transfer when the contract trapped.
    RevertOnTrap,
}

/// Whether a transfer may take the sender's balance below zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverdraftPolicy {
    /// Let balances go negative.
    #[default]
    Allow,
    /// Skip (and log) transfers the sender cannot cover.
    Reject,
}

/// Options a [`Ledger`](crate::core::blockchain::Ledger) is built from.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Required leading zero hex digits of every block hash.
    pub difficulty: u32,
    /// Proof-of-work workers; 1 or less selects the sequential search.
    pub mining_threads: usize,
    /// Pool size at which `add_transaction` commits a block.
    pub block_threshold: usize,
    pub transfer_policy: TransferPolicy,
    pub overdraft_policy: OverdraftPolicy,
    /// Initial balances in minor units, credited at chain initialisation.
    pub genesis_allocations: Vec<(String, i64)>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: 2,
            mining_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            block_threshold: 1,
            transfer_policy: TransferPolicy::default(),
            overdraft_policy: OverdraftPolicy::default(),
            genesis_allocations: Vec::new(),
        }
    }
}

impl LedgerConfig {
    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_mining_threads(mut self, threads: usize) -> Self {
        self.mining_threads = threads;
        self
    }

    pub fn with_block_threshold(mut self, threshold: usize) -> Self {
        self.block_threshold = threshold;
        self
    }

    pub fn with_transfer_policy(mut self, policy: TransferPolicy) -> Self {
        self.transfer_policy = policy;
        self
    }

    pub fn with_overdraft_policy(mut self, policy: OverdraftPolicy) -> Self {
        self.overdraft_policy = policy;
        self
    }

    /// Credits `minor` units to `address` at genesis.
    pub fn with_allocation(mut self, address: impl Into<String>, minor: i64) -> Self {
        self.genesis_allocations.push((address.into(), minor));
        self
    }

    /// Validated difficulty.
    pub fn difficulty(&self) -> Result<Difficulty, crate::core::miner::ConsensusError> {
        Difficulty::new(self.difficulty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::miner::ConsensusError;

    #[test]
    fn defaults() {
        let cfg = LedgerConfig::default();
        assert_eq!(cfg.difficulty, 2);
        assert!(cfg.mining_threads >= 1);
        assert_eq!(cfg.block_threshold, 1);
        assert_eq!(cfg.transfer_policy, TransferPolicy::Unconditional);
        assert_eq!(cfg.overdraft_policy, OverdraftPolicy::Allow);
        assert!(cfg.genesis_allocations.is_empty());
    }

    #[test]
    fn builder_sets_fields() {
        let cfg = LedgerConfig::default()
            .with_difficulty(3)
            .with_mining_threads(4)
            .with_block_threshold(2)
            .with_transfer_policy(TransferPolicy::RevertOnTrap)
            .with_overdraft_policy(OverdraftPolicy::Reject)
            .with_allocation("alice", 100);
        assert_eq!(cfg.difficulty().unwrap().get(), 3);
        assert_eq!(cfg.mining_threads, 4);
        assert_eq!(cfg.block_threshold, 2);
        assert_eq!(cfg.transfer_policy, TransferPolicy::RevertOnTrap);
        assert_eq!(cfg.overdraft_policy, OverdraftPolicy::Reject);
        assert_eq!(cfg.genesis_allocations, vec![("alice".to_string(), 100)]);
    }

    #[test]
    fn zero_difficulty_is_rejected() {
        assert_eq!(
            LedgerConfig::default().with_difficulty(0).difficulty(),
            Err(ConsensusError::NonPositiveDifficulty)
        );
    }
}
