//! The ledger: chain of mined blocks, pending pool and account state.
//!
//! Every mutation and every snapshot goes through one lock, so block commits
//! are serialized and readers never observe a half-applied block.

use crate::compiler::errors::CompileError;
use crate::core::account::{AccountError, AccountState};
use crate::core::block::{Block, BlockError, BlockTemplate};
use crate::core::config::{LedgerConfig, TransferPolicy};
use crate::core::miner::{self, ConsensusError, Difficulty};
use crate::core::receipt::{ExecutionStatus, Receipt, TransferOutcome};
use crate::core::transaction::{Transaction, TransactionError};
use crate::network::transport::Broadcaster;
use crate::types::hash::Hash;
use crate::utils::log::Logger;
use crate::virtual_machine::vm::{self, context::ExecutionContext};
use crate::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainIntegrityError {
    #[error("chain has no blocks")]
    EmptyChain,
    #[error("block {index} does not link to its predecessor")]
    BrokenLink { index: usize },
    #[error("block {index} hash does not match its contents")]
    HashMismatch { index: usize },
    #[error("block {index} hash does not meet the difficulty target")]
    InsufficientWork { index: usize },
    #[error("block at position {index} carries the wrong index")]
    IndexMismatch { index: usize },
}

/// A transaction left out of a block because its source did not compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedTransaction {
    /// Position in the submitted batch.
    pub batch_index: usize,
    pub transaction: Transaction,
    pub error: CompileError,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Integrity(#[from] ChainIntegrityError),
    #[error("none of the {} transactions in the batch compiled", .0.len())]
    NothingToCommit(Vec<DroppedTransaction>),
    #[error("block {index} (prevHash {prev_hash}) does not extend the tip at index {expected_index}")]
    UnexpectedBlock {
        index: u64,
        prev_hash: String,
        expected_index: u64,
    },
    #[error("peer block {index} carries a contract that does not compile: {error}")]
    UncompilablePeerBlock { index: u64, error: CompileError },
}

/// A block announced by a peer, as it arrived on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerBlock {
    pub index: u64,
    pub timestamp: i64,
    pub prev_hash: String,
    pub hash: String,
    pub nonce: u64,
    pub transactions: Vec<Transaction>,
}

/// Summary of one committed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub index: u64,
    pub hash: Hash,
    pub nonce: u64,
    /// Transactions that made it into the block.
    pub accepted: usize,
    pub dropped: Vec<DroppedTransaction>,
    pub receipts: Vec<Receipt>,
}

/// Serializable view of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub index: u64,
    pub timestamp: i64,
    pub prev_hash: String,
    pub hash: Hash,
    pub nonce: u64,
    pub transactions: Vec<Transaction>,
    pub receipts: Vec<Receipt>,
    pub events: Vec<String>,
}

impl From<&Block> for BlockSummary {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index(),
            timestamp: block.timestamp(),
            prev_hash: block.prev_hash_string(),
            hash: block.hash(),
            nonce: block.nonce(),
            transactions: block.transactions().to_vec(),
            receipts: block.receipts().to_vec(),
            events: block.events().into_iter().map(str::to_string).collect(),
        }
    }
}

/// Consistent snapshot of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub length: usize,
    pub difficulty: u32,
    pub tip_hash: Hash,
    pub blocks: Vec<BlockSummary>,
}

impl fmt::Display for ChainInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chain size={}, last hash={}", self.length, self.tip_hash)
    }
}

struct Inner {
    chain: Vec<Block>,
    state: AccountState,
    pool: Vec<Transaction>,
}

pub struct Ledger {
    difficulty: Difficulty,
    config: LedgerConfig,
    logger: Arc<Logger>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
    inner: Mutex<Inner>,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Whether `pooled` and `delivered` describe the same transfer, ignoring
/// compiled code.
fn same_transfer(pooled: &Transaction, delivered: &Transaction) -> bool {
    pooled.sender() == delivered.sender()
        && pooled.recipient() == delivered.recipient()
        && pooled.amount() == delivered.amount()
        && pooled.signature() == delivered.signature()
        && pooled.gas_limit() == delivered.gas_limit()
}

impl Ledger {
    /// Mines the genesis block and credits the configured allocations.
    pub fn new(config: LedgerConfig, logger: Arc<Logger>) -> Result<Self, LedgerError> {
        let difficulty = config.difficulty()?;
        let state = AccountState::with_allocations(&config.genesis_allocations)?;
        let genesis = miner::mine_parallel(BlockTemplate::genesis(), difficulty, config.mining_threads)?;

        info!(
            logger,
            "Genesis block mined: hash={} nonce={} difficulty={}",
            genesis.hash(),
            genesis.nonce(),
            difficulty.get()
        );

        Ok(Self {
            difficulty,
            config,
            logger,
            broadcaster: None,
            inner: Mutex::new(Inner {
                chain: vec![genesis],
                state,
                pool: Vec::new(),
            }),
        })
    }

    /// Installs the hook told about locally committed transactions and blocks.
    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Pools `tx`, broadcasts it, and commits the pool once it reaches the
    /// block threshold.
    pub fn add_transaction(&self, tx: Transaction) -> Result<Option<CommitReport>, LedgerError> {
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.broadcast_transaction(&tx);
        }

        let committed = {
            let mut inner = self.lock();
            inner.pool.push(tx);
            if inner.pool.len() < self.config.block_threshold.max(1) {
                return Ok(None);
            }
            let batch = std::mem::take(&mut inner.pool);
            self.commit(&mut inner, batch)?
        };

        let (report, block) = committed;
        self.announce(&block);
        Ok(Some(report))
    }

    /// Compiles, mines and executes `transactions` as the next block.
    ///
    /// Transactions whose source fails to compile are dropped from the block
    /// and listed in the report; the rest are still committed.
    pub fn add_block(&self, transactions: Vec<Transaction>) -> Result<CommitReport, LedgerError> {
        let (report, block) = {
            let mut inner = self.lock();
            self.commit(&mut inner, transactions)?
        };
        self.announce(&block);
        Ok(report)
    }

    fn announce(&self, block: &Block) {
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.broadcast_block(block);
        }
    }

    fn commit(
        &self,
        inner: &mut Inner,
        batch: Vec<Transaction>,
    ) -> Result<(CommitReport, Block), LedgerError> {
        if batch.is_empty() {
            return Err(ConsensusError::EmptyBatch.into());
        }

        let mut accepted = Vec::with_capacity(batch.len());
        let mut dropped = Vec::new();
        for (batch_index, tx) in batch.into_iter().enumerate() {
            match tx.compile() {
                Ok(compiled) => accepted.push(compiled),
                Err(error) => {
                    warn!(
                        self.logger,
                        "Dropping transaction {batch_index} from {}: {error}",
                        tx.sender()
                    );
                    dropped.push(DroppedTransaction {
                        batch_index,
                        transaction: tx,
                        error,
                    });
                }
            }
        }
        if accepted.is_empty() {
            return Err(LedgerError::NothingToCommit(dropped));
        }

        let (index, previous) = match inner.chain.last() {
            Some(tip) => (inner.chain.len() as u64, tip.hash()),
            None => return Err(ChainIntegrityError::EmptyChain.into()),
        };
        let template = BlockTemplate::regular(index, now_secs(), previous, accepted)?;
        let block = miner::mine_parallel(template, self.difficulty, self.config.mining_threads)?;
        Ok(self.append(inner, block, dropped))
    }

    /// Executes a sealed block against the account state and appends it.
    fn append(&self, inner: &mut Inner, block: Block, dropped: Vec<DroppedTransaction>) -> (CommitReport, Block) {
        let receipts = self.execute_block(&mut inner.state, &block);
        let block = block.with_receipts(receipts.clone());

        info!(
            self.logger,
            "Block committed: index={} hash={} nonce={} transactions={}",
            block.index(),
            block.hash(),
            block.nonce(),
            block.transactions().len()
        );

        let report = CommitReport {
            index: block.index(),
            hash: block.hash(),
            nonce: block.nonce(),
            accepted: block.transactions().len(),
            dropped,
            receipts,
        };
        inner.chain.push(block.clone());
        (report, block)
    }

    /// Runs each contract, then applies each value transfer, in block order.
    fn execute_block(&self, state: &mut AccountState, block: &Block) -> Vec<Receipt> {
        let mut receipts = Vec::with_capacity(block.transactions().len());
        let mut cumulative_gas_used = 0u64;

        for (tx_index, tx) in block.transactions().iter().enumerate() {
            let execution = match tx.contract_code() {
                None => ExecutionStatus::NoContract,
                Some(code) => {
                    let ctx = ExecutionContext {
                        sender: tx.sender().to_string(),
                        tx_value: tx.amount().minor(),
                        balance: state.balance(tx.sender()),
                        timestamp: block.timestamp(),
                        block_height: block.index() as i64,
                    };
                    match vm::execute(code, &ctx, tx.gas_limit(), state) {
                        Ok(outcome) => ExecutionStatus::Success {
                            gas_used: outcome.gas_used,
                            events: outcome.events,
                        },
                        Err(trap) => {
                            warn!(
                                self.logger,
                                "Contract in block {} transaction {tx_index} trapped: {trap}",
                                block.index()
                            );
                            ExecutionStatus::Trapped {
                                gas_used: trap.gas_used,
                                reason: trap.reason.to_string(),
                            }
                        }
                    }
                }
            };

            let reverted = self.config.transfer_policy == TransferPolicy::RevertOnTrap
                && matches!(execution, ExecutionStatus::Trapped { .. });
            let transfer = if reverted {
                TransferOutcome::RevertedByTrap
            } else {
                self.apply_transfer(state, tx, tx_index)
            };

            let receipt = Receipt {
                tx_index,
                execution,
                transfer,
                cumulative_gas_used: 0,
            };
            cumulative_gas_used = cumulative_gas_used.saturating_add(receipt.gas_used());
            receipts.push(Receipt {
                cumulative_gas_used,
                ..receipt
            });
        }
        receipts
    }

    fn apply_transfer(&self, state: &mut AccountState, tx: &Transaction, tx_index: usize) -> TransferOutcome {
        match state.transfer(tx.sender(), tx.recipient(), tx.amount(), self.config.overdraft_policy) {
            Ok(()) => TransferOutcome::Applied,
            Err(e) => {
                warn!(self.logger, "Skipping transfer of transaction {tx_index}: {e}");
                match e {
                    AccountError::InsufficientFunds { .. } => TransferOutcome::InsufficientFunds,
                    AccountError::Overflow { .. } => TransferOutcome::Overflow,
                }
            }
        }
    }

    /// Walks the chain checking links, hashes, work and indices.
    pub fn validate_chain(&self) -> Result<(), ChainIntegrityError> {
        let inner = self.lock();
        let result = Self::check_blocks(&inner.chain, self.difficulty);
        if let Err(e) = &result {
            warn!(self.logger, "Chain validation failed: {e}");
        }
        result
    }

    fn check_blocks(chain: &[Block], difficulty: Difficulty) -> Result<(), ChainIntegrityError> {
        if chain.is_empty() {
            return Err(ChainIntegrityError::EmptyChain);
        }
        for (index, block) in chain.iter().enumerate() {
            if block.index() != index as u64 {
                return Err(ChainIntegrityError::IndexMismatch { index });
            }
            let expected_prev = index.checked_sub(1).map(|i| chain[i].hash());
            if block.previous_block() != expected_prev {
                return Err(ChainIntegrityError::BrokenLink { index });
            }
            if block.compute_hash() != block.hash() {
                return Err(ChainIntegrityError::HashMismatch { index });
            }
            if !difficulty.is_met_by(&block.hash()) {
                return Err(ChainIntegrityError::InsufficientWork { index });
            }
        }
        Ok(())
    }

    pub fn is_chain_valid(&self) -> bool {
        self.validate_chain().is_ok()
    }

    pub fn chain_info(&self) -> ChainInfo {
        let inner = self.lock();
        ChainInfo {
            length: inner.chain.len(),
            difficulty: self.difficulty.get(),
            tip_hash: inner.chain.last().map(Block::hash).unwrap_or_default(),
            blocks: inner.chain.iter().map(BlockSummary::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().chain.is_empty()
    }

    pub fn tip_hash(&self) -> Hash {
        self.lock().chain.last().map(Block::hash).unwrap_or_default()
    }

    pub fn block(&self, index: usize) -> Option<Block> {
        self.lock().chain.get(index).cloned()
    }

    pub fn pool_len(&self) -> usize {
        self.lock().pool.len()
    }

    pub fn balance(&self, address: &str) -> i64 {
        self.lock().state.balance(address)
    }

    pub fn accounts(&self) -> BTreeMap<String, i64> {
        self.lock().state.snapshot()
    }

    /// Pools a transaction received from a peer. It is neither rebroadcast
    /// nor committed here; the originating node commits it.
    pub fn deliver_transaction(&self, tx: Transaction) {
        let mut inner = self.lock();
        inner.pool.push(tx);
    }

    /// Appends a block received from a peer, without rebroadcasting it.
    ///
    /// The block must extend the local tip, and its announced hash must match
    /// the hash recomputed from its index, timestamp, transactions, parent and
    /// nonce while meeting the local difficulty. Nothing is re-mined, so every
    /// node holds the same block. Matching pooled transactions are removed
    /// from the pool.
    pub fn deliver_block(&self, block: PeerBlock) -> Result<CommitReport, LedgerError> {
        let mut inner = self.lock();
        let expected_index = inner.chain.len() as u64;
        let tip = match inner.chain.last() {
            Some(tip) => tip.hash(),
            None => return Err(ChainIntegrityError::EmptyChain.into()),
        };
        if block.index != expected_index || block.prev_hash != tip.to_hex() {
            return Err(LedgerError::UnexpectedBlock {
                index: block.index,
                prev_hash: block.prev_hash,
                expected_index,
            });
        }

        let mut transactions = Vec::with_capacity(block.transactions.len());
        for tx in block.transactions {
            match tx.compile() {
                Ok(compiled) => transactions.push(compiled),
                Err(error) => {
                    return Err(LedgerError::UncompilablePeerBlock {
                        index: block.index,
                        error,
                    });
                }
            }
        }

        let template = BlockTemplate::regular(block.index, block.timestamp, tip, transactions)?;
        let hash = template.hash_with_nonce(block.nonce);
        let position = block.index as usize;
        if hash.to_hex() != block.hash {
            return Err(ChainIntegrityError::HashMismatch { index: position }.into());
        }
        if !self.difficulty.is_met_by(&hash) {
            return Err(ChainIntegrityError::InsufficientWork { index: position }.into());
        }

        inner
            .pool
            .retain(|pooled| !template.transactions().iter().any(|t| same_transfer(pooled, t)));
        let (report, _) = self.append(&mut inner, template.seal(block.nonce, hash), Vec::new());
        Ok(report)
    }
}
