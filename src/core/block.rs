//! Blocks and unmined block templates.
//!
//! A block's hash covers `"{index}:{timestamp}:{txs}:{prev}:{nonce}"`, where
//! `{txs}` joins each transaction's preimage form with `;` and `{prev}` is
//! `"0"` for genesis. Receipts sit beside the block and are not hashed.

use crate::core::receipt::Receipt;
use crate::core::transaction::Transaction;
use crate::types::hash::{Hash, HashBuilder};
use std::fmt;

/// Fixed genesis timestamp, so equal difficulties yield equal genesis hashes.
pub const GENESIS_TIMESTAMP: i64 = 21_062_025;
/// Previous-hash rendering of the genesis block.
pub const GENESIS_PREV_HASH: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error("regular block {index} must carry at least one transaction")]
    NoTransactions { index: u64 },
    #[error("regular block cannot take index 0")]
    ZeroIndex,
}

/// Genesis vs regular discriminant. Only regular blocks link to a parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Genesis,
    Regular { previous_block: Hash },
}

/// Hashed block metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub kind: BlockKind,
    /// Position in the chain (genesis = 0).
    pub index: u64,
    /// Seconds since the Unix epoch; [`GENESIS_TIMESTAMP`] for genesis.
    pub timestamp: i64,
}

impl Header {
    pub fn previous_block(&self) -> Option<Hash> {
        match self.kind {
            BlockKind::Genesis => None,
            BlockKind::Regular { previous_block } => Some(previous_block),
        }
    }
}

/// Everything a block hash covers except the nonce.
fn preimage_prefix(header: &Header, transactions: &[Transaction]) -> HashBuilder {
    let mut h = Hash::sha256();
    h.update_fmt(format_args!("{}:{}:", header.index, header.timestamp));
    for (i, tx) in transactions.iter().enumerate() {
        if i > 0 {
            h.update(b";");
        }
        h.update_fmt(format_args!("{tx}"));
    }
    match header.previous_block() {
        Some(prev) => h.update_fmt(format_args!(":{prev}:")),
        None => h.update_fmt(format_args!(":{GENESIS_PREV_HASH}:")),
    }
    h
}

fn finish_hash(mut prefix: HashBuilder, nonce: u64) -> Hash {
    prefix.update_fmt(format_args!("{nonce}"));
    prefix.finalize()
}

/// A block waiting for proof of work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockTemplate {
    header: Header,
    transactions: Box<[Transaction]>,
}

impl BlockTemplate {
    pub fn genesis() -> Self {
        Self {
            header: Header {
                kind: BlockKind::Genesis,
                index: 0,
                timestamp: GENESIS_TIMESTAMP,
            },
            transactions: Box::new([]),
        }
    }

    pub fn regular(
        index: u64,
        timestamp: i64,
        previous_block: Hash,
        transactions: Vec<Transaction>,
    ) -> Result<Self, BlockError> {
        if index == 0 {
            return Err(BlockError::ZeroIndex);
        }
        if transactions.is_empty() {
            return Err(BlockError::NoTransactions { index });
        }
        Ok(Self {
            header: Header {
                kind: BlockKind::Regular { previous_block },
                index,
                timestamp,
            },
            transactions: transactions.into_boxed_slice(),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Hasher state primed with the nonce-independent part of the preimage.
    pub fn hash_prefix(&self) -> HashBuilder {
        preimage_prefix(&self.header, &self.transactions)
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> Hash {
        finish_hash(self.hash_prefix(), nonce)
    }

    /// Hash of `prefix` (from [`hash_prefix`](Self::hash_prefix)) extended with `nonce`.
    pub fn hash_from_prefix(prefix: &HashBuilder, nonce: u64) -> Hash {
        finish_hash(prefix.clone(), nonce)
    }

    /// Freezes the template with the nonce the miner found.
    pub(crate) fn seal(self, nonce: u64, hash: Hash) -> Block {
        Block {
            header: self.header,
            transactions: self.transactions,
            nonce,
            hash,
            receipts: Vec::new(),
        }
    }
}

/// Mined, immutable block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    header: Header,
    transactions: Box<[Transaction]>,
    nonce: u64,
    hash: Hash,
    receipts: Vec<Receipt>,
}

impl Block {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn kind(&self) -> BlockKind {
        self.header.kind
    }

    pub fn is_genesis(&self) -> bool {
        self.header.kind == BlockKind::Genesis
    }

    pub fn index(&self) -> u64 {
        self.header.index
    }

    pub fn timestamp(&self) -> i64 {
        self.header.timestamp
    }

    pub fn previous_block(&self) -> Option<Hash> {
        self.header.previous_block()
    }

    /// Previous hash as it appears in the preimage and on the wire.
    pub fn prev_hash_string(&self) -> String {
        match self.previous_block() {
            Some(prev) => prev.to_hex(),
            None => GENESIS_PREV_HASH.to_string(),
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    /// Recomputes the hash from the block's fields.
    pub fn compute_hash(&self) -> Hash {
        finish_hash(preimage_prefix(&self.header, &self.transactions), self.nonce)
    }

    /// Events from all successful contract runs, in transaction order.
    pub fn events(&self) -> Vec<&str> {
        self.receipts
            .iter()
            .flat_map(|r| r.events().iter().map(String::as_str))
            .collect()
    }

    pub(crate) fn with_receipts(mut self, receipts: Vec<Receipt>) -> Self {
        self.receipts = receipts;
        self
    }

    #[cfg(test)]
    pub(crate) fn tamper_transactions(&mut self, transactions: Vec<Transaction>) {
        self.transactions = transactions.into_boxed_slice();
    }

    #[cfg(test)]
    pub(crate) fn tamper_header(&mut self, header: Header) {
        self.header = header;
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block(index={}, prevHash={}, hash={}, nonce={}, txs={})",
            self.index(),
            self.prev_hash_string(),
            self.hash,
            self.nonce,
            self.transactions.len()
        )
    }
}
