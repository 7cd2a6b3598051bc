//! Ledger data structures and the commit pipeline.
//!
//! - `Transaction`: validated value transfer, optionally carrying a contract
//! - `Block`: mined, hash-linked batch of transactions with receipts
//! - `AccountState`: balances, doubling as contract storage
//! - `Ledger`: chain + pool + state behind one lock

pub mod account;
pub mod block;
pub mod blockchain;
pub mod config;
pub mod miner;
pub mod receipt;
pub mod transaction;
