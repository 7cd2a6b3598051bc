//! Core value types shared by the ledger, the miner and the transport boundary.
//!
//! - `Hash`: 32-byte SHA-256 digest rendered as lowercase hex
//! - `Amount`: currency value held in integer minor units (cents)

pub mod amount;
pub mod hash;
