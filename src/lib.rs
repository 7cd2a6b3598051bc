//! Proof-of-work ledger with a contract compiler and a gas-metered stack VM.
//!
//! Provides the ledger core, the contract toolchain, and the transport
//! plumbing that connects ledgers on different nodes.

pub mod compiler;
pub mod core;
pub mod network;
pub mod types;
pub mod utils;
pub mod virtual_machine;
