//! Network layer connecting ledgers on different nodes.
//!
//! - [`message`]: JSON envelope for transactions and blocks
//! - [`rpc`]: raw inbound payloads and their decoded form
//! - [`transport`]: Transport trait, errors and the ledger broadcast hook
//! - [`local_transport`]: in-memory transport
//! - [`server`]: event loop delivering inbound messages to the ledger

pub mod local_transport;
pub mod message;
pub mod rpc;
pub mod server;
pub mod transport;
