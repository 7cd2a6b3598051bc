//! Transaction execution receipts.
//!
//! Every committed transaction gets a [`Receipt`] stored beside its block.
//! Receipts are not part of the block hash preimage.

use serde::Serialize;

/// How a transaction's contract ran, if it had one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ExecutionStatus {
    NoContract,
    #[serde(rename_all = "camelCase")]
    Success { gas_used: u64, events: Vec<String> },
    #[serde(rename_all = "camelCase")]
    Trapped { gas_used: u64, reason: String },
}

/// What happened to the transaction's value transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferOutcome {
    Applied,
    /// Sender could not cover the amount under the reject-overdraft policy.
    InsufficientFunds,
    /// Contract trapped under the revert-on-trap policy.
    RevertedByTrap,
    /// Applying the transfer would overflow a balance.
    Overflow,
}

/// Record of a single transaction's execution within a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Position of the transaction in its block.
    pub tx_index: usize,
    pub execution: ExecutionStatus,
    pub transfer: TransferOutcome,
    /// Running total of gas consumed by the block up to and including this one.
    pub cumulative_gas_used: u64,
}

impl Receipt {
    pub fn gas_used(&self) -> u64 {
        match &self.execution {
            ExecutionStatus::NoContract => 0,
            ExecutionStatus::Success { gas_used, .. } | ExecutionStatus::Trapped { gas_used, .. } => {
                *gas_used
            }
        }
    }

    pub fn transfer_applied(&self) -> bool {
        self.transfer == TransferOutcome::Applied
    }

    pub fn trapped(&self) -> bool {
        matches!(self.execution, ExecutionStatus::Trapped { .. })
    }

    /// Events emitted by a successful contract run.
    pub fn events(&self) -> &[String] {
        match &self.execution {
            ExecutionStatus::Success { events, .. } => events,
            _ => &[],
        }
    }
}
