/// Read-only snapshot handed to one VM run.
///
/// Built per transaction by the ledger and never shared across runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Address of the transaction sender (`SENDER`).
    pub sender: String,
    /// Transaction value in minor units (`TXVALUE`).
    pub tx_value: i64,
    /// Sender's balance in minor units before this transaction (`BALANCE`).
    pub balance: i64,
    /// Timestamp of the enclosing block (`TIME`).
    pub timestamp: i64,
    /// Index of the enclosing block (`BLOCKNUM`).
    pub block_height: i64,
}

/// Call stack frame storing the return address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CallFrame {
    /// Bytecode offset to resume at after `RET`.
    pub(crate) return_addr: usize,
}
