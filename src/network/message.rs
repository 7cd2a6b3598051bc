//! JSON envelope exchanged between nodes.
//!
//! `{"type": "transaction" | "block", "data": {...}}`, with camelCase payload
//! fields.

use crate::core::block::Block;
use crate::core::transaction::{Transaction, TransactionError};
use crate::types::amount::Amount;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid transaction in message: {0}")]
    Transaction(#[from] TransactionError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    pub sender: String,
    pub recipient: String,
    pub amount: Amount,
    pub signature: String,
    #[serde(default)]
    pub contract_code: Vec<u8>,
    #[serde(default)]
    pub source_code: String,
    pub gas_limit: u64,
}

impl From<&Transaction> for TransactionPayload {
    fn from(tx: &Transaction) -> Self {
        Self {
            sender: tx.sender().to_string(),
            recipient: tx.recipient().to_string(),
            amount: tx.amount(),
            signature: tx.signature().to_string(),
            contract_code: tx
                .contract_code()
                .map(|c| c.as_bytes().to_vec())
                .unwrap_or_default(),
            source_code: tx.source_code().unwrap_or_default().to_string(),
            gas_limit: tx.gas_limit(),
        }
    }
}

impl TryFrom<TransactionPayload> for Transaction {
    type Error = TransactionError;

    /// Empty `sourceCode` / `contractCode` mean "no contract".
    fn try_from(p: TransactionPayload) -> Result<Self, Self::Error> {
        let mut tx = Transaction::new(p.sender, p.recipient, p.amount, p.signature, p.gas_limit)?;
        if !p.source_code.is_empty() {
            tx = tx.with_source_code(p.source_code);
        }
        if !p.contract_code.is_empty() {
            tx = tx.with_contract_code(p.contract_code);
        }
        Ok(tx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPayload {
    pub index: u64,
    pub timestamp: i64,
    pub prev_hash: String,
    pub hash: String,
    pub nonce: u64,
    pub transactions: Vec<TransactionPayload>,
}

impl From<&Block> for BlockPayload {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index(),
            timestamp: block.timestamp(),
            prev_hash: block.prev_hash_string(),
            hash: block.hash().to_hex(),
            nonce: block.nonce(),
            transactions: block.transactions().iter().map(TransactionPayload::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Message {
    Transaction(TransactionPayload),
    Block(BlockPayload),
}

impl Message {
    pub fn transaction(tx: &Transaction) -> Self {
        Message::Transaction(tx.into())
    }

    pub fn block(block: &Block) -> Self {
        Message::Block(block.into())
    }

    pub fn to_bytes(&self) -> Result<Bytes, MessageError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, MessageError> {
        Ok(serde_json::from_slice(data)?)
    }
}
