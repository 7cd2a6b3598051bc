//! Raw RPCs and their decoded form.

use crate::core::blockchain::PeerBlock;
use crate::core::transaction::Transaction;
use crate::network::message::{Message, MessageError};
use bytes::Bytes;

/// Remote procedure call message containing sender address and payload data.
#[derive(Debug, Clone)]
pub struct Rpc {
    /// Address of the sender.
    pub from: String,
    /// Raw message payload.
    pub payload: Bytes,
}

impl Rpc {
    pub fn new(from: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            from: from.into(),
            payload: payload.into(),
        }
    }

    /// Parses the payload and validates any transactions it carries.
    pub fn decode(&self) -> Result<DecodedMessage, MessageError> {
        let data = match Message::from_bytes(&self.payload)? {
            Message::Transaction(payload) => DecodedMessageData::Transaction(payload.try_into()?),
            Message::Block(block) => DecodedMessageData::Block(PeerBlock {
                index: block.index,
                timestamp: block.timestamp,
                prev_hash: block.prev_hash,
                hash: block.hash,
                nonce: block.nonce,
                transactions: block
                    .transactions
                    .into_iter()
                    .map(Transaction::try_from)
                    .collect::<Result<_, _>>()?,
            }),
        };
        Ok(DecodedMessage {
            from: self.from.clone(),
            data,
        })
    }
}

#[derive(Debug)]
pub enum DecodedMessageData {
    Transaction(Transaction),
    Block(PeerBlock),
}

/// A fully decoded RPC message with sender and typed payload.
#[derive(Debug)]
pub struct DecodedMessage {
    pub from: String,
    pub data: DecodedMessageData,
}
