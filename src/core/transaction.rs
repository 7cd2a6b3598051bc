//! Value transfer record, optionally carrying a contract.

use crate::compiler::{self, errors::CompileError};
use crate::types::amount::{Amount, AmountError};
use crate::virtual_machine::program::Bytecode;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("transaction field `{field}` must not be empty")]
    EmptyField { field: &'static str },
    #[error("transaction amount must be positive, got {0}")]
    NonPositiveAmount(Amount),
    #[error("transaction gas limit must be positive")]
    ZeroGasLimit,
    #[error("invalid transaction amount: {0}")]
    InvalidAmount(#[from] AmountError),
}

/// A transfer of `amount` from `sender` to `recipient`.
///
/// Immutable once built. Compiling attached source yields a new transaction
/// carrying the bytecode; the original is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    sender: String,
    recipient: String,
    amount: Amount,
    /// Opaque; carried and hashed, never verified.
    signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    contract_code: Option<Bytecode>,
    gas_limit: u64,
}

impl Transaction {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: Amount,
        signature: impl Into<String>,
        gas_limit: u64,
    ) -> Result<Self, TransactionError> {
        let tx = Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            signature: signature.into(),
            source_code: None,
            contract_code: None,
            gas_limit,
        };
        tx.validate()?;
        Ok(tx)
    }

    /// Like [`Transaction::new`] with the amount given as a decimal string.
    pub fn from_decimal(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: &str,
        signature: impl Into<String>,
        gas_limit: u64,
    ) -> Result<Self, TransactionError> {
        let amount = Amount::parse_decimal(amount)?;
        Self::new(sender, recipient, amount, signature, gas_limit)
    }

    fn validate(&self) -> Result<(), TransactionError> {
        for (field, value) in [
            ("sender", &self.sender),
            ("recipient", &self.recipient),
            ("signature", &self.signature),
        ] {
            if value.is_empty() {
                return Err(TransactionError::EmptyField { field });
            }
        }
        if !self.amount.is_positive() {
            return Err(TransactionError::NonPositiveAmount(self.amount));
        }
        if self.gas_limit == 0 {
            return Err(TransactionError::ZeroGasLimit);
        }
        Ok(())
    }

    /// Attaches contract source, compiled when the transaction is committed.
    pub fn with_source_code(mut self, source: impl Into<String>) -> Self {
        self.source_code = Some(source.into());
        self
    }

    /// Attaches already compiled bytecode.
    pub fn with_contract_code(mut self, code: impl Into<Bytecode>) -> Self {
        self.contract_code = Some(code.into());
        self
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn source_code(&self) -> Option<&str> {
        self.source_code.as_deref()
    }

    pub fn contract_code(&self) -> Option<&Bytecode> {
        self.contract_code.as_ref()
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// Returns a copy with `source_code` compiled into `contract_code`.
    ///
    /// Transactions without source are returned unchanged.
    pub fn compile(&self) -> Result<Transaction, CompileError> {
        let mut compiled = self.clone();
        if let Some(source) = &self.source_code {
            compiled.contract_code = Some(compiler::compile(source)?);
        }
        Ok(compiled)
    }
}

/// Hash preimage form.
impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction(sender={}, recipient={}, amount={}, signature={}, gasLimit={}",
            self.sender, self.recipient, self.amount, self.signature, self.gas_limit
        )?;
        if let Some(code) = &self.contract_code {
            write!(f, ", code={}", code.to_hex())?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::isa::Instruction;

    fn transfer() -> Transaction {
        Transaction::from_decimal("alice", "bob", "10.00", "sig", 100).unwrap()
    }

    #[test]
    fn builds_valid_transaction() {
        let tx = transfer();
        assert_eq!(tx.sender(), "alice");
        assert_eq!(tx.recipient(), "bob");
        assert_eq!(tx.amount().minor(), 1000);
        assert_eq!(tx.signature(), "sig");
        assert_eq!(tx.gas_limit(), 100);
        assert!(tx.source_code().is_none());
        assert!(tx.contract_code().is_none());
    }

    #[test]
    fn rejects_empty_fields() {
        let amount = Amount::from_minor(1);
        assert_eq!(
            Transaction::new("", "bob", amount, "sig", 1),
            Err(TransactionError::EmptyField { field: "sender" })
        );
        assert_eq!(
            Transaction::new("alice", "", amount, "sig", 1),
            Err(TransactionError::EmptyField { field: "recipient" })
        );
        assert_eq!(
            Transaction::new("alice", "bob", amount, "", 1),
            Err(TransactionError::EmptyField { field: "signature" })
        );
    }

    #[test]
    fn rejects_non_positive_amount_and_zero_gas() {
        assert_eq!(
            Transaction::new("a", "b", Amount::ZERO, "s", 1),
            Err(TransactionError::NonPositiveAmount(Amount::ZERO))
        );
        assert!(matches!(
            Transaction::new("a", "b", Amount::from_minor(-5), "s", 1),
            Err(TransactionError::NonPositiveAmount(_))
        ));
        assert_eq!(
            Transaction::new("a", "b", Amount::from_minor(1), "s", 0),
            Err(TransactionError::ZeroGasLimit)
        );
    }

    #[test]
    fn rejects_overly_precise_decimal() {
        assert!(matches!(
            Transaction::from_decimal("a", "b", "1.005", "s", 1),
            Err(TransactionError::InvalidAmount(_))
        ));
    }

    #[test]
    fn display_is_the_hash_preimage() {
        assert_eq!(
            transfer().to_string(),
            "Transaction(sender=alice, recipient=bob, amount=10.00, signature=sig, gasLimit=100)"
        );
        let with_code = transfer().with_contract_code(vec![Instruction::Halt.opcode()]);
        assert_eq!(
            with_code.to_string(),
            "Transaction(sender=alice, recipient=bob, amount=10.00, signature=sig, gasLimit=100, code=00)"
        );
    }

    #[test]
    fn compile_derives_a_copy_with_bytecode() {
        let tx = transfer().with_source_code("WHEN BALANCE >= 0 THEN STORE x = 1");
        let compiled = tx.compile().unwrap();
        assert!(tx.contract_code().is_none());
        assert_eq!(
            compiled.contract_code(),
            Some(&compiler::compile("WHEN BALANCE >= 0 THEN STORE x = 1").unwrap())
        );
        assert_eq!(compiled.source_code(), Some("WHEN BALANCE >= 0 THEN STORE x = 1"));
    }

    #[test]
    fn compile_without_source_is_identity() {
        let tx = transfer();
        assert_eq!(tx.compile().unwrap(), tx);
    }

    #[test]
    fn compile_reports_source_errors() {
        let tx = transfer().with_source_code("STORE x = 1");
        assert!(tx.compile().is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(transfer().with_source_code("WHEN BALANCE >= 0 THEN STORE x = 1")).unwrap();
        assert_eq!(json["gasLimit"], 100);
        assert_eq!(json["sourceCode"], "WHEN BALANCE >= 0 THEN STORE x = 1");
        assert_eq!(json["amount"], 10.0);
        assert!(json.get("contractCode").is_none());
    }
}
