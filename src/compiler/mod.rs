//! Contract compiler: tokenizer → syntax tree → bytecode.
//!
//! - [`token`]: whitespace tokenizer and keyword table
//! - [`ast`]: typed syntax tree
//! - [`parser`]: recursive-descent parser
//! - [`codegen`]: bytecode generation
//! - [`errors`]: compilation failures

pub mod ast;
pub mod codegen;
pub mod errors;
pub mod parser;
pub mod token;

use crate::virtual_machine::program::Bytecode;
use errors::CompileError;

/// Compiles contract source to bytecode.
pub fn compile(source: &str) -> Result<Bytecode, CompileError> {
    let tokens = token::tokenize(source)?;
    let contract = parser::parse(&tokens)?;
    codegen::generate(&contract)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::token::{Keyword, Token, tokenize};
    use crate::virtual_machine::isa::Instruction;
    use crate::virtual_machine::program::Operand;
    use crate::virtual_machine::state::tests::TestState;
    use crate::virtual_machine::value::Value;
    use crate::virtual_machine::vm::context::ExecutionContext;
    use crate::virtual_machine::vm::execute;

    const GUARDED_DEBIT: &str = "WHEN BALANCE >= 100 THEN STORE balance = balance - 100";

    fn ctx_with_balance(balance: i64) -> ExecutionContext {
        ExecutionContext {
            sender: "alice".into(),
            balance,
            ..Default::default()
        }
    }

    #[test]
    fn guarded_debit_tokenizes_to_fixed_sequence() {
        assert_eq!(
            tokenize(GUARDED_DEBIT).unwrap(),
            vec![
                Token::Keyword(Keyword::When),
                Token::Keyword(Keyword::Balance),
                Token::Gte,
                Token::Number(100),
                Token::Keyword(Keyword::Then),
                Token::Keyword(Keyword::Store),
                Token::Identifier("balance".into()),
                Token::Assign,
                Token::Identifier("balance".into()),
                Token::Minus,
                Token::Number(100),
            ]
        );
    }

    #[test]
    fn tokenizing_is_idempotent() {
        assert_eq!(tokenize(GUARDED_DEBIT), tokenize(GUARDED_DEBIT));
    }

    #[test]
    fn guarded_debit_ends_with_sstore() {
        let code = compile(GUARDED_DEBIT).unwrap();
        let listing = code.disassemble().unwrap();
        let ops: Vec<_> = listing.iter().map(|d| d.instruction).collect();
        assert_eq!(
            ops,
            vec![
                Instruction::Balance,
                Instruction::Push,
                Instruction::Gte,
                Instruction::Jz,
                Instruction::Push,
                Instruction::Push,
                Instruction::Sload,
                Instruction::Push,
                Instruction::Sub,
                Instruction::Sstore,
            ]
        );
        assert_eq!(listing.last().map(|d| d.instruction), Some(Instruction::Sstore));
        // The guard jumps past the body, to the end of the code.
        assert_eq!(listing[3].operand, Some(Operand::Target(code.len() as u64)));
        assert_eq!(
            listing[4].operand,
            Some(Operand::Literal(Value::from("balance")))
        );
    }

    #[test]
    fn guard_controls_the_store() {
        let code = compile(GUARDED_DEBIT).unwrap();

        let mut rich = TestState::with_data(vec![("balance", 250)]);
        execute(&code, &ctx_with_balance(250), 10_000, &mut rich).unwrap();
        assert_eq!(rich.data.get("balance"), Some(&150));

        let mut poor = TestState::with_data(vec![("balance", 50)]);
        execute(&code, &ctx_with_balance(50), 10_000, &mut poor).unwrap();
        assert_eq!(poor.data.get("balance"), Some(&50));
    }

    #[test]
    fn context_keywords_compile_to_opcodes() {
        let code = compile("WHEN BALANCE >= 0 THEN STORE t = + TIME BLOCKNUM").unwrap();
        let ops: Vec<_> = code
            .disassemble()
            .unwrap()
            .into_iter()
            .map(|d| d.instruction)
            .collect();
        assert_eq!(
            ops,
            vec![
                Instruction::Balance,
                Instruction::Push,
                Instruction::Gte,
                Instruction::Jz,
                Instruction::Push,
                Instruction::Time,
                Instruction::Blocknum,
                Instruction::Add,
                Instruction::Sstore,
            ]
        );
    }

    #[test]
    fn compile_errors_surface() {
        assert_eq!(compile(""), Err(CompileError::EmptySource));
        assert!(matches!(
            compile("WHEN x >= 1"),
            Err(CompileError::UnexpectedEnd { .. })
        ));
    }
}
