//! Post-order bytecode generation over the syntax tree.

use crate::compiler::ast::{BinOp, Condition, ContextValue, Contract, Expr, Statement};
use crate::compiler::errors::CompileError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::{Bytecode, BytecodeBuilder};

/// Lowers a parsed contract to bytecode.
pub fn generate(contract: &Contract) -> Result<Bytecode, CompileError> {
    let mut out = BytecodeBuilder::new();
    for statement in &contract.statements {
        emit_statement(&mut out, statement)?;
    }
    Ok(out.finish())
}

/// `WHEN` lowers to `JZ` over its body so a false guard skips the store;
/// `STORE` pushes the key before the value because `SSTORE` pops value then key.
fn emit_statement(out: &mut BytecodeBuilder, statement: &Statement) -> Result<(), CompileError> {
    match statement {
        Statement::When { condition, body } => {
            emit_condition(out, condition)?;
            // Skip the body when the condition is false.
            let skip = out.jump_placeholder(Instruction::Jz);
            emit_statement(out, body)?;
            let end = out.position() as u64;
            out.patch(skip, end);
        }
        Statement::Store { key, value } => {
            out.push_text(key)?;
            emit_expr(out, value)?;
            out.op(Instruction::Sstore);
        }
    }
    Ok(())
}

fn emit_condition(out: &mut BytecodeBuilder, condition: &Condition) -> Result<(), CompileError> {
    emit_expr(out, &condition.lhs)?;
    emit_expr(out, &condition.rhs)?;
    out.op(Instruction::Gte);
    Ok(())
}

fn emit_expr(out: &mut BytecodeBuilder, expr: &Expr) -> Result<(), CompileError> {
    match expr {
        Expr::Number(n) => {
            out.push_int(*n);
        }
        Expr::Identifier(name) => {
            out.push_text(name)?;
            out.op(Instruction::Sload);
        }
        Expr::Context(value) => {
            out.op(match value {
                ContextValue::Balance => Instruction::Balance,
                ContextValue::TxValue => Instruction::Txvalue,
                ContextValue::Time => Instruction::Time,
                ContextValue::BlockNum => Instruction::Blocknum,
            });
        }
        Expr::Binary { op, lhs, rhs } => {
            emit_expr(out, lhs)?;
            emit_expr(out, rhs)?;
            out.op(match op {
                BinOp::Add => Instruction::Add,
                BinOp::Sub => Instruction::Sub,
            });
        }
    }
    Ok(())
}
