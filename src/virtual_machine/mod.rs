//! Gas-metered stack virtual machine for contract execution.
//!
//! # Architecture
//!
//! - **Operand stack**: up to 1000 tagged [`value::Value`]s (`Int` or `Text`)
//! - **Storage**: integer key/value [`state::State`], written through an
//!   overlay so a trapped run leaves no trace
//! - **Instruction format**: one opcode byte plus a fixed operand layout
//! - **Gas metering**: every opcode is charged before it runs and the run
//!   traps once the transaction's gas limit would be exceeded
//!
//! # Modules
//!
//! - [`assembler`]: Text assembler with labels
//! - [`errors`]: Execution traps and assembler errors
//! - [`isa`]: Opcode table, gas costs and operand layouts
//! - [`program`]: Bytecode buffer, reader and builder
//! - [`state`]: Storage trait and overlay
//! - [`value`]: Tagged stack values
//! - [`vm`]: The interpreter and gas meter

pub mod assembler;
pub mod errors;
pub mod isa;
pub mod program;
pub mod state;
pub mod value;
pub mod vm;
