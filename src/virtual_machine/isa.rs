//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical opcode table and invokes a callback macro for code generation, so
//! the VM, the assembler and the compiler share one definition.
//!
//! # Bytecode Format
//!
//! - Opcode: 1 byte
//! - `Literal` operand (PUSH): 1 type tag byte, then either
//!   - tag 0: 8-byte big-endian signed integer
//!   - tag 1: 4-byte big-endian length followed by that many UTF-8 bytes
//! - `Target` operand (JUMP, JZ, JNZ, CALL): 8-byte big-endian absolute offset
//!
//! All other instructions are a single opcode byte.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::vm::gas::GasCategory;

/// Operand layout following an opcode byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// Tagged integer or string.
    Literal,
    /// Absolute byte offset into the bytecode.
    Target,
}

/// Size in bytes of a jump or call target operand.
pub const TARGET_LEN: usize = 8;

/// Invokes a callback macro with the complete instruction definition list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            /// HALT ; stop execution
            Halt = 0x00, "HALT" => [], 0, Control,
            /// PUSH literal ; push an integer or string
            Push = 0x01, "PUSH" => [value: Literal], 3, Stack,
            /// POP ; discard the top value
            Pop = 0x02, "POP" => [], 3, Stack,
            /// ADD ; a + b
            Add = 0x03, "ADD" => [], 3, Arithmetic,
            /// SUB ; a - b
            Sub = 0x04, "SUB" => [], 3, Arithmetic,
            /// MUL ; a * b
            Mul = 0x05, "MUL" => [], 6, Arithmetic,
            /// DIV ; a / b, traps on b == 0
            Div = 0x06, "DIV" => [], 6, Arithmetic,
            /// EQ ; 1 if a == b (integers or strings)
            Eq = 0x07, "EQ" => [], 3, Comparison,
            /// JUMP target ; pc = target
            Jump = 0x08, "JUMP" => [target: Target], 10, Control,
            /// JZ target ; pop c, pc = target if c == 0
            Jz = 0x09, "JZ" => [target: Target], 10, Control,
            /// JNZ target ; pop c, pc = target if c != 0
            Jnz = 0x0A, "JNZ" => [target: Target], 10, Control,
            /// SLOAD ; pop key, push storage[key] (0 if absent)
            Sload = 0x0B, "SLOAD" => [], 20, Storage,
            /// SSTORE ; pop value, pop key, storage[key] = value
            Sstore = 0x0C, "SSTORE" => [], 20, Storage,
            /// CALL target ; push return address, pc = target
            Call = 0x0D, "CALL" => [target: Target], 15, Control,
            /// RET ; pc = popped return address
            Ret = 0x0E, "RET" => [], 3, Control,
            /// DUP ; duplicate the top value
            Dup = 0x0F, "DUP" => [], 3, Stack,
            /// SWAP ; exchange the two top values
            Swap = 0x10, "SWAP" => [], 3, Stack,
            /// GT ; 1 if a > b
            Gt = 0x11, "GT" => [], 3, Comparison,
            /// LT ; 1 if a < b
            Lt = 0x12, "LT" => [], 3, Comparison,
            /// GTE ; 1 if a >= b
            Gte = 0x13, "GTE" => [], 3, Comparison,
            /// LTE ; 1 if a <= b
            Lte = 0x14, "LTE" => [], 3, Comparison,
            /// EMIT ; pop text, log "Event:<text>"
            Emit = 0x15, "EMIT" => [], 50, Event,
            /// TIME ; push block timestamp
            Time = 0x16, "TIME" => [], 5, Context,
            /// BLOCKNUM ; push block height
            Blocknum = 0x17, "BLOCKNUM" => [], 5, Context,
            /// BALANCE ; push the sender's balance snapshot
            Balance = 0x18, "BALANCE" => [], 5, Context,
            /// SENDER ; push the sender address
            Sender = 0x19, "SENDER" => [], 5, Context,
            /// TXVALUE ; push the transaction value in minor units
            Txvalue = 0x1A, "TXVALUE" => [], 5, Context,
            /// ASSERT ; pop c, trap if c is integer zero
            Assert = 0x1B, "ASSERT" => [], 5, Control,
            /// LABEL ; no-op marker
            Label = 0x1C, "LABEL" => [], 10, Control,
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    // ---------- operand kinds ----------
    (@operand) => { None };
    (@operand Literal) => { Some($crate::virtual_machine::isa::OperandKind::Literal) };
    (@operand Target) => { Some($crate::virtual_machine::isa::OperandKind::Target) };

    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident )?
            ], $gas:expr, $category:ident
        ),* $(,)?
    ) => {
        // =========================
        // VM instruction enum
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VMError::InvalidInstruction {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Instruction {
            /// Every instruction in opcode order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name, )* ];

            /// Returns the opcode byte.
            pub const fn opcode(&self) -> u8 {
                *self as u8
            }

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Returns the gas charged before this instruction runs.
            pub const fn base_gas(&self) -> u64 {
                match self {
                    $( Instruction::$name => $gas, )*
                }
            }

            /// Returns the profiling bucket this instruction's gas is booked under.
            pub const fn category(&self) -> GasCategory {
                match self {
                    $( Instruction::$name => GasCategory::$category, )*
                }
            }

            /// Returns the operand layout that follows the opcode, if any.
            pub const fn operand(&self) -> Option<OperandKind> {
                match self {
                    $( Instruction::$name => $crate::define_instructions!(@operand $($kind)?), )*
                }
            }

            /// Looks up an instruction by mnemonic (case-insensitive).
            pub fn from_mnemonic(name: &str) -> Option<Instruction> {
                $(
                    if name.eq_ignore_ascii_case($mnemonic) {
                        return Some(Instruction::$name);
                    }
                )*
                None
            }
        }
    };
}

for_each_instruction!(define_instructions);
