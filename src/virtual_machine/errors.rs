//! Execution traps and assembler diagnostics.

/// Faults raised while executing bytecode. Each one aborts the current run.
///
/// `offset` is always the byte position of the opcode being executed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VMError {
    #[error("{instruction} at offset {offset} needs {needed} stack operand(s), found {available}")]
    StackUnderflow {
        instruction: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("{instruction} at offset {offset} would grow the stack past {limit} entries")]
    StackOverflow {
        instruction: &'static str,
        offset: usize,
        limit: usize,
    },
    #[error("{instruction} at offset {offset} expected {expected} but got {actual}")]
    TypeMismatch {
        instruction: &'static str,
        offset: usize,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("division by zero at offset {offset}")]
    DivisionByZero { offset: usize },
    #[error("{instruction} at offset {offset} targets {target}, outside bytecode of length {len}")]
    InvalidJump {
        instruction: &'static str,
        offset: usize,
        target: u64,
        len: usize,
    },
    #[error("out of gas at {instruction} (offset {offset}): used {used} + cost {cost} > limit {limit}")]
    OutOfGas {
        instruction: &'static str,
        offset: usize,
        used: u64,
        cost: u64,
        limit: u64,
    },
    #[error("assertion failed at offset {offset}")]
    AssertionFailed { offset: usize },
    #[error("invalid opcode 0x{opcode:02x} at offset {offset}")]
    InvalidInstruction { opcode: u8, offset: usize },
    #[error("unexpected end of bytecode at {ip}: requested {requested} byte(s), {available} available")]
    UnexpectedEndOfBytecode {
        ip: usize,
        requested: usize,
        available: usize,
    },
    #[error("invalid PUSH type tag {tag} at offset {offset}")]
    InvalidPushTag { tag: u8, offset: usize },
    #[error("invalid utf8 in string operand at offset {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("string operand of {len} bytes exceeds the u32 length prefix")]
    StringTooLong { len: usize },
    #[error("RET at offset {offset} without matching CALL")]
    ReturnWithoutCall { offset: usize },
    #[error("CALL at offset {offset} exceeds call depth {limit}")]
    CallStackOverflow { offset: usize, limit: usize },
}

/// Errors reported by the text assembler, tagged with the 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AsmError {
    #[error("line {line}: unknown instruction '{mnemonic}'")]
    UnknownMnemonic { line: usize, mnemonic: String },
    #[error("line {line}: {mnemonic} takes {expected} operand(s), got {got}")]
    Arity {
        line: usize,
        mnemonic: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("line {line}: invalid literal '{literal}'")]
    InvalidLiteral { line: usize, literal: String },
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },
    #[error("line {line}: duplicate label '{label}'")]
    DuplicateLabel { line: usize, label: String },
    #[error("line {line}: undefined label '{label}'")]
    UndefinedLabel { line: usize, label: String },
    #[error("line {line}: {source}")]
    Encoding {
        line: usize,
        #[source]
        source: VMError,
    },
}
