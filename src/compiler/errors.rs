use crate::virtual_machine::errors::VMError;

/// Failure to turn contract source into bytecode.
///
/// `position` is the 0-based index of the offending token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("contract source is empty")]
    EmptySource,
    #[error("token {position}: numeric literal '{literal}' does not fit in 64 bits")]
    NumberOutOfRange { position: usize, literal: String },
    #[error("token {position}: expected {expected}, found '{found}'")]
    UnexpectedToken {
        position: usize,
        expected: &'static str,
        found: String,
    },
    #[error("unexpected end of source, expected {expected}")]
    UnexpectedEnd { expected: &'static str },
    #[error("token {position}: keyword {keyword} is reserved and not supported yet")]
    ReservedKeyword {
        position: usize,
        keyword: &'static str,
    },
    #[error("code generation failed: {0}")]
    Codegen(#[from] VMError),
}
