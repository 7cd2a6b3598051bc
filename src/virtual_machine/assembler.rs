//! Text assembler for stack-machine bytecode.
//!
//! # Syntax
//!
//! ```text
//! [label:] MNEMONIC [operand]   # optional comment
//! ```
//!
//! - Mnemonics come from the opcode table and are case-insensitive
//! - `PUSH` takes a decimal integer (`42`, `-1`) or a double-quoted string
//!   (`"hello"`, with `\"` and `\\` escapes)
//! - `JUMP`, `JZ`, `JNZ` and `CALL` take an absolute byte offset or a label
//! - A label may sit alone on its line or in front of an instruction
//! - Comments start with `#` and commas are ignored

use crate::virtual_machine::errors::{AsmError, VMError};
use crate::virtual_machine::isa::{Instruction, OperandKind, TARGET_LEN};
use crate::virtual_machine::program::{Bytecode, BytecodeBuilder};
use crate::virtual_machine::value::Value;
use std::collections::HashMap;

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token<'a> {
    text: &'a str,
    /// True for a double-quoted literal (quotes included in `text`).
    quoted: bool,
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - `#` outside a string starts a comment
/// - commas and whitespace separate tokens
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, AsmError> {
    let mut out = Vec::with_capacity(4);
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'#' => break,
            b',' | b' ' | b'\t' | b'\r' => i += 1,
            b'"' => {
                let start = i;
                i += 1;
                let mut closed = false;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' => i += 2,
                        b'"' => {
                            closed = true;
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
                if !closed {
                    return Err(AsmError::UnterminatedString { line: line_no });
                }
                out.push(Token {
                    text: &line[start..i],
                    quoted: true,
                });
            }
            _ => {
                let start = i;
                while i < bytes.len() && !matches!(bytes[i], b',' | b' ' | b'\t' | b'\r' | b'"') {
                    if bytes[i] == COMMENT_CHAR as u8 {
                        break;
                    }
                    i += 1;
                }
                out.push(Token {
                    text: &line[start..i],
                    quoted: false,
                });
            }
        }
    }

    Ok(out)
}

/// Decodes a quoted token into its string contents.
fn unquote(line: usize, tok: &str) -> Result<String, AsmError> {
    let inner = &tok[1..tok.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            _ => {
                return Err(AsmError::InvalidLiteral {
                    line,
                    literal: tok.to_string(),
                });
            }
        }
    }
    Ok(out)
}

/// Checks if a token is a label definition (ends with `:`)
fn is_label_def(tok: &Token) -> bool {
    !tok.quoted && tok.text.ends_with(LABEL_SUFFIX) && tok.text.len() > 1
}

/// Extracts the label name from a label definition token.
fn label_name<'a>(tok: &Token<'a>) -> &'a str {
    &tok.text[..tok.text.len() - 1]
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AsmOperand {
    None,
    Literal(Value),
    Target(u64),
    Label(String),
}

/// One parsed instruction line awaiting label resolution.
#[derive(Debug, Clone)]
struct AsmInstr {
    line: usize,
    instr: Instruction,
    operand: AsmOperand,
}

impl AsmInstr {
    /// Encoded size in bytes; label operands are always 8 bytes.
    fn size(&self) -> usize {
        1 + match &self.operand {
            AsmOperand::None => 0,
            AsmOperand::Literal(Value::Int(_)) => 1 + 8,
            AsmOperand::Literal(Value::Text(s)) => 1 + 4 + s.len(),
            AsmOperand::Target(_) | AsmOperand::Label(_) => TARGET_LEN,
        }
    }
}

fn parse_instruction(line: usize, tokens: &[Token]) -> Result<AsmInstr, AsmError> {
    let head = &tokens[0];
    let instr = Instruction::from_mnemonic(head.text).ok_or_else(|| AsmError::UnknownMnemonic {
        line,
        mnemonic: head.text.to_string(),
    })?;
    let args = &tokens[1..];
    let expected = usize::from(instr.operand().is_some());
    if args.len() != expected {
        return Err(AsmError::Arity {
            line,
            mnemonic: instr.mnemonic(),
            expected,
            got: args.len(),
        });
    }

    let invalid = |tok: &Token| AsmError::InvalidLiteral {
        line,
        literal: tok.text.to_string(),
    };
    let operand = match (instr.operand(), args.first()) {
        (None, _) | (_, None) => AsmOperand::None,
        (Some(OperandKind::Literal), Some(tok)) if tok.quoted => {
            AsmOperand::Literal(Value::Text(unquote(line, tok.text)?))
        }
        (Some(OperandKind::Literal), Some(tok)) => {
            AsmOperand::Literal(Value::Int(tok.text.parse().map_err(|_| invalid(tok))?))
        }
        (Some(OperandKind::Target), Some(tok)) if tok.quoted => return Err(invalid(tok)),
        (Some(OperandKind::Target), Some(tok)) => match tok.text.parse::<u64>() {
            Ok(target) => AsmOperand::Target(target),
            Err(_) if tok.text.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') => {
                AsmOperand::Label(tok.text.to_string())
            }
            Err(_) => return Err(invalid(tok)),
        },
    };

    Ok(AsmInstr {
        line,
        instr,
        operand,
    })
}

/// Assembles a full source string into bytecode.
///
/// Two passes: the first parses every line and records label offsets, the
/// second resolves label operands and emits the bytes.
pub fn assemble_source(source: &str) -> Result<Bytecode, AsmError> {
    let mut program: Vec<AsmInstr> = Vec::new();
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut offset = 0usize;

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let tokens = tokenize(line_no, line)?;
        let mut rest = tokens.as_slice();

        if let Some(first) = rest.first().filter(|t| is_label_def(t)) {
            let name = label_name(first);
            if labels.insert(name.to_string(), offset).is_some() {
                return Err(AsmError::DuplicateLabel {
                    line: line_no,
                    label: name.to_string(),
                });
            }
            rest = &rest[1..];
        }
        if rest.is_empty() {
            continue;
        }

        let instr = parse_instruction(line_no, rest)?;
        offset += instr.size();
        program.push(instr);
    }

    let mut builder = BytecodeBuilder::new();
    for AsmInstr {
        line,
        instr,
        operand,
    } in program
    {
        match operand {
            AsmOperand::None => {
                builder.op(instr);
            }
            AsmOperand::Literal(value) => {
                builder
                    .push_value(&value)
                    .map_err(|source: VMError| AsmError::Encoding { line, source })?;
            }
            AsmOperand::Target(target) => {
                builder.jump(instr, target);
            }
            AsmOperand::Label(label) => {
                let target = labels
                    .get(&label)
                    .copied()
                    .ok_or(AsmError::UndefinedLabel { line, label })?;
                builder.jump(instr, target as u64);
            }
        }
    }
    Ok(builder.finish())
}
