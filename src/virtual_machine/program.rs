//! Bytecode buffers: the immutable [`Bytecode`] handed to the VM, the
//! [`BytecodeReader`] cursor that decodes it, and the [`BytecodeBuilder`]
//! shared by the contract compiler and the assembler.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, OperandKind, TARGET_LEN};
use crate::virtual_machine::value::{TAG_INT, TAG_TEXT, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compiled contract bytecode. Immutable once built.
///
/// Serialized as a plain JSON byte array (`contractCode` on the wire).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bytecode(Vec<u8>);

impl Bytecode {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Decodes the whole buffer into instructions without executing it.
    pub fn disassemble(&self) -> Result<Vec<DecodedInstr>, VMError> {
        let mut reader = BytecodeReader::new(&self.0);
        let mut out = Vec::new();
        while !reader.is_at_end() {
            let offset = reader.pos();
            let opcode = reader.read_u8()?;
            let instruction = Instruction::try_from(opcode)
                .map_err(|_| VMError::InvalidInstruction { opcode, offset })?;
            let operand = match instruction.operand() {
                None => None,
                Some(OperandKind::Literal) => Some(Operand::Literal(reader.read_literal(offset)?)),
                Some(OperandKind::Target) => Some(Operand::Target(reader.read_target()?)),
            };
            out.push(DecodedInstr {
                offset,
                instruction,
                operand,
            });
        }
        Ok(out)
    }
}

impl From<Vec<u8>> for Bytecode {
    fn from(bytes: Vec<u8>) -> Self {
        Bytecode(bytes)
    }
}

/// Decoded operand of a single instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Literal(Value),
    Target(u64),
}

/// One instruction recovered by [`Bytecode::disassemble`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedInstr {
    pub offset: usize,
    pub instruction: Instruction,
    pub operand: Option<Operand>,
}

impl fmt::Display for DecodedInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}: {}", self.offset, self.instruction.mnemonic())?;
        match &self.operand {
            Some(Operand::Literal(v)) => write!(f, " {}", v),
            Some(Operand::Target(t)) => write!(f, " {}", t),
            None => Ok(()),
        }
    }
}

/// Forward-only cursor over raw bytecode.
pub struct BytecodeReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BytecodeReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Moves the cursor. Callers validate `pos <= len` first.
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads exactly `count` bytes and advances past them.
    pub fn read_exact(&mut self, count: usize) -> Result<&'a [u8], VMError> {
        let start = self.pos;
        let available = self.data.len().saturating_sub(start);
        let slice = start
            .checked_add(count)
            .and_then(|end| self.data.get(start..end))
            .ok_or(VMError::UnexpectedEndOfBytecode {
                ip: start,
                requested: count,
                available,
            })?;
        self.pos = start + count;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, VMError> {
        Ok(self.read_exact(1)?[0])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], VMError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    /// Reads an 8-byte big-endian jump or call target.
    pub fn read_target(&mut self) -> Result<u64, VMError> {
        Ok(u64::from_be_bytes(self.read_array::<TARGET_LEN>()?))
    }

    /// Reads a PUSH operand: type tag then integer or length-prefixed string.
    ///
    /// `offset` is the opcode position, used in error reports.
    pub fn read_literal(&mut self, offset: usize) -> Result<Value, VMError> {
        match self.read_u8()? {
            TAG_INT => Ok(Value::Int(i64::from_be_bytes(self.read_array::<8>()?))),
            TAG_TEXT => {
                let len = u32::from_be_bytes(self.read_array::<4>()?) as usize;
                let bytes = self.read_exact(len)?;
                let text =
                    std::str::from_utf8(bytes).map_err(|_| VMError::InvalidUtf8 { offset })?;
                Ok(Value::Text(text.to_string()))
            }
            tag => Err(VMError::InvalidPushTag { tag, offset }),
        }
    }
}

/// Location of a jump target awaiting back-patching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchSite(usize);

/// Append-only bytecode writer.
#[derive(Default)]
pub struct BytecodeBuilder {
    code: Vec<u8>,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write offset, i.e. the address of the next emitted byte.
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Emits an opcode with no operand.
    pub fn op(&mut self, instr: Instruction) -> &mut Self {
        self.code.push(instr.opcode());
        self
    }

    pub fn push_int(&mut self, value: i64) -> &mut Self {
        self.code.push(Instruction::Push.opcode());
        self.code.push(TAG_INT);
        self.code.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn push_text(&mut self, text: &str) -> Result<&mut Self, VMError> {
        let len = u32::try_from(text.len()).map_err(|_| VMError::StringTooLong { len: text.len() })?;
        self.code.push(Instruction::Push.opcode());
        self.code.push(TAG_TEXT);
        self.code.extend_from_slice(&len.to_be_bytes());
        self.code.extend_from_slice(text.as_bytes());
        Ok(self)
    }

    pub fn push_value(&mut self, value: &Value) -> Result<&mut Self, VMError> {
        match value {
            Value::Int(v) => Ok(self.push_int(*v)),
            Value::Text(s) => self.push_text(s),
        }
    }

    /// Emits a jump/call with a known target.
    pub fn jump(&mut self, instr: Instruction, target: u64) -> &mut Self {
        self.code.push(instr.opcode());
        self.code.extend_from_slice(&target.to_be_bytes());
        self
    }

    /// Emits a jump/call with a zero target to be fixed by [`patch`](Self::patch).
    pub fn jump_placeholder(&mut self, instr: Instruction) -> PatchSite {
        self.code.push(instr.opcode());
        let site = PatchSite(self.code.len());
        self.code.extend_from_slice(&[0u8; TARGET_LEN]);
        site
    }

    /// Writes `target` into a previously reserved jump operand.
    pub fn patch(&mut self, site: PatchSite, target: u64) {
        if let Some(slot) = self.code.get_mut(site.0..site.0 + TARGET_LEN) {
            slot.copy_from_slice(&target.to_be_bytes());
        }
    }

    pub fn finish(self) -> Bytecode {
        Bytecode(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_int_layout_is_big_endian() {
        let mut b = BytecodeBuilder::new();
        b.push_int(258);
        assert_eq!(
            b.finish().as_bytes(),
            &[0x01, 0x00, 0, 0, 0, 0, 0, 0, 0x01, 0x02]
        );
    }

    #[test]
    fn push_text_layout_has_length_prefix() {
        let mut b = BytecodeBuilder::new();
        b.push_text("ab").unwrap();
        assert_eq!(b.finish().as_bytes(), &[0x01, 0x01, 0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn placeholder_is_patched_in_place() {
        let mut b = BytecodeBuilder::new();
        let site = b.jump_placeholder(Instruction::Jz);
        b.op(Instruction::Pop);
        let end = b.position() as u64;
        b.patch(site, end);
        let code = b.finish();
        assert_eq!(code.len(), 10);
        assert_eq!(&code.as_bytes()[1..9], &10u64.to_be_bytes());
    }

    #[test]
    fn disassemble_recovers_instructions() {
        let mut b = BytecodeBuilder::new();
        b.push_text("balance").unwrap();
        b.op(Instruction::Sload).push_int(-7).op(Instruction::Add);
        b.jump(Instruction::Jump, 0);
        let listing = b.finish().disassemble().unwrap();
        let ops: Vec<_> = listing.iter().map(|d| d.instruction).collect();
        assert_eq!(
            ops,
            vec![
                Instruction::Push,
                Instruction::Sload,
                Instruction::Push,
                Instruction::Add,
                Instruction::Jump
            ]
        );
        assert_eq!(listing[0].operand, Some(Operand::Literal(Value::from("balance"))));
        assert_eq!(listing[2].operand, Some(Operand::Literal(Value::Int(-7))));
        assert_eq!(listing[4].operand, Some(Operand::Target(0)));
        assert_eq!(listing[1].to_string(), "0013: SLOAD");
    }

    #[test]
    fn truncated_operand_is_reported() {
        let code = Bytecode::from(vec![0x01, 0x00, 0x01]);
        assert!(matches!(
            code.disassemble(),
            Err(VMError::UnexpectedEndOfBytecode {
                ip: 2,
                requested: 8,
                available: 1
            })
        ));
    }

    #[test]
    fn bad_tag_and_utf8_are_reported() {
        let bad_tag = Bytecode::from(vec![0x01, 0x07]);
        assert!(matches!(
            bad_tag.disassemble(),
            Err(VMError::InvalidPushTag { tag: 7, offset: 0 })
        ));
        let bad_utf8 = Bytecode::from(vec![0x01, 0x01, 0, 0, 0, 1, 0xff]);
        assert!(matches!(
            bad_utf8.disassemble(),
            Err(VMError::InvalidUtf8 { offset: 0 })
        ));
    }

    #[test]
    fn serde_is_a_byte_array() {
        let code = Bytecode::from(vec![0x0b, 0x0c]);
        assert_eq!(serde_json::to_string(&code).unwrap(), "[11,12]");
        let back: Bytecode = serde_json::from_str("[11,12]").unwrap();
        assert_eq!(back, code);
    }
}
