//! Instruction module for the Meridian Virtual Machine.
//!
//! This module provides the decoded representation of a single instruction
//! and the logic that reads it out of a script.

use crate::error::{VmError, VmResult};
use crate::op_code::{OpCode, OperandSize};

/// A decoded instruction: an opcode plus its operand bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// The position of the instruction in the script.
    pointer: usize,

    /// The opcode of the instruction.
    opcode: OpCode,

    /// The operand payload. For `PUSHDATA1/2/4` this is the payload without
    /// its length prefix; [`Instruction::size`] accounts for the prefix.
    operand: Vec<u8>,
}

impl Instruction {
    /// Decodes an instruction from a script at the given position.
    pub fn decode(script: &[u8], position: usize) -> VmResult<Self> {
        let raw = *script
            .get(position)
            .ok_or_else(|| VmError::parse("instruction position out of bounds"))?;

        // PUSHBYTES1..75: the encoding byte is the payload length.
        if (0x01..=0x4B).contains(&raw) {
            let length = raw as usize;
            let operand = Self::read_bytes(script, position + 1, length)?;
            return Ok(Self {
                pointer: position,
                opcode: OpCode::PUSHBYTES,
                operand,
            });
        }

        let opcode = OpCode::try_from(raw)?;
        let operand = match opcode.operand_size() {
            OperandSize::None => Vec::new(),
            OperandSize::Fixed(size) => Self::read_bytes(script, position + 1, size)?,
            OperandSize::Prefixed(prefix) => {
                let prefix_bytes = Self::read_bytes(script, position + 1, prefix)?;
                let mut length = 0usize;
                for (i, byte) in prefix_bytes.iter().enumerate() {
                    length |= (*byte as usize) << (8 * i);
                }
                Self::read_bytes(script, position + 1 + prefix, length)?
            }
        };

        Ok(Self {
            pointer: position,
            opcode,
            operand,
        })
    }

    /// Creates a synthetic `RET` used when the instruction pointer runs past
    /// the end of a script.
    pub fn ret_at(pointer: usize) -> Self {
        Self {
            pointer,
            opcode: OpCode::RET,
            operand: Vec::new(),
        }
    }

    /// Creates an instruction directly; used by tests.
    pub fn new(opcode: OpCode, operand: &[u8]) -> Self {
        Self {
            pointer: 0,
            opcode,
            operand: operand.to_vec(),
        }
    }

    /// Returns the position of the instruction in its script.
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Returns the opcode.
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Returns the operand payload.
    pub fn operand(&self) -> &[u8] {
        &self.operand
    }

    /// Returns the encoded size of the instruction in bytes.
    pub fn size(&self) -> usize {
        let prefix = match self.opcode.operand_size() {
            OperandSize::Prefixed(prefix) => prefix,
            _ => 0,
        };
        1 + prefix + self.operand.len()
    }

    /// Reads the operand as a signed 16-bit little-endian value.
    pub fn token_i16(&self) -> VmResult<i16> {
        let bytes: [u8; 2] = self
            .operand
            .get(..2)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| VmError::parse("operand is not a 16-bit token"))?;
        Ok(i16::from_le_bytes(bytes))
    }

    /// Reads the operand as a signed 32-bit little-endian value.
    pub fn token_i32(&self) -> VmResult<i32> {
        let bytes: [u8; 4] = self
            .operand
            .get(..4)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| VmError::parse("operand is not a 32-bit token"))?;
        Ok(i32::from_le_bytes(bytes))
    }

    /// Reads the operand as an unsigned 32-bit little-endian value.
    pub fn token_u32(&self) -> VmResult<u32> {
        let bytes: [u8; 4] = self
            .operand
            .get(..4)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| VmError::parse("operand is not a 32-bit token"))?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn read_bytes(script: &[u8], start: usize, length: usize) -> VmResult<Vec<u8>> {
        let end = start
            .checked_add(length)
            .ok_or_else(|| VmError::parse("operand length overflows"))?;
        script
            .get(start..end)
            .map(|slice| slice.to_vec())
            .ok_or_else(|| {
                VmError::parse(format!(
                    "operand exceeds script bounds: {start} + {length} > {}",
                    script.len()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain() {
        let script = [OpCode::NOP as u8, OpCode::RET as u8];
        let instruction = Instruction::decode(&script, 0).expect("decode should succeed");
        assert_eq!(instruction.opcode(), OpCode::NOP);
        assert_eq!(instruction.size(), 1);
        assert!(instruction.operand().is_empty());
    }

    #[test]
    fn test_decode_pushbytes() {
        let script = [0x03, 0xAA, 0xBB, 0xCC, OpCode::RET as u8];
        let instruction = Instruction::decode(&script, 0).expect("decode should succeed");
        assert_eq!(instruction.opcode(), OpCode::PUSHBYTES);
        assert_eq!(instruction.operand().to_vec(), vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(instruction.size(), 4);
    }

    #[test]
    fn test_decode_pushdata() {
        let script = [OpCode::PUSHDATA1 as u8, 0x02, 0x11, 0x22];
        let instruction = Instruction::decode(&script, 0).expect("decode should succeed");
        assert_eq!(instruction.opcode(), OpCode::PUSHDATA1);
        assert_eq!(instruction.operand().to_vec(), vec![0x11, 0x22]);
        assert_eq!(instruction.size(), 4);

        let script = [OpCode::PUSHDATA2 as u8, 0x01, 0x00, 0x99];
        let instruction = Instruction::decode(&script, 0).expect("decode should succeed");
        assert_eq!(instruction.operand().to_vec(), vec![0x99]);
        assert_eq!(instruction.size(), 4);
    }

    #[test]
    fn test_decode_truncated() {
        // PUSHBYTES3 with only two payload bytes
        let script = [0x03, 0xAA, 0xBB];
        assert!(Instruction::decode(&script, 0).is_err());

        // JMP missing one offset byte
        let script = [OpCode::JMP as u8, 0x01];
        assert!(Instruction::decode(&script, 0).is_err());

        // PUSHDATA1 claiming more payload than the script holds
        let script = [OpCode::PUSHDATA1 as u8, 0x10, 0x00];
        assert!(Instruction::decode(&script, 0).is_err());
    }

    #[test]
    fn test_decode_unknown_opcode() {
        let script = [0xFFu8];
        assert!(matches!(
            Instruction::decode(&script, 0),
            Err(VmError::InvalidOpCode { opcode: 0xFF })
        ));
    }

    #[test]
    fn test_tokens() {
        let script = [OpCode::JMP as u8, 0xFE, 0xFF];
        let instruction = Instruction::decode(&script, 0).expect("decode should succeed");
        assert_eq!(instruction.token_i16().expect("16-bit token"), -2);

        let script = [OpCode::SYSCALL as u8, 0x78, 0x56, 0x34, 0x12];
        let instruction = Instruction::decode(&script, 0).expect("decode should succeed");
        assert_eq!(instruction.token_u32().expect("32-bit token"), 0x1234_5678);
    }
}
