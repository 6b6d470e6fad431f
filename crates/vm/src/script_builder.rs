//! Script builder module for the Meridian Virtual Machine.
//!
//! Programmatic construction of scripts, mainly used by embedders and the
//! test suite.

use crate::op_code::OpCode;
use crate::script::Script;

/// Helps construct VM scripts programmatically.
#[derive(Default)]
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    /// Creates a new script builder.
    pub fn new() -> Self {
        Self { script: Vec::new() }
    }

    /// Emits an opcode.
    pub fn emit(&mut self, opcode: OpCode) -> &mut Self {
        self.script.push(opcode as u8);
        self
    }

    /// Emits raw bytes verbatim.
    pub fn emit_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.script.extend_from_slice(bytes);
        self
    }

    /// Emits the shortest push for the given payload.
    pub fn emit_push(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len();
        if len == 0 {
            self.emit(OpCode::PUSH0);
        } else if len <= 0x4B {
            self.script.push(len as u8);
            self.script.extend_from_slice(data);
        } else if len <= 0xFF {
            self.emit(OpCode::PUSHDATA1);
            self.script.push(len as u8);
            self.script.extend_from_slice(data);
        } else if len <= 0xFFFF {
            self.emit(OpCode::PUSHDATA2);
            self.script.extend_from_slice(&(len as u16).to_le_bytes());
            self.script.extend_from_slice(data);
        } else {
            self.emit(OpCode::PUSHDATA4);
            self.script.extend_from_slice(&(len as u32).to_le_bytes());
            self.script.extend_from_slice(data);
        }
        self
    }

    /// Emits the shortest push for the given integer.
    pub fn emit_push_int(&mut self, value: i64) -> &mut Self {
        if value == -1 {
            return self.emit(OpCode::PUSHM1);
        }
        if (0..=16).contains(&value) {
            let opcode = if value == 0 {
                // PUSH0 pushes empty bytes, which is the canonical zero
                OpCode::PUSH0 as u8
            } else {
                OpCode::PUSHNULL as u8 + value as u8
            };
            self.script.push(opcode);
            return self;
        }

        let encoded = crate::stack_item::encode_integer(&num_bigint::BigInt::from(value));
        self.emit_push(&encoded)
    }

    /// Emits a push for a boolean.
    pub fn emit_push_bool(&mut self, value: bool) -> &mut Self {
        if value {
            self.emit(OpCode::PUSH1)
        } else {
            self.emit(OpCode::PUSH0)
        }
    }

    /// Emits a jump-family opcode with a signed 16-bit offset.
    pub fn emit_jump(&mut self, opcode: OpCode, offset: i16) -> &mut Self {
        self.emit(opcode);
        self.script.extend_from_slice(&offset.to_le_bytes());
        self
    }

    /// Emits a `CALL` with a signed 16-bit offset.
    pub fn emit_call(&mut self, offset: i16) -> &mut Self {
        self.emit_jump(OpCode::CALL, offset)
    }

    /// Emits a `PUSHA` with a signed 32-bit offset.
    pub fn emit_pusha(&mut self, offset: i32) -> &mut Self {
        self.emit(OpCode::PUSHA);
        self.script.extend_from_slice(&offset.to_le_bytes());
        self
    }

    /// Emits a `SYSCALL` with the given method id.
    pub fn emit_syscall(&mut self, id: u32) -> &mut Self {
        self.emit(OpCode::SYSCALL);
        self.script.extend_from_slice(&id.to_le_bytes());
        self
    }

    /// Returns the current length of the script being built.
    pub fn len(&self) -> usize {
        self.script.len()
    }

    /// Returns `true` if nothing was emitted yet.
    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    /// Finishes the builder into a script.
    pub fn to_script(&self) -> Script {
        Script::new(self.script.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_push_selects_encoding() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push(&[0xAB; 3]);
        assert_eq!(builder.to_script().as_bytes()[0], 0x03);

        let mut builder = ScriptBuilder::new();
        builder.emit_push(&[0xAB; 100]);
        assert_eq!(
            builder.to_script().as_bytes()[0],
            OpCode::PUSHDATA1 as u8
        );
        assert_eq!(builder.to_script().as_bytes()[1], 100);

        let mut builder = ScriptBuilder::new();
        builder.emit_push(&[0xAB; 0x1234]);
        assert_eq!(
            builder.to_script().as_bytes()[0],
            OpCode::PUSHDATA2 as u8
        );
    }

    #[test]
    fn test_emit_push_int_small_values() {
        let mut builder = ScriptBuilder::new();
        builder
            .emit_push_int(-1)
            .emit_push_int(0)
            .emit_push_int(5)
            .emit_push_int(16);
        assert_eq!(
            builder.to_script().as_bytes().to_vec(),
            vec![
                OpCode::PUSHM1 as u8,
                OpCode::PUSH0 as u8,
                OpCode::PUSH5 as u8,
                OpCode::PUSH16 as u8,
            ]
        );
    }

    #[test]
    fn test_emit_push_int_large_value() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(0x0102);
        // PUSHBYTES2 followed by little-endian bytes
        assert_eq!(builder.to_script().as_bytes().to_vec(), vec![0x02, 0x02, 0x01]);
    }

    #[test]
    fn test_emit_jump_and_syscall() {
        let mut builder = ScriptBuilder::new();
        builder.emit_jump(OpCode::JMP, -3).emit_syscall(0xDEAD_BEEF);
        assert_eq!(
            builder.to_script().as_bytes().to_vec(),
            vec![
                OpCode::JMP as u8,
                0xFD,
                0xFF,
                OpCode::SYSCALL as u8,
                0xEF,
                0xBE,
                0xAD,
                0xDE,
            ]
        );
    }
}
