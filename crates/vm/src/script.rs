//! Script module for the Meridian Virtual Machine.
//!
//! A script is an immutable, cheaply cloneable byte sequence. Scripts carry
//! identity: pointers compare equal only when they refer to the same loaded
//! script, not merely to equal bytes.

use crate::error::VmResult;
use crate::instruction::Instruction;
use std::fmt;
use std::sync::Arc;

/// An immutable byte-code script.
#[derive(Clone)]
pub struct Script {
    bytes: Arc<Vec<u8>>,
}

impl Script {
    /// Creates a new script from raw bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(bytes),
        }
    }

    /// Returns the length of the script in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the script is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the raw bytes of the script.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decodes the instruction at the given position.
    pub fn instruction_at(&self, position: usize) -> VmResult<Instruction> {
        Instruction::decode(&self.bytes, position)
    }

    /// Returns `true` when both handles refer to the same loaded script.
    pub fn same_script(&self, other: &Script) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Script::new(bytes)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({} bytes)", self.bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op_code::OpCode;

    #[test]
    fn test_script_identity() {
        let a = Script::new(vec![OpCode::NOP as u8]);
        let b = Script::new(vec![OpCode::NOP as u8]);
        let a2 = a.clone();

        assert!(a.same_script(&a2));
        assert!(!a.same_script(&b));
    }

    #[test]
    fn test_instruction_at() {
        let script = Script::new(vec![OpCode::PUSH1 as u8, OpCode::RET as u8]);

        let first = script.instruction_at(0).expect("decode should succeed");
        assert_eq!(first.opcode(), OpCode::PUSH1);

        let second = script.instruction_at(1).expect("decode should succeed");
        assert_eq!(second.opcode(), OpCode::RET);

        assert!(script.instruction_at(2).is_err());
    }
}
