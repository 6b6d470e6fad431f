//! OpCode module for the Meridian Virtual Machine.
//!
//! This module defines the instructions supported by the VM and the operand
//! layout each of them expects in a script.

mod operand_size;

pub use operand_size::OperandSize;

use crate::error::VmError;

/// The opcodes understood by the VM.
///
/// The discriminant of each variant is its encoding byte. The bytes
/// `0x01..=0x4B` all decode to [`OpCode::PUSHBYTES`]: the byte value itself
/// is the number of payload bytes that follow.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Pushes an empty byte string onto the stack.
    PUSH0 = 0x00,
    /// Pushes the next 1..=75 bytes onto the stack (length taken from the
    /// opcode byte itself).
    PUSHBYTES = 0x01,
    /// Pushes up to 255 bytes, length given by a 1-byte prefix.
    PUSHDATA1 = 0x4C,
    /// Pushes up to 64 KiB, length given by a 2-byte little-endian prefix.
    PUSHDATA2 = 0x4D,
    /// Pushes a payload whose length is given by a 4-byte little-endian prefix.
    PUSHDATA4 = 0x4E,
    /// Pushes the integer −1 onto the stack.
    PUSHM1 = 0x4F,
    /// Pushes the null value onto the stack.
    PUSHNULL = 0x50,
    /// Pushes the integer 1 onto the stack.
    PUSH1 = 0x51,
    PUSH2 = 0x52,
    PUSH3 = 0x53,
    PUSH4 = 0x54,
    PUSH5 = 0x55,
    PUSH6 = 0x56,
    PUSH7 = 0x57,
    PUSH8 = 0x58,
    PUSH9 = 0x59,
    PUSH10 = 0x5A,
    PUSH11 = 0x5B,
    PUSH12 = 0x5C,
    PUSH13 = 0x5D,
    PUSH14 = 0x5E,
    PUSH15 = 0x5F,
    /// Pushes the integer 16 onto the stack.
    PUSH16 = 0x60,

    /// Does nothing.
    NOP = 0x61,
    /// Unconditional jump by a signed 16-bit offset.
    JMP = 0x62,
    /// Jump if the popped value is truthy.
    JMPIF = 0x63,
    /// Jump if the popped value is falsy.
    JMPIFNOT = 0x64,
    /// Calls the routine at a signed 16-bit offset in the current script.
    CALL = 0x65,
    /// Returns from the current context.
    RET = 0x66,
    /// Invokes a host method identified by a 32-bit little-endian id.
    SYSCALL = 0x67,
    /// Pushes a pointer to a position in the current script (signed 32-bit
    /// offset from the instruction).
    PUSHA = 0x68,
    /// Calls the routine designated by a popped pointer.
    CALLA = 0x69,

    /// Duplicates the top of the alt stack onto the evaluation stack.
    DUPFROMALTSTACK = 0x6A,
    /// Moves the top of the evaluation stack to the alt stack.
    TOALTSTACK = 0x6B,
    /// Moves the top of the alt stack to the evaluation stack.
    FROMALTSTACK = 0x6C,
    /// Duplicates the bottom of the alt stack onto the evaluation stack.
    DUPFROMALTSTACKBOTTOM = 0x6D,
    /// Pops a value and pushes whether it is null.
    ISNULL = 0x6E,
    /// Removes the item n deep in the stack (n popped first).
    XDROP = 0x6F,
    /// Swaps the top with the item n deep (n popped first).
    XSWAP = 0x70,
    /// Inserts a copy of the top n deep in the stack (n popped first).
    XTUCK = 0x71,
    /// Pushes the current evaluation stack depth.
    DEPTH = 0x72,
    /// Removes the top item.
    DROP = 0x73,
    /// Duplicates the top item.
    DUP = 0x74,
    /// Removes the second item.
    NIP = 0x75,
    /// Copies the second item to the top.
    OVER = 0x76,
    /// Copies the item n deep to the top (n popped first).
    PICK = 0x77,
    /// Moves the item n deep to the top (n popped first).
    ROLL = 0x78,
    /// Rotates the top three items.
    ROT = 0x79,
    /// Swaps the top two items.
    SWAP = 0x7A,
    /// Copies the top item below the second.
    TUCK = 0x7B,

    /// Concatenates two byte strings.
    CAT = 0x7C,
    /// Extracts a slice of a byte string.
    SUBSTR = 0x7D,
    /// Extracts a prefix of a byte string.
    LEFT = 0x7E,
    /// Extracts a suffix of a byte string.
    RIGHT = 0x7F,
    /// Pushes the byte length of a primitive.
    SIZE = 0x80,

    /// Bitwise complement of an integer.
    INVERT = 0x81,
    /// Bitwise AND of two integers.
    AND = 0x82,
    /// Bitwise OR of two integers.
    OR = 0x83,
    /// Bitwise XOR of two integers.
    XOR = 0x84,
    /// Structural equality of two items.
    EQUAL = 0x85,

    /// Increments an integer by one.
    INC = 0x8B,
    /// Decrements an integer by one.
    DEC = 0x8C,
    /// Pushes the sign (−1, 0 or 1) of an integer.
    SIGN = 0x8D,
    /// Arithmetic negation.
    NEGATE = 0x8F,
    /// Absolute value.
    ABS = 0x90,
    /// Boolean negation.
    NOT = 0x91,
    /// Pushes whether an integer is nonzero.
    NZ = 0x92,
    ADD = 0x93,
    SUB = 0x94,
    MUL = 0x95,
    DIV = 0x96,
    MOD = 0x97,
    /// Left shift (negative counts shift right).
    SHL = 0x98,
    /// Right shift (negative counts shift left).
    SHR = 0x99,
    BOOLAND = 0x9A,
    BOOLOR = 0x9B,
    NUMEQUAL = 0x9C,
    NUMNOTEQUAL = 0x9E,
    LT = 0x9F,
    GT = 0xA0,
    LTE = 0xA1,
    GTE = 0xA2,
    MIN = 0xA3,
    MAX = 0xA4,
    /// Pushes `a <= x < b` for popped `b`, `a`, `x`.
    WITHIN = 0xA5,

    /// Entry count of a compound, byte length of a primitive.
    ARRAYSIZE = 0xC0,
    /// Packs n popped items into a new array.
    PACK = 0xC1,
    /// Unpacks an array onto the stack followed by its length.
    UNPACK = 0xC2,
    /// Reads an element of an array, map or primitive byte view.
    PICKITEM = 0xC3,
    /// Writes an element of an array or map.
    SETITEM = 0xC4,
    /// Allocates an array, or reinterprets a struct as an array.
    NEWARRAY = 0xC5,
    /// Allocates a struct, or reinterprets an array as a struct.
    NEWSTRUCT = 0xC6,
    /// Allocates an empty map.
    NEWMAP = 0xC7,
    /// Appends a value to an array.
    APPEND = 0xC8,
    /// Reverses an array in place.
    REVERSE = 0xC9,
    /// Removes an element of an array or map.
    REMOVE = 0xCA,
    /// Pushes whether an index or key is present.
    HASKEY = 0xCB,
    /// Pushes the keys of a map as a new array.
    KEYS = 0xCC,
    /// Pushes the values of an array or map as a new array.
    VALUES = 0xCD,

    /// Aborts execution.
    THROW = 0xF0,
    /// Pops a value and aborts execution if it is falsy.
    THROWIFNOT = 0xF1,
}

impl OpCode {
    /// Returns the operand layout of this opcode.
    ///
    /// [`OpCode::PUSHBYTES`] is the one opcode whose operand length is not a
    /// property of the variant: the raw encoding byte carries it, and the
    /// instruction decoder handles it before consulting this table.
    pub fn operand_size(self) -> OperandSize {
        match self {
            OpCode::PUSHDATA1 => OperandSize::Prefixed(1),
            OpCode::PUSHDATA2 => OperandSize::Prefixed(2),
            OpCode::PUSHDATA4 => OperandSize::Prefixed(4),
            OpCode::JMP | OpCode::JMPIF | OpCode::JMPIFNOT | OpCode::CALL => OperandSize::Fixed(2),
            OpCode::SYSCALL | OpCode::PUSHA => OperandSize::Fixed(4),
            _ => OperandSize::None,
        }
    }

    /// Returns `true` for the opcodes that push an inline constant.
    pub fn is_push(self) -> bool {
        (self as u8) <= OpCode::PUSH16 as u8
    }
}

impl TryFrom<u8> for OpCode {
    type Error = VmError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        let opcode = match byte {
            0x00 => OpCode::PUSH0,
            0x01..=0x4B => OpCode::PUSHBYTES,
            0x4C => OpCode::PUSHDATA1,
            0x4D => OpCode::PUSHDATA2,
            0x4E => OpCode::PUSHDATA4,
            0x4F => OpCode::PUSHM1,
            0x50 => OpCode::PUSHNULL,
            0x51 => OpCode::PUSH1,
            0x52 => OpCode::PUSH2,
            0x53 => OpCode::PUSH3,
            0x54 => OpCode::PUSH4,
            0x55 => OpCode::PUSH5,
            0x56 => OpCode::PUSH6,
            0x57 => OpCode::PUSH7,
            0x58 => OpCode::PUSH8,
            0x59 => OpCode::PUSH9,
            0x5A => OpCode::PUSH10,
            0x5B => OpCode::PUSH11,
            0x5C => OpCode::PUSH12,
            0x5D => OpCode::PUSH13,
            0x5E => OpCode::PUSH14,
            0x5F => OpCode::PUSH15,
            0x60 => OpCode::PUSH16,
            0x61 => OpCode::NOP,
            0x62 => OpCode::JMP,
            0x63 => OpCode::JMPIF,
            0x64 => OpCode::JMPIFNOT,
            0x65 => OpCode::CALL,
            0x66 => OpCode::RET,
            0x67 => OpCode::SYSCALL,
            0x68 => OpCode::PUSHA,
            0x69 => OpCode::CALLA,
            0x6A => OpCode::DUPFROMALTSTACK,
            0x6B => OpCode::TOALTSTACK,
            0x6C => OpCode::FROMALTSTACK,
            0x6D => OpCode::DUPFROMALTSTACKBOTTOM,
            0x6E => OpCode::ISNULL,
            0x6F => OpCode::XDROP,
            0x70 => OpCode::XSWAP,
            0x71 => OpCode::XTUCK,
            0x72 => OpCode::DEPTH,
            0x73 => OpCode::DROP,
            0x74 => OpCode::DUP,
            0x75 => OpCode::NIP,
            0x76 => OpCode::OVER,
            0x77 => OpCode::PICK,
            0x78 => OpCode::ROLL,
            0x79 => OpCode::ROT,
            0x7A => OpCode::SWAP,
            0x7B => OpCode::TUCK,
            0x7C => OpCode::CAT,
            0x7D => OpCode::SUBSTR,
            0x7E => OpCode::LEFT,
            0x7F => OpCode::RIGHT,
            0x80 => OpCode::SIZE,
            0x81 => OpCode::INVERT,
            0x82 => OpCode::AND,
            0x83 => OpCode::OR,
            0x84 => OpCode::XOR,
            0x85 => OpCode::EQUAL,
            0x8B => OpCode::INC,
            0x8C => OpCode::DEC,
            0x8D => OpCode::SIGN,
            0x8F => OpCode::NEGATE,
            0x90 => OpCode::ABS,
            0x91 => OpCode::NOT,
            0x92 => OpCode::NZ,
            0x93 => OpCode::ADD,
            0x94 => OpCode::SUB,
            0x95 => OpCode::MUL,
            0x96 => OpCode::DIV,
            0x97 => OpCode::MOD,
            0x98 => OpCode::SHL,
            0x99 => OpCode::SHR,
            0x9A => OpCode::BOOLAND,
            0x9B => OpCode::BOOLOR,
            0x9C => OpCode::NUMEQUAL,
            0x9E => OpCode::NUMNOTEQUAL,
            0x9F => OpCode::LT,
            0xA0 => OpCode::GT,
            0xA1 => OpCode::LTE,
            0xA2 => OpCode::GTE,
            0xA3 => OpCode::MIN,
            0xA4 => OpCode::MAX,
            0xA5 => OpCode::WITHIN,
            0xC0 => OpCode::ARRAYSIZE,
            0xC1 => OpCode::PACK,
            0xC2 => OpCode::UNPACK,
            0xC3 => OpCode::PICKITEM,
            0xC4 => OpCode::SETITEM,
            0xC5 => OpCode::NEWARRAY,
            0xC6 => OpCode::NEWSTRUCT,
            0xC7 => OpCode::NEWMAP,
            0xC8 => OpCode::APPEND,
            0xC9 => OpCode::REVERSE,
            0xCA => OpCode::REMOVE,
            0xCB => OpCode::HASKEY,
            0xCC => OpCode::KEYS,
            0xCD => OpCode::VALUES,
            0xF0 => OpCode::THROW,
            0xF1 => OpCode::THROWIFNOT,
            _ => return Err(VmError::invalid_opcode(byte)),
        };
        Ok(opcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for byte in [0x00u8, 0x4C, 0x4F, 0x60, 0x66, 0xA5, 0xC4, 0xF1] {
            let opcode = OpCode::try_from(byte).expect("known opcode");
            assert_eq!(opcode as u8, byte);
        }
    }

    #[test]
    fn test_pushbytes_range() {
        for byte in 0x01..=0x4Bu8 {
            assert_eq!(
                OpCode::try_from(byte).expect("pushbytes byte"),
                OpCode::PUSHBYTES
            );
        }
    }

    #[test]
    fn test_unknown_bytes() {
        for byte in [0x86u8, 0x9D, 0xCE, 0xFF] {
            assert!(OpCode::try_from(byte).is_err());
        }
    }

    #[test]
    fn test_operand_sizes() {
        assert_eq!(OpCode::JMP.operand_size(), OperandSize::Fixed(2));
        assert_eq!(OpCode::SYSCALL.operand_size(), OperandSize::Fixed(4));
        assert_eq!(OpCode::PUSHA.operand_size(), OperandSize::Fixed(4));
        assert_eq!(OpCode::PUSHDATA2.operand_size(), OperandSize::Prefixed(2));
        assert_eq!(OpCode::ADD.operand_size(), OperandSize::None);
    }

    #[test]
    fn test_is_push() {
        assert!(OpCode::PUSH0.is_push());
        assert!(OpCode::PUSHDATA4.is_push());
        assert!(OpCode::PUSH16.is_push());
        assert!(!OpCode::NOP.is_push());
        assert!(!OpCode::THROW.is_push());
    }
}
