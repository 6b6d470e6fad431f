//! Stack item module for the Meridian Virtual Machine.
//!
//! Run-time values are a tagged sum. Primitives (booleans, integers, byte
//! strings, buffers) are value-like and carry their payload inline.
//! Compounds (arrays, structs, maps) carry only an arena id; the
//! [`ReferenceCounter`](crate::reference_counter::ReferenceCounter) owns
//! their element storage, which is what gives them object identity.

use crate::error::{VmError, VmResult};
use crate::reference_counter::CompoundId;
use crate::script::Script;
use num_bigint::BigInt;
use num_traits::Zero;
use std::fmt;
use std::sync::Arc;

/// Maximum encoded size in bytes of an integer obtained from a byte view.
pub const MAX_INTEGER_SIZE: usize = 32;

/// Encodes an integer in minimal two's-complement little-endian form.
///
/// Zero encodes as the empty byte string.
pub fn encode_integer(value: &BigInt) -> Vec<u8> {
    if value.is_zero() {
        return Vec::new();
    }
    value.to_signed_bytes_le()
}

/// Decodes a little-endian two's-complement byte span into an integer.
///
/// The bytes are read verbatim; non-minimal encodings are accepted.
pub fn decode_integer(bytes: &[u8]) -> BigInt {
    if bytes.is_empty() {
        return BigInt::zero();
    }
    BigInt::from_signed_bytes_le(bytes)
}

/// Returns the minimal two's-complement encoded size of an integer.
pub fn integer_byte_size(value: &BigInt) -> usize {
    if value.is_zero() {
        0
    } else {
        value.to_signed_bytes_le().len()
    }
}

/// A trait for host-owned handles that can be wrapped by a stack item.
pub trait InteropInterface: fmt::Debug + Send + Sync {
    /// Gets the type of the interop interface.
    fn interface_type(&self) -> &str;

    /// Allows downcasting to concrete types.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A first-class call target: a script plus an offset into it.
#[derive(Debug, Clone)]
pub struct Pointer {
    script: Script,
    position: usize,
}

impl Pointer {
    /// Creates a new pointer.
    pub fn new(script: Script, position: usize) -> Self {
        Self { script, position }
    }

    /// Returns the script the pointer refers to.
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Returns the offset the pointer refers to.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl PartialEq for Pointer {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position && self.script.same_script(&other.script)
    }
}

impl Eq for Pointer {}

/// The type tag of a stack item.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackItemType {
    /// The null value.
    Any = 0x00,
    /// A pointer into a script.
    Pointer = 0x10,
    Boolean = 0x20,
    Integer = 0x21,
    ByteString = 0x28,
    Buffer = 0x30,
    Array = 0x40,
    Struct = 0x41,
    Map = 0x48,
    /// A host-owned handle.
    InteropInterface = 0x60,
}

/// Represents a value in the Meridian VM.
#[derive(Debug, Clone)]
pub enum StackItem {
    /// Represents the absent value.
    Null,

    /// Represents a boolean value.
    Boolean(bool),

    /// Represents an arbitrary-precision integer.
    Integer(BigInt),

    /// Represents an immutable byte string.
    ByteString(Vec<u8>),

    /// Represents a mutable byte buffer.
    Buffer(Vec<u8>),

    /// Represents an ordered sequence of items, stored in the arena.
    Array(CompoundId),

    /// Represents a struct with pass-by-value assignment semantics.
    Struct(CompoundId),

    /// Represents an insertion-ordered map with primitive keys.
    Map(CompoundId),

    /// Represents a pointer to a position in a script.
    Pointer(Pointer),

    /// Represents an interop interface.
    InteropInterface(Arc<dyn InteropInterface>),
}

impl StackItem {
    /// The singleton null value.
    pub fn null() -> Self {
        StackItem::Null
    }

    /// The true value.
    pub fn true_value() -> Self {
        StackItem::Boolean(true)
    }

    /// The false value.
    pub fn false_value() -> Self {
        StackItem::Boolean(false)
    }

    /// Creates a boolean stack item.
    pub fn from_bool(value: bool) -> Self {
        StackItem::Boolean(value)
    }

    /// Creates an integer stack item.
    pub fn from_int<T: Into<BigInt>>(value: T) -> Self {
        StackItem::Integer(value.into())
    }

    /// Creates a byte string stack item.
    pub fn from_byte_string<T: Into<Vec<u8>>>(value: T) -> Self {
        StackItem::ByteString(value.into())
    }

    /// Creates a buffer stack item.
    pub fn from_buffer<T: Into<Vec<u8>>>(value: T) -> Self {
        StackItem::Buffer(value.into())
    }

    /// Creates a pointer stack item.
    pub fn from_pointer(script: Script, position: usize) -> Self {
        StackItem::Pointer(Pointer::new(script, position))
    }

    /// Creates an interop interface stack item.
    pub fn from_interface<T: InteropInterface + 'static>(value: T) -> Self {
        StackItem::InteropInterface(Arc::new(value))
    }

    /// Returns the type tag of the stack item.
    pub fn item_type(&self) -> StackItemType {
        match self {
            StackItem::Null => StackItemType::Any,
            StackItem::Boolean(_) => StackItemType::Boolean,
            StackItem::Integer(_) => StackItemType::Integer,
            StackItem::ByteString(_) => StackItemType::ByteString,
            StackItem::Buffer(_) => StackItemType::Buffer,
            StackItem::Array(_) => StackItemType::Array,
            StackItem::Struct(_) => StackItemType::Struct,
            StackItem::Map(_) => StackItemType::Map,
            StackItem::Pointer(_) => StackItemType::Pointer,
            StackItem::InteropInterface(_) => StackItemType::InteropInterface,
        }
    }

    /// Returns `true` if the stack item is null.
    pub fn is_null(&self) -> bool {
        matches!(self, StackItem::Null)
    }

    /// Returns `true` for primitive items (the ones with a byte view).
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            StackItem::Boolean(_)
                | StackItem::Integer(_)
                | StackItem::ByteString(_)
                | StackItem::Buffer(_)
        )
    }

    /// Returns `true` for compound items (the ones with identity).
    pub fn is_compound(&self) -> bool {
        self.compound_id().is_some()
    }

    /// Returns the arena id of a compound item.
    pub fn compound_id(&self) -> Option<CompoundId> {
        match self {
            StackItem::Array(id) | StackItem::Struct(id) | StackItem::Map(id) => Some(*id),
            _ => None,
        }
    }

    /// Converts the stack item to a boolean. Total over all variants.
    pub fn to_boolean(&self) -> bool {
        match self {
            StackItem::Null => false,
            StackItem::Boolean(value) => *value,
            StackItem::Integer(value) => !value.is_zero(),
            StackItem::ByteString(bytes) | StackItem::Buffer(bytes) => {
                // Anything longer than an integer can encode is truthy
                // without scanning.
                bytes.len() > MAX_INTEGER_SIZE || bytes.iter().any(|&byte| byte != 0)
            }
            StackItem::Array(_) | StackItem::Struct(_) | StackItem::Map(_) => true,
            StackItem::Pointer(_) => true,
            StackItem::InteropInterface(_) => true,
        }
    }

    /// Converts the stack item to an integer.
    ///
    /// Byte views longer than [`MAX_INTEGER_SIZE`] bytes are rejected.
    pub fn as_int(&self) -> VmResult<BigInt> {
        match self {
            StackItem::Boolean(value) => Ok(BigInt::from(if *value { 1 } else { 0 })),
            StackItem::Integer(value) => Ok(value.clone()),
            StackItem::ByteString(bytes) | StackItem::Buffer(bytes) => {
                if bytes.len() > MAX_INTEGER_SIZE {
                    return Err(VmError::integer_too_large(bytes.len(), MAX_INTEGER_SIZE));
                }
                Ok(decode_integer(bytes))
            }
            _ => Err(VmError::invalid_type(
                "Integer".to_string(),
                format!("{:?}", self.item_type()),
            )),
        }
    }

    /// Converts the stack item to its canonical byte span.
    pub fn as_bytes(&self) -> VmResult<Vec<u8>> {
        match self {
            StackItem::Boolean(value) => Ok(if *value { vec![1] } else { Vec::new() }),
            StackItem::Integer(value) => Ok(encode_integer(value)),
            StackItem::ByteString(bytes) | StackItem::Buffer(bytes) => Ok(bytes.clone()),
            _ => Err(VmError::invalid_type(
                "ByteString".to_string(),
                format!("{:?}", self.item_type()),
            )),
        }
    }

    /// Converts the stack item to the specified type.
    ///
    /// Conversions are total within the primitive set and fail everywhere
    /// else; converting a byte string to a buffer copies the bytes.
    pub fn convert_to(&self, target: StackItemType) -> VmResult<StackItem> {
        if self.item_type() == target {
            return Ok(self.clone());
        }
        if !self.is_primitive() {
            return Err(VmError::invalid_type(
                format!("{target:?}"),
                format!("{:?}", self.item_type()),
            ));
        }

        match target {
            StackItemType::Boolean => Ok(StackItem::Boolean(self.to_boolean())),
            StackItemType::Integer => Ok(StackItem::Integer(self.as_int()?)),
            StackItemType::ByteString => Ok(StackItem::ByteString(self.as_bytes()?)),
            StackItemType::Buffer => Ok(StackItem::Buffer(self.as_bytes()?)),
            _ => Err(VmError::invalid_type(
                format!("{target:?}"),
                format!("{:?}", self.item_type()),
            )),
        }
    }

    /// Checks two stack items for equality.
    ///
    /// Primitives compare by canonical byte span (integers normalized to
    /// minimal form), compounds by identity, null only to null.
    pub fn equals(&self, other: &StackItem) -> bool {
        match (self, other) {
            (StackItem::Null, StackItem::Null) => true,
            (StackItem::Null, _) | (_, StackItem::Null) => false,
            (StackItem::Pointer(a), StackItem::Pointer(b)) => a == b,
            (StackItem::InteropInterface(a), StackItem::InteropInterface(b)) => Arc::ptr_eq(a, b),
            _ => match (self.compound_id(), other.compound_id()) {
                (Some(a), Some(b)) => a == b,
                (None, None) => match (self.as_bytes(), other.as_bytes()) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                },
                _ => false,
            },
        }
    }
}

impl PartialEq for StackItem {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for StackItem {}
