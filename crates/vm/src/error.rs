//! Error types for the Meridian VM crate.
//!
//! Every failure in the core is expressed as a [`VmError`]; the execution
//! engine converts any error surfacing from a step into the FAULT state.

use thiserror::Error;

/// VM execution errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Instruction decode error (malformed immediate, truncated operand)
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Unknown opcode byte
    #[error("Invalid opcode: {opcode:#04x}")]
    InvalidOpCode { opcode: u8 },

    /// Invalid operation with context
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    /// A pop or accessor yielded the wrong stack item variant
    #[error("Invalid type: expected {expected}, got {actual}")]
    InvalidType { expected: String, actual: String },

    /// Pop or peek past the stack depth
    #[error(
        "Stack underflow: attempted to access {requested} items, but only {available} available"
    )]
    StackUnderflow { requested: usize, available: usize },

    /// Index, offset or shift outside its permitted range
    #[error("Out of range: {message}")]
    OutOfRange { message: String },

    /// Division or remainder by zero
    #[error("Division by zero in operation: {operation}")]
    DivisionByZero { operation: String },

    /// A byte string or buffer exceeds `MaxItemSize`
    #[error("Item too large: {size} bytes, limit {limit}")]
    ItemTooLarge { size: usize, limit: usize },

    /// An array, struct or map exceeds `MaxArraySize`
    #[error("Collection too large: {size} entries, limit {limit}")]
    ArrayTooLarge { size: usize, limit: usize },

    /// A big integer exceeds `MaxSizeForBigInteger`
    #[error("Integer too large: {size} bytes, limit {limit}")]
    IntegerTooLarge { size: usize, limit: usize },

    /// The aggregate stack item count exceeds `MaxStackSize`
    #[error("Stack overflow: {count} items, limit {limit}")]
    StackOverflow { count: usize, limit: usize },

    /// The invocation stack exceeds `MaxInvocationStackSize`
    #[error("Invocation stack overflow: depth {depth}, limit {limit}")]
    InvocationStackOverflow { depth: usize, limit: usize },

    /// A syscall failed or no handler is registered for its id
    #[error("Host error: {message}")]
    HostError { message: String },

    /// Explicit `THROW` or failed `THROWIFNOT`
    #[error("Script exception: {message}")]
    Throw { message: String },
}

impl VmError {
    /// Creates a new parse error.
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a new invalid opcode error.
    pub fn invalid_opcode(opcode: u8) -> Self {
        Self::InvalidOpCode { opcode }
    }

    /// Creates a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(message: S) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a new invalid type error.
    pub fn invalid_type<S: Into<String>>(expected: S, actual: S) -> Self {
        Self::InvalidType {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new stack underflow error.
    pub fn stack_underflow(requested: usize, available: usize) -> Self {
        Self::StackUnderflow {
            requested,
            available,
        }
    }

    /// Creates a new out of range error.
    pub fn out_of_range<S: Into<String>>(message: S) -> Self {
        Self::OutOfRange {
            message: message.into(),
        }
    }

    /// Creates a new division by zero error.
    pub fn division_by_zero<S: Into<String>>(operation: S) -> Self {
        Self::DivisionByZero {
            operation: operation.into(),
        }
    }

    /// Creates a new item too large error.
    pub fn item_too_large(size: usize, limit: usize) -> Self {
        Self::ItemTooLarge { size, limit }
    }

    /// Creates a new collection too large error.
    pub fn array_too_large(size: usize, limit: usize) -> Self {
        Self::ArrayTooLarge { size, limit }
    }

    /// Creates a new integer too large error.
    pub fn integer_too_large(size: usize, limit: usize) -> Self {
        Self::IntegerTooLarge { size, limit }
    }

    /// Creates a new stack overflow error.
    pub fn stack_overflow(count: usize, limit: usize) -> Self {
        Self::StackOverflow { count, limit }
    }

    /// Creates a new invocation stack overflow error.
    pub fn invocation_stack_overflow(depth: usize, limit: usize) -> Self {
        Self::InvocationStackOverflow { depth, limit }
    }

    /// Creates a new host error.
    pub fn host_error<S: Into<String>>(message: S) -> Self {
        Self::HostError {
            message: message.into(),
        }
    }

    /// Creates a new script exception error.
    pub fn throw<S: Into<String>>(message: S) -> Self {
        Self::Throw {
            message: message.into(),
        }
    }
}

/// Result type for VM operations.
pub type VmResult<T> = Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VmError::stack_underflow(2, 1);
        assert_eq!(
            err.to_string(),
            "Stack underflow: attempted to access 2 items, but only 1 available"
        );

        let err = VmError::invalid_opcode(0xEE);
        assert_eq!(err.to_string(), "Invalid opcode: 0xee");
    }

    #[test]
    fn test_helper_constructors() {
        assert!(matches!(
            VmError::division_by_zero("DIV"),
            VmError::DivisionByZero { .. }
        ));
        assert!(matches!(
            VmError::invalid_type("Pointer", "Integer"),
            VmError::InvalidType { .. }
        ));
    }
}
