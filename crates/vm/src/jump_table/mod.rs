//! Jump table module for the Meridian Virtual Machine.
//!
//! Dispatch table from opcodes to handler functions, split into one
//! submodule per opcode family.

pub mod bitwise;
pub mod compound;
pub mod control;
pub mod numeric;
pub mod push;
pub mod splice;
pub mod stack;

use crate::error::{VmError, VmResult};
use crate::execution_context::ExecutionContext;
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::limits::ExecutionEngineLimits;
use crate::op_code::OpCode;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};
use once_cell::sync::Lazy;

/// A handler for a VM instruction.
pub type InstructionHandler = fn(&mut ExecutionEngine, &Instruction) -> VmResult<()>;

static DEFAULT_TABLE: Lazy<JumpTable> = Lazy::new(JumpTable::with_default_handlers);

/// Dispatch table indexed by opcode byte.
#[derive(Clone)]
pub struct JumpTable {
    handlers: [Option<InstructionHandler>; 256],
}

impl JumpTable {
    /// Creates an empty jump table.
    pub fn new() -> Self {
        Self {
            handlers: [None; 256],
        }
    }

    /// Creates a jump table with every standard handler registered.
    pub fn with_default_handlers() -> Self {
        let mut jump_table = Self::new();
        bitwise::register_handlers(&mut jump_table);
        compound::register_handlers(&mut jump_table);
        control::register_handlers(&mut jump_table);
        numeric::register_handlers(&mut jump_table);
        push::register_handlers(&mut jump_table);
        splice::register_handlers(&mut jump_table);
        stack::register_handlers(&mut jump_table);
        jump_table
    }

    /// Registers a handler for an opcode, replacing any previous one.
    pub fn register(&mut self, opcode: OpCode, handler: InstructionHandler) {
        self.handlers[opcode as usize] = Some(handler);
    }

    /// Returns the handler for an opcode.
    pub fn handler_for(&self, opcode: OpCode) -> Option<InstructionHandler> {
        self.handlers[opcode as usize]
    }
}

impl Default for JumpTable {
    fn default() -> Self {
        DEFAULT_TABLE.clone()
    }
}

/// Returns the current frame or fails the step.
pub(crate) fn context_mut(engine: &mut ExecutionEngine) -> VmResult<&mut ExecutionContext> {
    engine
        .current_context_mut()
        .ok_or_else(|| VmError::invalid_operation("no current context"))
}

/// Pops an integer operand, enforcing the big-integer size bound.
pub(crate) fn pop_integer(
    context: &mut ExecutionContext,
    limits: &ExecutionEngineLimits,
) -> VmResult<BigInt> {
    let value = context.pop()?.as_int()?;
    limits.assert_big_integer(&value)?;
    Ok(value)
}

/// Pushes an integer result, enforcing the big-integer size bound.
pub(crate) fn push_integer(
    context: &mut ExecutionContext,
    limits: &ExecutionEngineLimits,
    value: BigInt,
) -> VmResult<()> {
    limits.assert_big_integer(&value)?;
    context.push(crate::stack_item::StackItem::Integer(value));
    Ok(())
}

/// Pops a non-negative index operand.
pub(crate) fn pop_index(context: &mut ExecutionContext) -> VmResult<usize> {
    let value = context.pop()?.as_int()?;
    if value.is_negative() {
        return Err(VmError::out_of_range(format!("negative index {value}")));
    }
    value
        .to_usize()
        .ok_or_else(|| VmError::out_of_range(format!("index {value} does not fit in usize")))
}
