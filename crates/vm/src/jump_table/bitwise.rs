//! Bitwise and equality operations for the Meridian Virtual Machine.

use crate::error::VmResult;
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::jump_table::{context_mut, pop_integer, push_integer, JumpTable};
use crate::op_code::OpCode;
use crate::stack_item::StackItem;
use num_bigint::BigInt;
use num_traits::One;

/// Registers the bitwise handlers.
pub fn register_handlers(jump_table: &mut JumpTable) {
    jump_table.register(OpCode::INVERT, invert);
    jump_table.register(OpCode::AND, and);
    jump_table.register(OpCode::OR, or);
    jump_table.register(OpCode::XOR, xor);
    jump_table.register(OpCode::EQUAL, equal);
}

/// Implements the INVERT operation.
fn invert(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let value = pop_integer(context, &limits)?;

    // two's-complement NOT
    let result = -(value + BigInt::one());
    push_integer(context, &limits, result)
}

/// Implements the AND operation.
fn and(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    push_integer(context, &limits, a & b)
}

/// Implements the OR operation.
fn or(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    push_integer(context, &limits, a | b)
}

/// Implements the XOR operation.
fn xor(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    push_integer(context, &limits, a ^ b)
}

/// Implements the EQUAL operation over arbitrary stack items.
fn equal(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let b = context.pop()?;
    let a = context.pop()?;
    context.push(StackItem::from_bool(a.equals(&b)));
    Ok(())
}
