//! Numeric operations for the Meridian Virtual Machine.
//!
//! Every integer operand and every integer result is checked against the
//! engine's big-integer size bound.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::jump_table::{context_mut, pop_integer, push_integer, JumpTable};
use crate::op_code::OpCode;
use crate::stack_item::StackItem;
use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};

/// Registers the numeric handlers.
pub fn register_handlers(jump_table: &mut JumpTable) {
    jump_table.register(OpCode::INC, inc);
    jump_table.register(OpCode::DEC, dec);
    jump_table.register(OpCode::SIGN, sign);
    jump_table.register(OpCode::NEGATE, negate);
    jump_table.register(OpCode::ABS, abs);
    jump_table.register(OpCode::NOT, not);
    jump_table.register(OpCode::NZ, nz);
    jump_table.register(OpCode::ADD, add);
    jump_table.register(OpCode::SUB, sub);
    jump_table.register(OpCode::MUL, mul);
    jump_table.register(OpCode::DIV, div);
    jump_table.register(OpCode::MOD, modulo);
    jump_table.register(OpCode::SHL, shl);
    jump_table.register(OpCode::SHR, shr);
    jump_table.register(OpCode::BOOLAND, booland);
    jump_table.register(OpCode::BOOLOR, boolor);
    jump_table.register(OpCode::NUMEQUAL, numequal);
    jump_table.register(OpCode::NUMNOTEQUAL, numnotequal);
    jump_table.register(OpCode::LT, lt);
    jump_table.register(OpCode::GT, gt);
    jump_table.register(OpCode::LTE, lte);
    jump_table.register(OpCode::GTE, gte);
    jump_table.register(OpCode::MIN, min);
    jump_table.register(OpCode::MAX, max);
    jump_table.register(OpCode::WITHIN, within);
}

/// Implements the INC operation.
fn inc(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let value = pop_integer(context, &limits)?;
    push_integer(context, &limits, value + BigInt::one())
}

/// Implements the DEC operation.
fn dec(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let value = pop_integer(context, &limits)?;
    push_integer(context, &limits, value - BigInt::one())
}

/// Implements the SIGN operation.
fn sign(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let value = pop_integer(context, &limits)?;

    let result = if value.is_zero() {
        BigInt::zero()
    } else if value.is_positive() {
        BigInt::one()
    } else {
        -BigInt::one()
    };
    context.push(StackItem::Integer(result));
    Ok(())
}

/// Implements the NEGATE operation.
fn negate(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let value = pop_integer(context, &limits)?;
    push_integer(context, &limits, -value)
}

/// Implements the ABS operation.
fn abs(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let value = pop_integer(context, &limits)?;
    push_integer(context, &limits, value.abs())
}

/// Implements the NOT operation.
fn not(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let value = context.pop()?.to_boolean();
    context.push(StackItem::from_bool(!value));
    Ok(())
}

/// Implements the NZ operation.
fn nz(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let value = pop_integer(context, &limits)?;
    context.push(StackItem::from_bool(!value.is_zero()));
    Ok(())
}

/// Implements the ADD operation.
fn add(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    push_integer(context, &limits, a + b)
}

/// Implements the SUB operation.
fn sub(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    push_integer(context, &limits, a - b)
}

/// Implements the MUL operation.
fn mul(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    push_integer(context, &limits, a * b)
}

/// Implements the DIV operation (truncated toward zero).
fn div(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    if b.is_zero() {
        return Err(VmError::division_by_zero("DIV"));
    }
    push_integer(context, &limits, a / b)
}

/// Implements the MOD operation (remainder keeps the dividend's sign).
fn modulo(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    if b.is_zero() {
        return Err(VmError::division_by_zero("MOD"));
    }
    push_integer(context, &limits, a % b)
}

/// Shifts `value` left by `shift` bits; negative counts shift right.
fn shift_left(value: BigInt, shift: i64) -> BigInt {
    if shift >= 0 {
        value << shift as usize
    } else {
        value >> (-shift) as usize
    }
}

/// Implements the SHL operation.
///
/// A zero shift consumes only the shift operand and leaves the value alone.
fn shl(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let shift = pop_shift(context, &limits)?;
    if shift == 0 {
        context.peek(0)?;
        return Ok(());
    }
    let value = pop_integer(context, &limits)?;
    push_integer(context, &limits, shift_left(value, shift))
}

/// Implements the SHR operation.
///
/// A zero shift consumes only the shift operand and leaves the value alone.
fn shr(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let shift = pop_shift(context, &limits)?;
    if shift == 0 {
        context.peek(0)?;
        return Ok(());
    }
    let value = pop_integer(context, &limits)?;
    push_integer(context, &limits, shift_left(value, -shift))
}

/// Pops a shift count and validates it against the shift window.
fn pop_shift(
    context: &mut crate::execution_context::ExecutionContext,
    limits: &crate::limits::ExecutionEngineLimits,
) -> VmResult<i64> {
    let value = context.pop()?.as_int()?;
    let shift = value
        .to_i64()
        .ok_or_else(|| VmError::out_of_range(format!("shift count {value} out of range")))?;
    limits.assert_shift(shift)?;
    Ok(shift)
}

/// Implements the BOOLAND operation.
fn booland(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let b = context.pop()?.to_boolean();
    let a = context.pop()?.to_boolean();
    context.push(StackItem::from_bool(a && b));
    Ok(())
}

/// Implements the BOOLOR operation.
fn boolor(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let b = context.pop()?.to_boolean();
    let a = context.pop()?.to_boolean();
    context.push(StackItem::from_bool(a || b));
    Ok(())
}

/// Implements the NUMEQUAL operation.
fn numequal(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    context.push(StackItem::from_bool(a == b));
    Ok(())
}

/// Implements the NUMNOTEQUAL operation.
fn numnotequal(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    context.push(StackItem::from_bool(a != b));
    Ok(())
}

/// Implements the LT operation.
fn lt(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    context.push(StackItem::from_bool(a < b));
    Ok(())
}

/// Implements the GT operation.
fn gt(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    context.push(StackItem::from_bool(a > b));
    Ok(())
}

/// Implements the LTE operation.
fn lte(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    context.push(StackItem::from_bool(a <= b));
    Ok(())
}

/// Implements the GTE operation.
fn gte(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    context.push(StackItem::from_bool(a >= b));
    Ok(())
}

/// Implements the MIN operation.
fn min(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    push_integer(context, &limits, a.min(b))
}

/// Implements the MAX operation.
fn max(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    push_integer(context, &limits, a.max(b))
}

/// Implements the WITHIN operation: pushes `a <= x < b`.
fn within(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = pop_integer(context, &limits)?;
    let a = pop_integer(context, &limits)?;
    let x = pop_integer(context, &limits)?;
    context.push(StackItem::from_bool(a <= x && x < b));
    Ok(())
}
