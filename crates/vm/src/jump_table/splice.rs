//! Byte-string operations for the Meridian Virtual Machine.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::jump_table::{context_mut, JumpTable};
use crate::op_code::OpCode;
use crate::stack_item::StackItem;
use num_traits::{Signed, ToPrimitive};

/// Registers the byte-string handlers.
pub fn register_handlers(jump_table: &mut JumpTable) {
    jump_table.register(OpCode::CAT, cat);
    jump_table.register(OpCode::SUBSTR, substr);
    jump_table.register(OpCode::LEFT, left);
    jump_table.register(OpCode::RIGHT, right);
    jump_table.register(OpCode::SIZE, size);
}

/// Pops a non-negative count operand for the splice family.
fn pop_count(engine: &mut ExecutionEngine) -> VmResult<usize> {
    let value = context_mut(engine)?.pop()?.as_int()?;
    if value.is_negative() {
        return Err(VmError::out_of_range(format!("negative count {value}")));
    }
    value
        .to_usize()
        .ok_or_else(|| VmError::out_of_range(format!("count {value} does not fit in usize")))
}

/// Implements the CAT operation.
fn cat(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let context = context_mut(engine)?;
    let b = context.pop()?.as_bytes()?;
    let a = context.pop()?.as_bytes()?;

    let total = a.len() + b.len();
    limits.assert_item_size(total)?;

    let mut result = a;
    result.extend_from_slice(&b);
    context.push(StackItem::from_byte_string(result));
    Ok(())
}

/// Implements the SUBSTR operation.
fn substr(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let count = pop_count(engine)?;
    let context = context_mut(engine)?;
    let index = context.pop()?.as_int()?;
    let data = context.pop()?.as_bytes()?;

    if index.is_negative() {
        return Err(VmError::out_of_range(format!("negative index {index}")));
    }
    let index = index
        .to_usize()
        .ok_or_else(|| VmError::out_of_range("index does not fit in usize".to_string()))?;
    if index > data.len() {
        return Err(VmError::out_of_range(format!(
            "index {index} > length {}",
            data.len()
        )));
    }

    let count = count.min(limits.max_item_size).min(data.len() - index);
    context.push(StackItem::from_byte_string(
        data[index..index + count].to_vec(),
    ));
    Ok(())
}

/// Implements the LEFT operation: a prefix, clamped to the value length.
fn left(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = pop_count(engine)?;
    let context = context_mut(engine)?;
    let data = context.pop()?.as_bytes()?;

    let count = count.min(data.len());
    context.push(StackItem::from_byte_string(data[..count].to_vec()));
    Ok(())
}

/// Implements the RIGHT operation: a suffix of exactly `count` bytes.
fn right(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = pop_count(engine)?;
    let context = context_mut(engine)?;
    let data = context.pop()?.as_bytes()?;

    if count > data.len() {
        return Err(VmError::out_of_range(format!(
            "count {count} > length {}",
            data.len()
        )));
    }
    context.push(StackItem::from_byte_string(
        data[data.len() - count..].to_vec(),
    ));
    Ok(())
}

/// Implements the SIZE operation: the byte length of a primitive.
fn size(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let length = context.pop()?.as_bytes()?.len();
    context.push(StackItem::from_int(length as i64));
    Ok(())
}
