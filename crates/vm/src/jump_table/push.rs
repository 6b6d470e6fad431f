//! Literal push operations for the Meridian Virtual Machine.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::jump_table::{context_mut, JumpTable};
use crate::op_code::OpCode;
use crate::stack_item::StackItem;

/// Registers the literal push handlers.
pub fn register_handlers(jump_table: &mut JumpTable) {
    jump_table.register(OpCode::PUSH0, push0);
    jump_table.register(OpCode::PUSHBYTES, push_bytes);
    jump_table.register(OpCode::PUSHDATA1, push_data);
    jump_table.register(OpCode::PUSHDATA2, push_data);
    jump_table.register(OpCode::PUSHDATA4, push_data);
    jump_table.register(OpCode::PUSHM1, push_small_int);
    jump_table.register(OpCode::PUSHNULL, push_null);
    jump_table.register(OpCode::PUSH1, push_small_int);
    jump_table.register(OpCode::PUSH2, push_small_int);
    jump_table.register(OpCode::PUSH3, push_small_int);
    jump_table.register(OpCode::PUSH4, push_small_int);
    jump_table.register(OpCode::PUSH5, push_small_int);
    jump_table.register(OpCode::PUSH6, push_small_int);
    jump_table.register(OpCode::PUSH7, push_small_int);
    jump_table.register(OpCode::PUSH8, push_small_int);
    jump_table.register(OpCode::PUSH9, push_small_int);
    jump_table.register(OpCode::PUSH10, push_small_int);
    jump_table.register(OpCode::PUSH11, push_small_int);
    jump_table.register(OpCode::PUSH12, push_small_int);
    jump_table.register(OpCode::PUSH13, push_small_int);
    jump_table.register(OpCode::PUSH14, push_small_int);
    jump_table.register(OpCode::PUSH15, push_small_int);
    jump_table.register(OpCode::PUSH16, push_small_int);
    jump_table.register(OpCode::PUSHA, pusha);
}

/// Implements the PUSH0 operation: pushes an empty byte string.
fn push0(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    context.push(StackItem::from_byte_string(Vec::new()));
    Ok(())
}

/// Implements the PUSHBYTES1..75 operations.
fn push_bytes(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    limits.assert_item_size(instruction.operand().len())?;

    let context = context_mut(engine)?;
    context.push(StackItem::from_byte_string(instruction.operand().to_vec()));
    Ok(())
}

/// Implements the PUSHDATA1/2/4 operations.
fn push_data(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    limits.assert_item_size(instruction.operand().len())?;

    let context = context_mut(engine)?;
    context.push(StackItem::from_byte_string(instruction.operand().to_vec()));
    Ok(())
}

/// Implements PUSHM1 and PUSH1..PUSH16: pushes the constant −1..16.
fn push_small_int(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let value: i32 = match instruction.opcode() {
        OpCode::PUSHM1 => -1,
        opcode => opcode as i32 - OpCode::PUSHNULL as i32,
    };

    let context = context_mut(engine)?;
    context.push(StackItem::from_int(value));
    Ok(())
}

/// Implements the PUSHNULL operation.
fn push_null(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    context.push(StackItem::null());
    Ok(())
}

/// Implements the PUSHA operation: pushes a pointer into the current script.
fn pusha(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let offset = instruction.token_i32()?;
    let context = context_mut(engine)?;

    let target = context.instruction_pointer() as i64 + offset as i64;
    let script_len = context.script().len() as i64;
    if target < 0 || target > script_len {
        return Err(VmError::out_of_range(format!(
            "pointer target {target} outside [0, {script_len}]"
        )));
    }

    let pointer = StackItem::from_pointer(context.script().clone(), target as usize);
    context.push(pointer);
    Ok(())
}
