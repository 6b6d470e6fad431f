//! Control flow operations for the Meridian Virtual Machine.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::jump_table::{context_mut, JumpTable};
use crate::op_code::OpCode;
use crate::stack_item::StackItem;

/// Registers the control flow handlers.
pub fn register_handlers(jump_table: &mut JumpTable) {
    jump_table.register(OpCode::NOP, nop);
    jump_table.register(OpCode::JMP, jmp);
    jump_table.register(OpCode::JMPIF, jmpif);
    jump_table.register(OpCode::JMPIFNOT, jmpifnot);
    jump_table.register(OpCode::CALL, call);
    jump_table.register(OpCode::CALLA, calla);
    jump_table.register(OpCode::RET, ret);
    jump_table.register(OpCode::SYSCALL, syscall);
    jump_table.register(OpCode::THROW, throw);
    jump_table.register(OpCode::THROWIFNOT, throwifnot);
}

/// Implements the NOP operation.
fn nop(_engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    Ok(())
}

/// Implements the JMP operation.
fn jmp(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let offset = instruction.token_i16()? as i32;
    engine.execute_jump_offset(offset)
}

/// Implements the JMPIF operation.
fn jmpif(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let offset = instruction.token_i16()? as i32;
    let condition = context_mut(engine)?.pop()?.to_boolean();
    if condition {
        engine.execute_jump_offset(offset)?;
    }
    Ok(())
}

/// Implements the JMPIFNOT operation.
fn jmpifnot(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let offset = instruction.token_i16()? as i32;
    let condition = context_mut(engine)?.pop()?.to_boolean();
    if !condition {
        engine.execute_jump_offset(offset)?;
    }
    Ok(())
}

/// Implements the CALL operation.
fn call(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let offset = instruction.token_i16()? as i64;
    let context = context_mut(engine)?;
    let target = context.instruction_pointer() as i64 + offset;
    if target < 0 {
        return Err(VmError::out_of_range(format!(
            "call target {target} outside script"
        )));
    }
    engine.execute_call(target as usize)
}

/// Implements the CALLA operation: calls through a popped pointer.
fn calla(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let item = context_mut(engine)?.pop()?;
    let pointer = match item {
        StackItem::Pointer(pointer) => pointer,
        other => {
            return Err(VmError::invalid_type(
                "Pointer".to_string(),
                format!("{:?}", other.item_type()),
            ));
        }
    };

    let context = context_mut(engine)?;
    if !pointer.script().same_script(context.script()) {
        return Err(VmError::invalid_operation(
            "pointer does not reference the current script",
        ));
    }
    engine.execute_call(pointer.position())
}

/// Implements the RET operation.
fn ret(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    engine.execute_ret()
}

/// Implements the SYSCALL operation.
fn syscall(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let id = instruction.token_u32()?;
    engine.on_syscall(id)
}

/// Implements the THROW operation.
fn throw(_engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    Err(VmError::throw("explicit throw"))
}

/// Implements the THROWIFNOT operation.
fn throwifnot(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let condition = context_mut(engine)?.pop()?.to_boolean();
    if condition {
        Ok(())
    } else {
        Err(VmError::throw("assertion failed"))
    }
}
