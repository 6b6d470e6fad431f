//! Stack manipulation operations for the Meridian Virtual Machine.

use crate::error::VmResult;
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::jump_table::{context_mut, pop_index, JumpTable};
use crate::op_code::OpCode;
use crate::stack_item::StackItem;

/// Registers the stack manipulation handlers.
pub fn register_handlers(jump_table: &mut JumpTable) {
    jump_table.register(OpCode::DROP, drop_item);
    jump_table.register(OpCode::DUP, dup);
    jump_table.register(OpCode::NIP, nip);
    jump_table.register(OpCode::OVER, over);
    jump_table.register(OpCode::SWAP, swap);
    jump_table.register(OpCode::TUCK, tuck);
    jump_table.register(OpCode::ROT, rot);
    jump_table.register(OpCode::DEPTH, depth);
    jump_table.register(OpCode::XDROP, xdrop);
    jump_table.register(OpCode::XSWAP, xswap);
    jump_table.register(OpCode::XTUCK, xtuck);
    jump_table.register(OpCode::PICK, pick);
    jump_table.register(OpCode::ROLL, roll);
    jump_table.register(OpCode::TOALTSTACK, to_alt_stack);
    jump_table.register(OpCode::FROMALTSTACK, from_alt_stack);
    jump_table.register(OpCode::DUPFROMALTSTACK, dup_from_alt_stack);
    jump_table.register(OpCode::DUPFROMALTSTACKBOTTOM, dup_from_alt_stack_bottom);
    jump_table.register(OpCode::ISNULL, isnull);
}

/// Implements the DROP operation.
fn drop_item(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    context_mut(engine)?.pop()?;
    Ok(())
}

/// Implements the DUP operation.
fn dup(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let item = context.peek(0)?.clone();
    context.push(item);
    Ok(())
}

/// Implements the NIP operation: removes the second item.
fn nip(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    context_mut(engine)?.evaluation_stack_mut().remove(1)?;
    Ok(())
}

/// Implements the OVER operation: copies the second item to the top.
fn over(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let item = context.peek(1)?.clone();
    context.push(item);
    Ok(())
}

/// Implements the SWAP operation.
fn swap(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    context_mut(engine)?.evaluation_stack_mut().swap(0, 1)
}

/// Implements the TUCK operation: copies the top below the second item.
fn tuck(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let item = context.peek(0)?.clone();
    context.evaluation_stack_mut().insert(2, item)
}

/// Implements the ROT operation: moves the third item to the top.
fn rot(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let item = context.evaluation_stack_mut().remove(2)?;
    context.push(item);
    Ok(())
}

/// Implements the DEPTH operation.
fn depth(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let depth = context.evaluation_stack().len();
    context.push(StackItem::from_int(depth as i64));
    Ok(())
}

/// Implements the XDROP operation: removes the item n deep.
fn xdrop(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let n = pop_index(context)?;
    context.evaluation_stack_mut().remove(n)?;
    Ok(())
}

/// Implements the XSWAP operation: swaps the top with the item n deep.
fn xswap(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let n = pop_index(context)?;
    if n == 0 {
        // still requires the top to exist
        context.peek(0)?;
        return Ok(());
    }
    context.evaluation_stack_mut().swap(0, n)
}

/// Implements the XTUCK operation: inserts a copy of the top n deep.
fn xtuck(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let n = pop_index(context)?;
    let item = context.peek(0)?.clone();
    context.evaluation_stack_mut().insert(n, item)
}

/// Implements the PICK operation: copies the item n deep to the top.
fn pick(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let n = pop_index(context)?;
    let item = context.peek(n)?.clone();
    context.push(item);
    Ok(())
}

/// Implements the ROLL operation: moves the item n deep to the top.
fn roll(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let n = pop_index(context)?;
    if n == 0 {
        context.peek(0)?;
        return Ok(());
    }
    let item = context.evaluation_stack_mut().remove(n)?;
    context.push(item);
    Ok(())
}

/// Implements the TOALTSTACK operation.
fn to_alt_stack(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let item = context.evaluation_stack_mut().pop()?;
    context.alt_stack_mut().push(item);
    Ok(())
}

/// Implements the FROMALTSTACK operation.
fn from_alt_stack(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let item = context.alt_stack_mut().pop()?;
    context.evaluation_stack_mut().push(item);
    Ok(())
}

/// Implements the DUPFROMALTSTACK operation.
fn dup_from_alt_stack(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let item = context.alt_stack().peek(0)?.clone();
    context.evaluation_stack_mut().push(item);
    Ok(())
}

/// Implements the DUPFROMALTSTACKBOTTOM operation.
fn dup_from_alt_stack_bottom(
    engine: &mut ExecutionEngine,
    _instruction: &Instruction,
) -> VmResult<()> {
    let context = context_mut(engine)?;
    let item = context.alt_stack().peek_from_bottom(0)?.clone();
    context.evaluation_stack_mut().push(item);
    Ok(())
}

/// Implements the ISNULL operation.
fn isnull(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let context = context_mut(engine)?;
    let item = context.pop()?;
    context.push(StackItem::from_bool(item.is_null()));
    Ok(())
}
