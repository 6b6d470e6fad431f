//! Aggregate operations for the Meridian Virtual Machine.
//!
//! Handlers for arrays, structs and maps. Struct values are deep-cloned at
//! every assignment boundary (`SETITEM`, `APPEND`, `VALUES`), which is what
//! gives structs their pass-by-value semantics.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::jump_table::{context_mut, pop_index, JumpTable};
use crate::op_code::OpCode;
use crate::reference_counter::ReferenceCounter;
use crate::stack_item::StackItem;
use num_traits::{Signed, ToPrimitive};

/// Registers the aggregate handlers.
pub fn register_handlers(jump_table: &mut JumpTable) {
    jump_table.register(OpCode::ARRAYSIZE, arraysize);
    jump_table.register(OpCode::PACK, pack);
    jump_table.register(OpCode::UNPACK, unpack);
    jump_table.register(OpCode::PICKITEM, pickitem);
    jump_table.register(OpCode::SETITEM, setitem);
    jump_table.register(OpCode::NEWARRAY, newarray);
    jump_table.register(OpCode::NEWSTRUCT, newstruct);
    jump_table.register(OpCode::NEWMAP, newmap);
    jump_table.register(OpCode::APPEND, append);
    jump_table.register(OpCode::REVERSE, reverse);
    jump_table.register(OpCode::REMOVE, remove);
    jump_table.register(OpCode::HASKEY, haskey);
    jump_table.register(OpCode::KEYS, keys);
    jump_table.register(OpCode::VALUES, values);
}

fn type_error(expected: &str, actual: &StackItem) -> VmError {
    VmError::invalid_type(expected.to_string(), format!("{:?}", actual.item_type()))
}

/// Deep-clones struct values at assignment boundaries; shares everything else.
fn clone_if_struct(counter: &ReferenceCounter, item: StackItem) -> VmResult<StackItem> {
    match item {
        StackItem::Struct(id) => counter.clone_struct(id),
        other => Ok(other),
    }
}

/// Converts a popped key into an array index.
fn key_to_index(key: &StackItem) -> VmResult<usize> {
    let value = key.as_int()?;
    if value.is_negative() {
        return Err(VmError::out_of_range(format!("negative index {value}")));
    }
    value
        .to_usize()
        .ok_or_else(|| VmError::out_of_range(format!("index {value} does not fit in usize")))
}

fn assert_primitive_key(key: &StackItem) -> VmResult<()> {
    if key.is_primitive() {
        Ok(())
    } else {
        Err(type_error("primitive key", key))
    }
}

/// Implements the ARRAYSIZE operation.
fn arraysize(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;
    let item = context.pop()?;

    let size = match item.compound_id() {
        Some(id) => counter.compound_len(id)?,
        None => item.as_bytes()?.len(),
    };
    context.push(StackItem::from_int(size as i64));
    Ok(())
}

/// Implements the PACK operation.
fn pack(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;

    let n = pop_index(context)?;
    limits.assert_array_size(n)?;
    let available = context.evaluation_stack().len();
    if n > available {
        return Err(VmError::stack_underflow(n, available));
    }

    let mut items = Vec::with_capacity(n);
    for _ in 0..n {
        items.push(context.pop()?);
    }
    context.push(counter.create_array(items));
    Ok(())
}

/// Implements the UNPACK operation.
fn unpack(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;
    let item = context.pop()?;

    let id = match &item {
        StackItem::Array(id) | StackItem::Struct(id) => *id,
        other => return Err(type_error("Array", other)),
    };

    let items = counter.array_items(id)?;
    let count = items.len();
    for element in items.into_iter().rev() {
        context.push(element);
    }
    context.push(StackItem::from_int(count as i64));
    Ok(())
}

/// Implements the PICKITEM operation.
fn pickitem(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;
    let key = context.pop()?;
    let target = context.pop()?;

    let value = match &target {
        StackItem::Map(id) => {
            assert_primitive_key(&key)?;
            counter
                .map_get(*id, &key)?
                .ok_or_else(|| VmError::out_of_range("key not found in map".to_string()))?
        }
        StackItem::Array(id) | StackItem::Struct(id) => {
            let index = key_to_index(&key)?;
            counter.array_get(*id, index)?
        }
        primitive => {
            let bytes = primitive.as_bytes()?;
            let index = key_to_index(&key)?;
            let byte = *bytes.get(index).ok_or_else(|| {
                VmError::out_of_range(format!("index {index} >= {}", bytes.len()))
            })?;
            StackItem::from_int(byte as i64)
        }
    };
    context.push(value);
    Ok(())
}

/// Implements the SETITEM operation.
fn setitem(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;
    let value = context.pop()?;
    let key = context.pop()?;
    let target = context.pop()?;

    let value = clone_if_struct(&counter, value)?;
    match &target {
        StackItem::Map(id) => {
            assert_primitive_key(&key)?;
            if !counter.map_contains(*id, &key)? {
                limits.assert_array_size(counter.compound_len(*id)? + 1)?;
            }
            counter.map_insert(*id, key, value)?;
        }
        StackItem::Array(id) | StackItem::Struct(id) => {
            let index = key_to_index(&key)?;
            counter.array_set(*id, index, value)?;
        }
        other => return Err(type_error("Array or Map", other)),
    }
    Ok(())
}

/// Implements the NEWARRAY operation.
fn newarray(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;
    let item = context.pop()?;

    let array = match &item {
        // already an array: identity is preserved
        StackItem::Array(_) => item.clone(),
        // reinterpret a struct as an array, sharing element references
        StackItem::Struct(id) => counter.create_array(counter.array_items(*id)?),
        _ => {
            let count = key_to_index(&item)?;
            limits.assert_array_size(count)?;
            counter.create_array(vec![StackItem::null(); count])
        }
    };
    context.push(array);
    Ok(())
}

/// Implements the NEWSTRUCT operation.
fn newstruct(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;
    let item = context.pop()?;

    let structure = match &item {
        StackItem::Struct(_) => item.clone(),
        StackItem::Array(id) => counter.create_struct(counter.array_items(*id)?),
        _ => {
            let count = key_to_index(&item)?;
            limits.assert_array_size(count)?;
            counter.create_struct(vec![StackItem::null(); count])
        }
    };
    context.push(structure);
    Ok(())
}

/// Implements the NEWMAP operation.
fn newmap(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;
    context.push(counter.create_map());
    Ok(())
}

/// Implements the APPEND operation.
fn append(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let limits = *engine.limits();
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;
    let value = context.pop()?;
    let target = context.pop()?;

    let id = match &target {
        StackItem::Array(id) | StackItem::Struct(id) => *id,
        other => return Err(type_error("Array", other)),
    };
    limits.assert_array_size(counter.compound_len(id)? + 1)?;

    let value = clone_if_struct(&counter, value)?;
    counter.array_append(id, value)
}

/// Implements the REVERSE operation.
fn reverse(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;
    let target = context.pop()?;

    match &target {
        StackItem::Array(id) | StackItem::Struct(id) => counter.array_reverse(*id),
        other => Err(type_error("Array", other)),
    }
}

/// Implements the REMOVE operation.
fn remove(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;
    let key = context.pop()?;
    let target = context.pop()?;

    match &target {
        StackItem::Map(id) => {
            assert_primitive_key(&key)?;
            // removing an absent key is a no-op
            counter.map_remove(*id, &key)?;
            Ok(())
        }
        StackItem::Array(id) | StackItem::Struct(id) => {
            let index = key_to_index(&key)?;
            counter.array_remove(*id, index)
        }
        other => Err(type_error("Array or Map", other)),
    }
}

/// Implements the HASKEY operation.
fn haskey(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;
    let key = context.pop()?;
    let target = context.pop()?;

    let present = match &target {
        StackItem::Map(id) => {
            assert_primitive_key(&key)?;
            counter.map_contains(*id, &key)?
        }
        StackItem::Array(id) | StackItem::Struct(id) => {
            let index = key_to_index(&key)?;
            index < counter.compound_len(*id)?
        }
        other => return Err(type_error("Array or Map", other)),
    };
    context.push(StackItem::from_bool(present));
    Ok(())
}

/// Implements the KEYS operation.
fn keys(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;
    let target = context.pop()?;

    let id = match &target {
        StackItem::Map(id) => *id,
        other => return Err(type_error("Map", other)),
    };
    let keys = counter.map_keys(id)?;
    context.push(counter.create_array(keys));
    Ok(())
}

/// Implements the VALUES operation.
fn values(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let counter = engine.reference_counter().clone();
    let context = context_mut(engine)?;
    let target = context.pop()?;

    let source = match &target {
        StackItem::Array(id) | StackItem::Struct(id) => counter.array_items(*id)?,
        StackItem::Map(id) => counter.map_values(*id)?,
        other => return Err(type_error("Array or Map", other)),
    };

    let mut result = Vec::with_capacity(source.len());
    for item in source {
        result.push(clone_if_struct(&counter, item)?);
    }
    context.push(counter.create_array(result));
    Ok(())
}
