//! Integration tests for the Meridian VM execution engine.

use meridian_vm::{
    ExecutionEngine, ExecutionEngineLimits, OpCode, Script, ScriptBuilder, StackItem, VMState,
};
use num_bigint::BigInt;

fn run(script: Script) -> ExecutionEngine {
    let mut engine = ExecutionEngine::new(None);
    engine.load_script(script, -1).expect("load should succeed");
    engine.execute();
    engine
}

#[test]
fn test_simple_addition() {
    let script = Script::new(vec![
        OpCode::PUSH1 as u8,
        OpCode::PUSH2 as u8,
        OpCode::ADD as u8,
        OpCode::RET as u8,
    ]);

    let engine = run(script);
    assert_eq!(engine.state(), VMState::HALT);
    assert_eq!(engine.result_stack().len(), 1);
    assert_eq!(
        engine
            .result_stack()
            .peek(0)
            .expect("result")
            .as_int()
            .expect("as_int"),
        BigInt::from(3)
    );
}

#[test]
fn test_pointer_call_and_return() {
    // 0: PUSHA +7  5: CALLA  6: RET  7: PUSH0  8: RET
    let mut builder = ScriptBuilder::new();
    builder
        .emit_pusha(7)
        .emit(OpCode::CALLA)
        .emit(OpCode::RET)
        .emit(OpCode::PUSH0)
        .emit(OpCode::RET);
    let script = builder.to_script();

    let mut engine = ExecutionEngine::new(None);
    engine.load_script(script, -1).expect("load should succeed");

    // PUSHA leaves a pointer to offset 7 and pauses
    assert_eq!(engine.step(), VMState::BREAK);
    {
        let top = engine.peek(0).expect("pointer on stack");
        match top {
            StackItem::Pointer(pointer) => assert_eq!(pointer.position(), 7),
            other => panic!("expected a pointer, got {other:?}"),
        }
    }

    // CALLA pushes a second frame starting at offset 7
    assert_eq!(engine.step(), VMState::BREAK);
    assert_eq!(engine.invocation_stack().len(), 2);
    assert_eq!(
        engine
            .current_context()
            .expect("inner frame")
            .instruction_pointer(),
        7
    );

    // inner PUSH0
    assert_eq!(engine.step(), VMState::BREAK);
    assert_eq!(
        engine
            .current_context()
            .expect("inner frame")
            .evaluation_stack()
            .len(),
        1
    );

    // inner RET hands the value to the caller
    assert_eq!(engine.step(), VMState::BREAK);
    assert_eq!(engine.invocation_stack().len(), 1);
    assert_eq!(
        engine
            .current_context()
            .expect("outer frame")
            .evaluation_stack()
            .len(),
        1
    );

    // outer RET halts with the value on the result stack
    assert_eq!(engine.step(), VMState::HALT);
    assert_eq!(engine.result_stack().len(), 1);
    assert_eq!(
        engine
            .result_stack()
            .peek(0)
            .expect("result")
            .as_int()
            .expect("as_int"),
        BigInt::from(0)
    );
}

#[test]
fn test_calla_with_wrong_type_faults() {
    let script = Script::new(vec![OpCode::PUSH2 as u8, OpCode::CALLA as u8]);

    let mut engine = ExecutionEngine::new(None);
    engine.load_script(script, -1).expect("load should succeed");

    assert_eq!(engine.step(), VMState::BREAK);
    assert_eq!(
        engine.peek(0).expect("top").as_int().expect("as_int"),
        BigInt::from(2)
    );

    assert_eq!(engine.step(), VMState::FAULT);
}

#[test]
fn test_self_referencing_array_is_reclaimed() {
    // arr = []; arr.append(arr); drop arr
    let script = Script::new(vec![
        OpCode::PUSH0 as u8,
        OpCode::NEWARRAY as u8,
        OpCode::DUP as u8,
        OpCode::DUP as u8,
        OpCode::APPEND as u8,
        OpCode::DROP as u8,
        OpCode::RET as u8,
    ]);

    let mut engine = ExecutionEngine::new(None);
    engine.load_script(script, -1).expect("load should succeed");

    for _ in 0..5 {
        assert_eq!(engine.step(), VMState::BREAK);
    }
    // after APPEND the array holds itself: one stack slot + one element slot
    assert_eq!(engine.stack_item_count(), 2);

    // DROP removes the last stack reference; the sweep reclaims the cycle
    assert_eq!(engine.step(), VMState::BREAK);
    assert_eq!(engine.stack_item_count(), 0);
    assert_eq!(engine.reference_counter().compound_count(), 0);

    assert_eq!(engine.step(), VMState::HALT);
}

#[test]
fn test_oversized_integer_faults_on_arithmetic() {
    let mut builder = ScriptBuilder::new();
    builder.emit_push(&[0x01; 33]).emit(OpCode::INC);

    let engine = run(builder.to_script());
    assert_eq!(engine.state(), VMState::FAULT);
}

#[test]
fn test_struct_copies_have_distinct_identity() {
    // s = struct{1, 2}; arr = [s, s]; arr[0][0] = 5
    let mut builder = ScriptBuilder::new();
    builder
        .emit(OpCode::PUSH2)
        .emit(OpCode::NEWSTRUCT)
        // s[0] = 1
        .emit(OpCode::DUP)
        .emit(OpCode::PUSH0)
        .emit(OpCode::PUSH1)
        .emit(OpCode::SETITEM)
        // s[1] = 2
        .emit(OpCode::DUP)
        .emit(OpCode::PUSH1)
        .emit(OpCode::PUSH2)
        .emit(OpCode::SETITEM)
        // arr = [null, null]
        .emit(OpCode::PUSH2)
        .emit(OpCode::NEWARRAY)
        // arr[0] = s (deep clone)
        .emit(OpCode::DUP)
        .emit(OpCode::PUSH0)
        .emit(OpCode::PUSH3)
        .emit(OpCode::PICK)
        .emit(OpCode::SETITEM)
        // arr[1] = s (second deep clone)
        .emit(OpCode::DUP)
        .emit(OpCode::PUSH1)
        .emit(OpCode::PUSH3)
        .emit(OpCode::PICK)
        .emit(OpCode::SETITEM)
        // arr[0][0] = 5
        .emit(OpCode::DUP)
        .emit(OpCode::PUSH0)
        .emit(OpCode::PICKITEM)
        .emit(OpCode::PUSH0)
        .emit(OpCode::PUSH5)
        .emit(OpCode::SETITEM)
        .emit(OpCode::RET);

    let engine = run(builder.to_script());
    assert_eq!(engine.state(), VMState::HALT);

    // result stack: [s, arr]
    let counter = engine.reference_counter();
    let arr = engine.result_stack().peek(0).expect("array");
    let s = engine.result_stack().peek(1).expect("struct");
    let arr_id = arr.compound_id().expect("array id");
    let s_id = s.compound_id().expect("struct id");

    let elements = counter.array_items(arr_id).expect("array items");
    let first_id = elements[0].compound_id().expect("first copy id");
    let second_id = elements[1].compound_id().expect("second copy id");

    // both copies are identity-distinct from the source and each other
    assert_ne!(first_id, s_id);
    assert_ne!(second_id, s_id);
    assert_ne!(first_id, second_id);

    let first = counter.array_items(first_id).expect("first items");
    let second = counter.array_items(second_id).expect("second items");
    let source = counter.array_items(s_id).expect("source items");
    assert_eq!(first[0].as_int().expect("int"), BigInt::from(5));
    assert_eq!(second[0].as_int().expect("int"), BigInt::from(1));
    assert_eq!(source[0].as_int().expect("int"), BigInt::from(1));
}

#[test]
fn test_cat_beyond_item_size_faults() {
    let limits = ExecutionEngineLimits {
        max_item_size: 16,
        ..Default::default()
    };

    // two pieces of max_item_size / 2 + 1 bytes each
    let mut builder = ScriptBuilder::new();
    builder
        .emit_push(&[0xAA; 9])
        .emit_push(&[0xBB; 9])
        .emit(OpCode::CAT);

    let mut engine = ExecutionEngine::with_limits(None, limits);
    engine
        .load_script(builder.to_script(), -1)
        .expect("load should succeed");
    assert_eq!(engine.execute(), VMState::FAULT);
}

#[test]
fn test_jump_to_script_end_falls_through() {
    // JMP +3 lands exactly on the script length, which returns
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(7).emit_jump(OpCode::JMP, 3);

    let engine = run(builder.to_script());
    assert_eq!(engine.state(), VMState::HALT);
    assert_eq!(
        engine
            .result_stack()
            .peek(0)
            .expect("result")
            .as_int()
            .expect("as_int"),
        BigInt::from(7)
    );
}

#[test]
fn test_jump_past_script_end_faults() {
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(7).emit_jump(OpCode::JMP, 4);

    let engine = run(builder.to_script());
    assert_eq!(engine.state(), VMState::FAULT);
}

#[test]
fn test_conditional_jumps() {
    // JMPIF taken: skip the THROW
    let mut builder = ScriptBuilder::new();
    builder
        .emit_push_bool(true)
        .emit_jump(OpCode::JMPIF, 4) // from offset 1 to offset 5
        .emit(OpCode::THROW)
        .emit(OpCode::PUSH1)
        .emit(OpCode::RET);
    let engine = run(builder.to_script());
    assert_eq!(engine.state(), VMState::HALT);

    // JMPIF skipped: falls into the THROW
    let mut builder = ScriptBuilder::new();
    builder
        .emit_push_bool(false)
        .emit_jump(OpCode::JMPIF, 4)
        .emit(OpCode::THROW)
        .emit(OpCode::PUSH1)
        .emit(OpCode::RET);
    let engine = run(builder.to_script());
    assert_eq!(engine.state(), VMState::FAULT);

    // JMPIFNOT mirrors the condition
    let mut builder = ScriptBuilder::new();
    builder
        .emit_push_bool(false)
        .emit_jump(OpCode::JMPIFNOT, 4)
        .emit(OpCode::THROW)
        .emit(OpCode::PUSH2)
        .emit(OpCode::RET);
    let engine = run(builder.to_script());
    assert_eq!(engine.state(), VMState::HALT);
}

#[test]
fn test_call_and_return_values() {
    // 0: CALL +4  3: RET  4: PUSH1 5: PUSH2 6: ADD 7: RET
    let mut builder = ScriptBuilder::new();
    builder
        .emit_call(4)
        .emit(OpCode::RET)
        .emit(OpCode::PUSH1)
        .emit(OpCode::PUSH2)
        .emit(OpCode::ADD)
        .emit(OpCode::RET);

    let engine = run(builder.to_script());
    assert_eq!(engine.state(), VMState::HALT);
    assert_eq!(engine.result_stack().len(), 1);
    assert_eq!(
        engine
            .result_stack()
            .peek(0)
            .expect("result")
            .as_int()
            .expect("as_int"),
        BigInt::from(3)
    );
}

#[test]
fn test_rvcount_mismatch_faults() {
    let script = Script::new(vec![OpCode::PUSH1 as u8, OpCode::RET as u8]);

    let mut engine = ExecutionEngine::new(None);
    engine.load_script(script, 2).expect("load should succeed");
    assert_eq!(engine.execute(), VMState::FAULT);
}

#[test]
fn test_rvcount_exact_match_halts() {
    let script = Script::new(vec![
        OpCode::PUSH1 as u8,
        OpCode::PUSH2 as u8,
        OpCode::RET as u8,
    ]);

    let mut engine = ExecutionEngine::new(None);
    engine.load_script(script, 2).expect("load should succeed");
    assert_eq!(engine.execute(), VMState::HALT);
    assert_eq!(engine.result_stack().len(), 2);
}

#[test]
fn test_syscall_dispatch() {
    let mut builder = ScriptBuilder::new();
    builder.emit_syscall(0x1234_5678).emit(OpCode::RET);
    let script = builder.to_script();

    let mut engine = ExecutionEngine::new(None);
    engine
        .interop_service_mut()
        .expect("default service")
        .register(0x1234_5678, "Test.Answer", |engine| {
            engine.push(StackItem::from_int(42))
        });
    engine.load_script(script, -1).expect("load should succeed");

    assert_eq!(engine.execute(), VMState::HALT);
    assert_eq!(
        engine
            .result_stack()
            .peek(0)
            .expect("result")
            .as_int()
            .expect("as_int"),
        BigInt::from(42)
    );
}

#[test]
fn test_unknown_syscall_faults() {
    let mut builder = ScriptBuilder::new();
    builder.emit_syscall(0xDEAD_BEEF).emit(OpCode::RET);

    let engine = run(builder.to_script());
    assert_eq!(engine.state(), VMState::FAULT);
}

#[test]
fn test_throw_family() {
    let engine = run(Script::new(vec![OpCode::THROW as u8]));
    assert_eq!(engine.state(), VMState::FAULT);

    let engine = run(Script::new(vec![
        OpCode::PUSH1 as u8,
        OpCode::THROWIFNOT as u8,
        OpCode::RET as u8,
    ]));
    assert_eq!(engine.state(), VMState::HALT);

    let engine = run(Script::new(vec![
        OpCode::PUSH0 as u8,
        OpCode::THROWIFNOT as u8,
        OpCode::RET as u8,
    ]));
    assert_eq!(engine.state(), VMState::FAULT);
}

#[test]
fn test_stack_size_cap_faults() {
    let limits = ExecutionEngineLimits {
        max_stack_size: 4,
        ..Default::default()
    };

    let mut builder = ScriptBuilder::new();
    for _ in 0..5 {
        builder.emit(OpCode::PUSH1);
    }
    builder.emit(OpCode::RET);

    let mut engine = ExecutionEngine::with_limits(None, limits);
    engine
        .load_script(builder.to_script(), -1)
        .expect("load should succeed");
    assert_eq!(engine.execute(), VMState::FAULT);
}

#[test]
fn test_division_by_zero_faults() {
    let engine = run(Script::new(vec![
        OpCode::PUSH1 as u8,
        OpCode::PUSH0 as u8,
        OpCode::DIV as u8,
    ]));
    assert_eq!(engine.state(), VMState::FAULT);

    let engine = run(Script::new(vec![
        OpCode::PUSH1 as u8,
        OpCode::PUSH0 as u8,
        OpCode::MOD as u8,
    ]));
    assert_eq!(engine.state(), VMState::FAULT);
}

#[test]
fn test_underflow_faults() {
    let engine = run(Script::new(vec![OpCode::DROP as u8]));
    assert_eq!(engine.state(), VMState::FAULT);

    let engine = run(Script::new(vec![OpCode::PUSH1 as u8, OpCode::ADD as u8]));
    assert_eq!(engine.state(), VMState::FAULT);
}

#[test]
fn test_alt_stack_returns_to_caller() {
    // callee stores a value on its alt stack; with unconstrained rvcount the
    // alt stack is copied back to the caller on return
    let mut builder = ScriptBuilder::new();
    builder
        .emit_call(5) // 0: call the routine at offset 5
        .emit(OpCode::FROMALTSTACK) // 3
        .emit(OpCode::RET) // 4
        .emit_push_int(9) // 5
        .emit(OpCode::TOALTSTACK) // 6
        .emit(OpCode::RET); // 7

    let engine = run(builder.to_script());
    assert_eq!(engine.state(), VMState::HALT);
    assert_eq!(
        engine
            .result_stack()
            .peek(0)
            .expect("result")
            .as_int()
            .expect("as_int"),
        BigInt::from(9)
    );
}
