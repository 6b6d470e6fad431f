//! Execution context module for the Meridian Virtual Machine.
//!
//! A context is one frame of the invocation stack: the script being
//! executed, a cursor into it, the frame's two stacks and the number of
//! values the frame promises to return.

use crate::error::{VmError, VmResult};
use crate::evaluation_stack::EvaluationStack;
use crate::instruction::Instruction;
use crate::reference_counter::ReferenceCounter;
use crate::script::Script;
use crate::stack_item::StackItem;

/// Represents an execution context (call frame) in the VM.
pub struct ExecutionContext {
    /// The immutable script this frame executes.
    script: Script,

    /// The current instruction pointer.
    instruction_pointer: usize,

    /// The number of values to return when the frame is unloaded
    /// (−1 = unconstrained).
    rvcount: i32,

    /// The frame's working stack.
    evaluation_stack: EvaluationStack,

    /// The frame's auxiliary stack.
    alt_stack: EvaluationStack,
}

impl ExecutionContext {
    /// Creates a new execution context at the start of `script`.
    pub fn new(script: Script, rvcount: i32, reference_counter: &ReferenceCounter) -> Self {
        Self {
            script,
            instruction_pointer: 0,
            rvcount,
            evaluation_stack: EvaluationStack::new(reference_counter.clone()),
            alt_stack: EvaluationStack::new(reference_counter.clone()),
        }
    }

    /// Returns the script of this frame.
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Returns the current instruction pointer.
    pub fn instruction_pointer(&self) -> usize {
        self.instruction_pointer
    }

    /// Sets the instruction pointer.
    pub fn set_instruction_pointer(&mut self, position: usize) {
        self.instruction_pointer = position;
    }

    /// Returns the number of values this frame returns (−1 = unconstrained).
    pub fn rvcount(&self) -> i32 {
        self.rvcount
    }

    /// Returns the frame's evaluation stack.
    pub fn evaluation_stack(&self) -> &EvaluationStack {
        &self.evaluation_stack
    }

    /// Returns the frame's evaluation stack (mutable).
    pub fn evaluation_stack_mut(&mut self) -> &mut EvaluationStack {
        &mut self.evaluation_stack
    }

    /// Returns the frame's alt stack.
    pub fn alt_stack(&self) -> &EvaluationStack {
        &self.alt_stack
    }

    /// Returns the frame's alt stack (mutable).
    pub fn alt_stack_mut(&mut self) -> &mut EvaluationStack {
        &mut self.alt_stack
    }

    /// Decodes the instruction at the current pointer.
    pub fn current_instruction(&self) -> VmResult<Instruction> {
        if self.instruction_pointer >= self.script.len() {
            return Err(VmError::parse("instruction pointer is out of range"));
        }
        self.script.instruction_at(self.instruction_pointer)
    }

    /// Clones the frame for a call: same script, given position, fresh
    /// stacks, unconstrained return count.
    pub fn clone_with_position(&self, position: usize) -> Self {
        let reference_counter = self.evaluation_stack.reference_counter().clone();
        Self {
            script: self.script.clone(),
            instruction_pointer: position,
            rvcount: -1,
            evaluation_stack: EvaluationStack::new(reference_counter.clone()),
            alt_stack: EvaluationStack::new(reference_counter),
        }
    }

    /// Pushes onto the frame's evaluation stack.
    pub fn push(&mut self, item: StackItem) {
        self.evaluation_stack.push(item);
    }

    /// Pops from the frame's evaluation stack.
    pub fn pop(&mut self) -> VmResult<StackItem> {
        self.evaluation_stack.pop()
    }

    /// Peeks `n` deep into the frame's evaluation stack.
    pub fn peek(&self, n: usize) -> VmResult<&StackItem> {
        self.evaluation_stack.peek(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op_code::OpCode;

    #[test]
    fn test_context_creation() {
        let counter = ReferenceCounter::new();
        let script = Script::new(vec![OpCode::PUSH1 as u8, OpCode::RET as u8]);
        let context = ExecutionContext::new(script, -1, &counter);

        assert_eq!(context.instruction_pointer(), 0);
        assert_eq!(context.rvcount(), -1);
        assert!(context.evaluation_stack().is_empty());
        assert!(context.alt_stack().is_empty());
    }

    #[test]
    fn test_current_instruction() {
        let counter = ReferenceCounter::new();
        let script = Script::new(vec![OpCode::PUSH1 as u8, OpCode::RET as u8]);
        let mut context = ExecutionContext::new(script, -1, &counter);

        let instruction = context.current_instruction().expect("decode");
        assert_eq!(instruction.opcode(), OpCode::PUSH1);

        context.set_instruction_pointer(2);
        assert!(context.current_instruction().is_err());
    }

    #[test]
    fn test_clone_with_position() {
        let counter = ReferenceCounter::new();
        let script = Script::new(vec![OpCode::NOP as u8, OpCode::RET as u8]);
        let mut context = ExecutionContext::new(script, 2, &counter);
        context.push(StackItem::from_int(1));

        let clone = context.clone_with_position(1);
        assert!(clone.script().same_script(context.script()));
        assert_eq!(clone.instruction_pointer(), 1);
        assert_eq!(clone.rvcount(), -1);
        assert!(clone.evaluation_stack().is_empty());
        assert!(clone.alt_stack().is_empty());
    }
}
