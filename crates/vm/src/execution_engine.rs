//! Execution engine module for the Meridian Virtual Machine.
//!
//! The engine owns the invocation stack, the result stack, the reference
//! counter and the limits, and drives the fetch/dispatch loop. Any error
//! surfacing from a step transitions the machine to FAULT; no error is
//! recovered inside the core.

use crate::error::{VmError, VmResult};
use crate::evaluation_stack::EvaluationStack;
use crate::execution_context::ExecutionContext;
use crate::instruction::Instruction;
use crate::interop_service::InteropService;
use crate::jump_table::JumpTable;
use crate::limits::ExecutionEngineLimits;
use crate::reference_counter::ReferenceCounter;
use crate::script::Script;
use crate::stack_item::StackItem;
use crate::vm_state::VMState;

/// Callbacks an embedder may install around the interpreter loop.
///
/// Every method defaults to a no-op; an error return faults the machine.
pub trait ExecutionHooks {
    /// Called before an instruction is dispatched.
    fn pre_execute_instruction(
        &mut self,
        _engine: &mut ExecutionEngine,
        _instruction: &Instruction,
    ) -> VmResult<()> {
        Ok(())
    }

    /// Called after an instruction was dispatched, before the sweep.
    fn post_execute_instruction(
        &mut self,
        _engine: &mut ExecutionEngine,
        _instruction: &Instruction,
    ) -> VmResult<()> {
        Ok(())
    }

    /// Called after a frame was pushed onto the invocation stack.
    fn on_context_loaded(&mut self, _engine: &mut ExecutionEngine) -> VmResult<()> {
        Ok(())
    }

    /// Called after a frame was popped off the invocation stack.
    fn on_context_unloaded(
        &mut self,
        _engine: &mut ExecutionEngine,
        _frame: &ExecutionContext,
    ) -> VmResult<()> {
        Ok(())
    }
}

/// The execution engine for the Meridian VM.
pub struct ExecutionEngine {
    /// The current state of the VM.
    state: VMState,

    /// Set by control handlers that manage the instruction pointer (or the
    /// frame) themselves; suppresses the default advance after dispatch.
    pub is_jumping: bool,

    /// The dispatch table for instructions.
    jump_table: JumpTable,

    /// Restrictions on the VM.
    limits: ExecutionEngineLimits,

    /// Reference counting and aggregate stack item accounting.
    reference_counter: ReferenceCounter,

    /// Optional dispatch table for syscalls.
    interop_service: Option<InteropService>,

    /// Optional embedder callbacks.
    hooks: Option<Box<dyn ExecutionHooks>>,

    /// The invocation stack; the last element is the current frame.
    invocation_stack: Vec<ExecutionContext>,

    /// The stack receiving the final results.
    result_stack: EvaluationStack,
}

impl ExecutionEngine {
    /// Creates a new engine with default limits.
    pub fn new(jump_table: Option<JumpTable>) -> Self {
        Self::with_limits(jump_table, ExecutionEngineLimits::default())
    }

    /// Creates a new engine with the given limits.
    pub fn with_limits(jump_table: Option<JumpTable>, limits: ExecutionEngineLimits) -> Self {
        let reference_counter = ReferenceCounter::new();
        Self {
            state: VMState::BREAK,
            is_jumping: false,
            jump_table: jump_table.unwrap_or_default(),
            limits,
            reference_counter: reference_counter.clone(),
            interop_service: Some(InteropService::new()),
            hooks: None,
            invocation_stack: Vec::new(),
            result_stack: EvaluationStack::new(reference_counter),
        }
    }

    /// Returns the current state of the VM.
    pub fn state(&self) -> VMState {
        self.state
    }

    /// Sets the state of the VM.
    pub fn set_state(&mut self, state: VMState) {
        if self.state != state {
            log::trace!("state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Returns the execution limits configured for this engine.
    pub fn limits(&self) -> &ExecutionEngineLimits {
        &self.limits
    }

    /// Returns the reference counter.
    pub fn reference_counter(&self) -> &ReferenceCounter {
        &self.reference_counter
    }

    /// Returns the aggregate stack item count.
    pub fn stack_item_count(&self) -> usize {
        self.reference_counter.count()
    }

    /// Returns the invocation stack, bottom first.
    pub fn invocation_stack(&self) -> &[ExecutionContext] {
        &self.invocation_stack
    }

    /// Returns the current frame, if any.
    pub fn current_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.last()
    }

    /// Returns the current frame (mutable), if any.
    pub fn current_context_mut(&mut self) -> Option<&mut ExecutionContext> {
        self.invocation_stack.last_mut()
    }

    /// Returns the entry frame, if any.
    pub fn entry_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.first()
    }

    /// Returns the result stack.
    pub fn result_stack(&self) -> &EvaluationStack {
        &self.result_stack
    }

    /// Returns the result stack (mutable).
    pub fn result_stack_mut(&mut self) -> &mut EvaluationStack {
        &mut self.result_stack
    }

    /// Installs the embedder callbacks.
    pub fn set_hooks(&mut self, hooks: Box<dyn ExecutionHooks>) {
        self.hooks = Some(hooks);
    }

    /// Sets the interop service used for syscall dispatch.
    pub fn set_interop_service(&mut self, service: InteropService) {
        self.interop_service = Some(service);
    }

    /// Returns a mutable reference to the interop service, if any.
    pub fn interop_service_mut(&mut self) -> Option<&mut InteropService> {
        self.interop_service.as_mut()
    }

    /// Loads a script and pushes a fresh frame for it.
    pub fn load_script(&mut self, script: Script, rvcount: i32) -> VmResult<&ExecutionContext> {
        let context = ExecutionContext::new(script, rvcount, &self.reference_counter);
        self.load_context(context)?;
        self.current_context()
            .ok_or_else(|| VmError::invalid_operation("no current context after load"))
    }

    /// Pushes a frame onto the invocation stack.
    pub fn load_context(&mut self, context: ExecutionContext) -> VmResult<()> {
        if self.invocation_stack.len() >= self.limits.max_invocation_stack_size {
            return Err(VmError::invocation_stack_overflow(
                self.invocation_stack.len(),
                self.limits.max_invocation_stack_size,
            ));
        }
        self.invocation_stack.push(context);
        self.run_context_loaded()
    }

    /// Drives the machine until it halts or faults.
    pub fn execute(&mut self) -> VMState {
        if self.state == VMState::BREAK {
            self.set_state(VMState::NONE);
        }

        while !self.state.is_terminal() {
            if let Err(err) = self.execute_next() {
                self.on_fault(err);
            }
        }

        self.state
    }

    /// Executes a single instruction and pauses.
    pub fn step(&mut self) -> VMState {
        if self.state.is_terminal() {
            return self.state;
        }
        if self.state == VMState::BREAK {
            self.set_state(VMState::NONE);
        }

        if let Err(err) = self.execute_next() {
            self.on_fault(err);
        }
        if !self.state.is_terminal() {
            self.set_state(VMState::BREAK);
        }

        self.state
    }

    /// Executes the next instruction.
    ///
    /// An instruction pointer at or past the end of the script performs the
    /// return semantics, which is what makes a jump to exactly the script
    /// length a well-defined fall-through.
    pub fn execute_next(&mut self) -> VmResult<()> {
        if self.state.is_terminal() {
            return Ok(());
        }
        if self.invocation_stack.is_empty() {
            self.set_state(VMState::HALT);
            return Ok(());
        }

        self.is_jumping = false;
        let frame_index = self.invocation_stack.len() - 1;

        let instruction = {
            let context = &self.invocation_stack[frame_index];
            if context.instruction_pointer() >= context.script().len() {
                Instruction::ret_at(context.instruction_pointer())
            } else {
                context.current_instruction()?
            }
        };

        self.run_pre_hook(&instruction)?;

        let handler = self
            .jump_table
            .handler_for(instruction.opcode())
            .ok_or_else(|| VmError::invalid_opcode(instruction.opcode() as u8))?;
        handler(self, &instruction)?;

        if !self.is_jumping {
            if let Some(frame) = self.invocation_stack.get_mut(frame_index) {
                let next = frame.instruction_pointer() + instruction.size();
                frame.set_instruction_pointer(next);
            }
        }

        self.run_post_hook(&instruction)?;

        let count = self.reference_counter.check_zero_referred();
        if count > self.limits.max_stack_size {
            return Err(VmError::stack_overflow(count, self.limits.max_stack_size));
        }

        Ok(())
    }

    /// Moves the current frame's instruction pointer by a signed offset.
    ///
    /// The target may be anywhere in `[0, script_len]`; the inclusive upper
    /// bound allows falling through to the end of the script.
    pub fn execute_jump_offset(&mut self, offset: i32) -> VmResult<()> {
        let context = self
            .current_context()
            .ok_or_else(|| VmError::invalid_operation("no current context"))?;
        let target = context.instruction_pointer() as i64 + offset as i64;
        let script_len = context.script().len() as i64;
        if target < 0 || target > script_len {
            return Err(VmError::out_of_range(format!(
                "jump target {target} outside [0, {script_len}]"
            )));
        }

        let target = target as usize;
        if let Some(context) = self.current_context_mut() {
            context.set_instruction_pointer(target);
        }
        self.is_jumping = true;
        Ok(())
    }

    /// Pushes a fresh frame for the current script at `position`.
    ///
    /// The executing frame is advanced by the default post-dispatch step, so
    /// it resumes just past the call instruction when the callee returns.
    pub fn execute_call(&mut self, position: usize) -> VmResult<()> {
        let context = self
            .current_context()
            .ok_or_else(|| VmError::invalid_operation("no current context"))?;
        if position > context.script().len() {
            return Err(VmError::out_of_range(format!(
                "call target {position} outside script"
            )));
        }

        let new_context = context.clone_with_position(position);
        self.load_context(new_context)
    }

    /// Pops the current frame and hands its results to the caller (or, when
    /// the invocation stack empties, to the result stack).
    pub fn execute_ret(&mut self) -> VmResult<()> {
        let mut frame = self
            .invocation_stack
            .pop()
            .ok_or_else(|| VmError::invalid_operation("no frame to return from"))?;

        let rvcount = frame.rvcount();
        let produced = frame.evaluation_stack().len();
        if rvcount >= 0 && rvcount as usize != produced {
            self.invocation_stack.push(frame);
            return Err(VmError::invalid_operation(format!(
                "frame returned {produced} values, expected {rvcount}"
            )));
        }

        match self.invocation_stack.last_mut() {
            Some(caller) => {
                frame
                    .evaluation_stack()
                    .copy_to(caller.evaluation_stack_mut());
                if rvcount < 0 {
                    frame.alt_stack().copy_to(caller.alt_stack_mut());
                }
            }
            None => {
                frame.evaluation_stack().copy_to(&mut self.result_stack);
            }
        }

        frame.evaluation_stack_mut().clear();
        frame.alt_stack_mut().clear();
        self.run_context_unloaded(&frame)?;

        if self.invocation_stack.is_empty() {
            self.set_state(VMState::HALT);
        }
        self.is_jumping = true;
        Ok(())
    }

    /// Dispatches a syscall id through the interop service.
    pub fn on_syscall(&mut self, id: u32) -> VmResult<()> {
        let mut service = self.interop_service.take().ok_or_else(|| {
            VmError::host_error(format!("no interop service for syscall {id:#010x}"))
        })?;
        let result = service.invoke(self, id);
        self.interop_service = Some(service);
        result
    }

    /// Peeks `n` deep into the current frame's evaluation stack.
    pub fn peek(&self, n: usize) -> VmResult<&StackItem> {
        let context = self
            .current_context()
            .ok_or_else(|| VmError::invalid_operation("no current context"))?;
        context.evaluation_stack().peek(n)
    }

    /// Pops from the current frame's evaluation stack.
    pub fn pop(&mut self) -> VmResult<StackItem> {
        let context = self
            .current_context_mut()
            .ok_or_else(|| VmError::invalid_operation("no current context"))?;
        context.evaluation_stack_mut().pop()
    }

    /// Pushes onto the current frame's evaluation stack.
    pub fn push(&mut self, item: StackItem) -> VmResult<()> {
        let context = self
            .current_context_mut()
            .ok_or_else(|| VmError::invalid_operation("no current context"))?;
        context.evaluation_stack_mut().push(item);
        Ok(())
    }

    fn on_fault(&mut self, err: VmError) {
        log::debug!("execution fault: {err}");
        self.set_state(VMState::FAULT);
    }

    fn run_pre_hook(&mut self, instruction: &Instruction) -> VmResult<()> {
        if let Some(mut hooks) = self.hooks.take() {
            let result = hooks.pre_execute_instruction(self, instruction);
            self.hooks = Some(hooks);
            result?;
        }
        Ok(())
    }

    fn run_post_hook(&mut self, instruction: &Instruction) -> VmResult<()> {
        if let Some(mut hooks) = self.hooks.take() {
            let result = hooks.post_execute_instruction(self, instruction);
            self.hooks = Some(hooks);
            result?;
        }
        Ok(())
    }

    fn run_context_loaded(&mut self) -> VmResult<()> {
        if let Some(mut hooks) = self.hooks.take() {
            let result = hooks.on_context_loaded(self);
            self.hooks = Some(hooks);
            result?;
        }
        Ok(())
    }

    fn run_context_unloaded(&mut self, frame: &ExecutionContext) -> VmResult<()> {
        if let Some(mut hooks) = self.hooks.take() {
            let result = hooks.on_context_unloaded(self, frame);
            self.hooks = Some(hooks);
            result?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op_code::OpCode;

    #[test]
    fn test_engine_creation() {
        let engine = ExecutionEngine::new(None);
        assert_eq!(engine.state(), VMState::BREAK);
        assert!(engine.invocation_stack().is_empty());
        assert!(engine.result_stack().is_empty());
        assert_eq!(engine.stack_item_count(), 0);
    }

    #[test]
    fn test_load_script() {
        let mut engine = ExecutionEngine::new(None);
        let script = Script::new(vec![OpCode::PUSH1 as u8, OpCode::RET as u8]);

        {
            let context = engine.load_script(script, -1).expect("load should succeed");
            assert_eq!(context.instruction_pointer(), 0);
            assert_eq!(context.rvcount(), -1);
        }
        assert_eq!(engine.invocation_stack().len(), 1);
    }

    #[test]
    fn test_invocation_stack_limit() {
        let limits = ExecutionEngineLimits {
            max_invocation_stack_size: 1,
            ..Default::default()
        };
        let mut engine = ExecutionEngine::with_limits(None, limits);

        let script = Script::new(vec![OpCode::RET as u8]);
        engine
            .load_script(script.clone(), -1)
            .expect("first load should succeed");
        assert!(matches!(
            engine.load_script(script, -1),
            Err(VmError::InvocationStackOverflow { .. })
        ));
    }

    #[test]
    fn test_empty_invocation_stack_halts() {
        let mut engine = ExecutionEngine::new(None);
        assert_eq!(engine.execute(), VMState::HALT);
    }

    #[test]
    fn test_fault_is_sticky() {
        let mut engine = ExecutionEngine::new(None);
        // 0xFF is not an opcode
        let script = Script::new(vec![0xFF]);
        engine.load_script(script, -1).expect("load should succeed");

        assert_eq!(engine.execute(), VMState::FAULT);
        // further stepping must not change the state
        engine.execute_next().expect("terminal step is a no-op");
        assert_eq!(engine.state(), VMState::FAULT);
        assert_eq!(engine.step(), VMState::FAULT);
    }

    #[test]
    fn test_engine_stack_helpers() {
        let mut engine = ExecutionEngine::new(None);
        let script = Script::new(vec![OpCode::RET as u8]);
        engine.load_script(script, -1).expect("load should succeed");

        engine.push(StackItem::from_int(1)).expect("push");
        engine.push(StackItem::from_int(2)).expect("push");
        assert_eq!(
            engine.peek(0).expect("peek").as_int().expect("as_int"),
            num_bigint::BigInt::from(2)
        );
        let item = engine.pop().expect("pop");
        assert_eq!(
            item.as_int().expect("as_int"),
            num_bigint::BigInt::from(2)
        );
    }

    #[test]
    fn test_hooks_run() {
        use std::cell::Cell;
        use std::rc::Rc;

        struct CountingHooks {
            seen: Rc<Cell<usize>>,
        }
        impl ExecutionHooks for CountingHooks {
            fn pre_execute_instruction(
                &mut self,
                _engine: &mut ExecutionEngine,
                _instruction: &Instruction,
            ) -> VmResult<()> {
                self.seen.set(self.seen.get() + 1);
                Ok(())
            }
        }

        let seen = Rc::new(Cell::new(0));
        let mut engine = ExecutionEngine::new(None);
        let script = Script::new(vec![OpCode::NOP as u8, OpCode::RET as u8]);
        engine.load_script(script, -1).expect("load should succeed");
        engine.set_hooks(Box::new(CountingHooks { seen: seen.clone() }));

        assert_eq!(engine.execute(), VMState::HALT);
        assert_eq!(seen.get(), 2);
    }
}
