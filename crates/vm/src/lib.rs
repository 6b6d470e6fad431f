//! # Meridian Virtual Machine
//!
//! The execution core of the Meridian smart-contract platform: a
//! stack-based, resource-bounded interpreter over a dynamically typed value
//! domain with arbitrary-precision integers, byte strings, buffers, arrays,
//! structs and maps.
//!
//! ## Architecture
//!
//! - **ExecutionEngine**: the fetch/dispatch loop and state machine
//! - **ExecutionContext**: one frame of the invocation stack
//! - **EvaluationStack**: the random-access stack used for both the working
//!   and alt stacks of a frame
//! - **ReferenceCounter**: arena for compound values plus the cycle-safe
//!   reclamation that keeps the aggregate stack item count exact
//! - **JumpTable**: opcode dispatch, one submodule per opcode family
//! - **StackItem**: the tagged value domain
//! - **ScriptBuilder**: programmatic script construction
//!
//! ## Example
//!
//! ```rust
//! use meridian_vm::{ExecutionEngine, OpCode, Script, VMState};
//!
//! let script = Script::new(vec![
//!     OpCode::PUSH1 as u8,
//!     OpCode::PUSH2 as u8,
//!     OpCode::ADD as u8,
//!     OpCode::RET as u8,
//! ]);
//!
//! let mut engine = ExecutionEngine::new(None);
//! engine.load_script(script, -1).unwrap();
//! assert_eq!(engine.execute(), VMState::HALT);
//!
//! let result = engine.result_stack().peek(0).unwrap();
//! assert_eq!(result.as_int().unwrap(), 3.into());
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

/// VM error types and result handling
pub mod error;
/// Random-access stack used for evaluation and alt stacks
pub mod evaluation_stack;
/// Script execution frame
pub mod execution_context;
/// Low-level VM execution engine
pub mod execution_engine;
/// VM instruction representation and decoding
pub mod instruction;
/// Syscall dispatch table
pub mod interop_service;
/// OpCode dispatch handlers
pub mod jump_table;
/// Resource limits enforced at every step
pub mod limits;
/// VM opcode definitions
pub mod op_code;
/// Compound arena, reference tracking and cycle-safe reclamation
pub mod reference_counter;
/// VM script representation
pub mod script;
/// Utility for constructing VM bytecode
pub mod script_builder;
/// Serializable machine snapshots for debugging and conformance
#[cfg(feature = "serde-types")]
pub mod snapshot;
/// Polymorphic data types for VM values
pub mod stack_item;
/// VM execution state flags
pub mod vm_state;

pub use error::{VmError, VmResult};
pub use evaluation_stack::EvaluationStack;
pub use execution_context::ExecutionContext;
pub use execution_engine::{ExecutionEngine, ExecutionHooks};
pub use instruction::Instruction;
pub use interop_service::{InteropService, SyscallHandler};
pub use jump_table::{InstructionHandler, JumpTable};
pub use limits::ExecutionEngineLimits;
pub use op_code::{OpCode, OperandSize};
pub use reference_counter::{CompoundId, ReferenceCounter};
pub use script::Script;
pub use script_builder::ScriptBuilder;
#[cfg(feature = "serde-types")]
pub use snapshot::{EngineSnapshot, FrameSnapshot};
pub use stack_item::{InteropInterface, Pointer, StackItem, StackItemType};
pub use vm_state::VMState;
