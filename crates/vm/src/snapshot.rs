//! Snapshot/debug surface for the Meridian Virtual Machine.
//!
//! Produces a serializable view of the machine: per-frame instruction
//! pointer, pending instruction and stacks, plus the result stack. Values
//! serialize as `{type, value}` objects; compounds met again on the same
//! path (cycles) are rendered with a null value.

use crate::execution_context::ExecutionContext;
use crate::execution_engine::ExecutionEngine;
use crate::reference_counter::{CompoundId, ReferenceCounter};
use crate::stack_item::StackItem;
use hashbrown::HashSet;
use serde::Serialize;
use serde_json::{json, Value};

/// A serializable view of one frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot {
    pub instruction_pointer: usize,
    /// Mnemonic of the instruction the frame will execute next, if any.
    pub next_instruction: Option<String>,
    pub evaluation_stack: Vec<Value>,
    pub alt_stack: Vec<Value>,
}

/// A serializable view of the whole machine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub state: String,
    /// Frames bottom first; the last one is the current frame.
    pub frames: Vec<FrameSnapshot>,
    pub result_stack: Vec<Value>,
}

impl EngineSnapshot {
    /// Captures the current machine state.
    pub fn capture(engine: &ExecutionEngine) -> Self {
        let counter = engine.reference_counter();
        Self {
            state: format!("{:?}", engine.state()),
            frames: engine
                .invocation_stack()
                .iter()
                .map(|frame| FrameSnapshot::capture(counter, frame))
                .collect(),
            result_stack: engine
                .result_stack()
                .iter()
                .map(|item| render_item(counter, item, &mut HashSet::new()))
                .collect(),
        }
    }
}

impl FrameSnapshot {
    fn capture(counter: &ReferenceCounter, frame: &ExecutionContext) -> Self {
        Self {
            instruction_pointer: frame.instruction_pointer(),
            next_instruction: frame
                .current_instruction()
                .ok()
                .map(|instruction| format!("{:?}", instruction.opcode())),
            evaluation_stack: frame
                .evaluation_stack()
                .iter()
                .map(|item| render_item(counter, item, &mut HashSet::new()))
                .collect(),
            alt_stack: frame
                .alt_stack()
                .iter()
                .map(|item| render_item(counter, item, &mut HashSet::new()))
                .collect(),
        }
    }
}

impl ExecutionEngine {
    /// Captures a serializable snapshot of the machine.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::capture(self)
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn render_item(
    counter: &ReferenceCounter,
    item: &StackItem,
    on_path: &mut HashSet<CompoundId>,
) -> Value {
    match item {
        StackItem::Null => json!({ "type": "null", "value": Value::Null }),
        StackItem::Boolean(value) => json!({ "type": "boolean", "value": value }),
        StackItem::Integer(value) => json!({ "type": "integer", "value": value.to_string() }),
        StackItem::ByteString(bytes) => json!({ "type": "bytestring", "value": hex(bytes) }),
        StackItem::Buffer(bytes) => json!({ "type": "buffer", "value": hex(bytes) }),
        StackItem::Pointer(pointer) => json!({ "type": "pointer", "value": pointer.position() }),
        StackItem::InteropInterface(interface) => {
            json!({ "type": "interop", "value": interface.interface_type() })
        }
        StackItem::Array(id) | StackItem::Struct(id) => {
            let kind = if matches!(item, StackItem::Array(_)) {
                "array"
            } else {
                "struct"
            };
            if !on_path.insert(*id) {
                return json!({ "type": kind, "value": Value::Null });
            }
            let elements: Vec<Value> = counter
                .array_items(*id)
                .unwrap_or_default()
                .iter()
                .map(|element| render_item(counter, element, on_path))
                .collect();
            on_path.remove(id);
            json!({ "type": kind, "value": elements })
        }
        StackItem::Map(id) => {
            if !on_path.insert(*id) {
                return json!({ "type": "map", "value": Value::Null });
            }
            let entries: Vec<Value> = counter
                .map_pairs(*id)
                .unwrap_or_default()
                .iter()
                .map(|(key, value)| {
                    json!({
                        "key": render_item(counter, key, on_path),
                        "value": render_item(counter, value, on_path),
                    })
                })
                .collect();
            on_path.remove(id);
            json!({ "type": "map", "value": entries })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op_code::OpCode;
    use crate::script::Script;
    use crate::vm_state::VMState;

    #[test]
    fn test_snapshot_shapes() {
        let mut engine = ExecutionEngine::new(None);
        let script = Script::new(vec![OpCode::PUSH2 as u8, OpCode::RET as u8]);
        engine.load_script(script, -1).expect("load should succeed");

        engine.step();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.state, format!("{:?}", VMState::BREAK));
        assert_eq!(snapshot.frames.len(), 1);

        let frame = &snapshot.frames[0];
        assert_eq!(frame.instruction_pointer, 1);
        assert_eq!(frame.next_instruction.as_deref(), Some("RET"));
        assert_eq!(frame.evaluation_stack.len(), 1);
        assert_eq!(
            frame.evaluation_stack[0],
            json!({ "type": "integer", "value": "2" })
        );
    }

    #[test]
    fn test_cyclic_compound_renders_once() {
        let engine = ExecutionEngine::new(None);
        let counter = engine.reference_counter();

        let array = counter.create_array(Vec::new());
        let id = array.compound_id().expect("array id");
        counter.array_append(id, array.clone()).expect("append");

        let rendered = render_item(counter, &array, &mut HashSet::new());
        assert_eq!(
            rendered,
            json!({
                "type": "array",
                "value": [ { "type": "array", "value": Value::Null } ]
            })
        );
    }
}
