//! Interop service module for the Meridian Virtual Machine.
//!
//! The service is the single extension point behind `SYSCALL`: a table from
//! 32-bit method ids to host closures. A closure may mutate the engine's
//! stacks through the same API the opcodes use; returning an error faults
//! the machine.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use hashbrown::HashMap;

/// A host closure invoked by `SYSCALL`.
pub type SyscallHandler = Box<dyn FnMut(&mut ExecutionEngine) -> VmResult<()> + Send>;

struct RegisteredMethod {
    name: String,
    handler: SyscallHandler,
}

/// Dispatch table for host methods.
#[derive(Default)]
pub struct InteropService {
    methods: HashMap<u32, RegisteredMethod>,
}

impl InteropService {
    /// Creates an empty service.
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Registers a host method under the given id.
    ///
    /// The name is only used for diagnostics. Registering an id twice
    /// replaces the previous handler.
    pub fn register<S, F>(&mut self, id: u32, name: S, handler: F)
    where
        S: Into<String>,
        F: FnMut(&mut ExecutionEngine) -> VmResult<()> + Send + 'static,
    {
        self.methods.insert(
            id,
            RegisteredMethod {
                name: name.into(),
                handler: Box::new(handler),
            },
        );
    }

    /// Returns `true` if a handler is registered for the id.
    pub fn contains(&self, id: u32) -> bool {
        self.methods.contains_key(&id)
    }

    /// Returns the diagnostic name registered for the id.
    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.methods.get(&id).map(|method| method.name.as_str())
    }

    /// Invokes the handler registered for the id.
    pub fn invoke(&mut self, engine: &mut ExecutionEngine, id: u32) -> VmResult<()> {
        let method = self
            .methods
            .get_mut(&id)
            .ok_or_else(|| VmError::host_error(format!("unknown syscall {id:#010x}")))?;
        log::trace!("syscall {:#010x} ({})", id, method.name);
        (method.handler)(engine).map_err(|err| {
            log::debug!("syscall {} failed: {err}", method.name);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut service = InteropService::new();
        service.register(0x77, "System.Test.Echo", |_engine| Ok(()));

        assert!(service.contains(0x77));
        assert!(!service.contains(0x78));
        assert_eq!(service.name_of(0x77), Some("System.Test.Echo"));
    }
}
