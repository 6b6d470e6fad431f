//! Resource limits enforced by the execution engine.

use crate::error::{VmError, VmResult};
use num_bigint::BigInt;

/// Restrictions the engine enforces at every step.
///
/// The defaults match the platform-wide consensus values; embedders may
/// construct an engine with different limits for testing or private
/// deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionEngineLimits {
    /// Maximum aggregate number of stack item slots across all stacks.
    pub max_stack_size: usize,

    /// Maximum size in bytes of a single byte string or buffer.
    pub max_item_size: usize,

    /// Maximum number of frames on the invocation stack.
    pub max_invocation_stack_size: usize,

    /// Maximum number of entries in an array, struct or map.
    pub max_array_size: usize,

    /// Maximum encoded size in bytes of an integer used in arithmetic.
    pub max_size_for_big_integer: usize,

    /// Upper bound for SHL/SHR shift counts.
    pub max_shl_shr: i64,

    /// Lower bound for SHL/SHR shift counts.
    pub min_shl_shr: i64,
}

impl Default for ExecutionEngineLimits {
    fn default() -> Self {
        Self {
            max_stack_size: 2048,
            max_item_size: 1024 * 1024,
            max_invocation_stack_size: 1024,
            max_array_size: 1024,
            max_size_for_big_integer: 32,
            max_shl_shr: 256,
            min_shl_shr: -256,
        }
    }
}

impl ExecutionEngineLimits {
    /// Checks that an integer fits in `max_size_for_big_integer` bytes when
    /// encoded in minimal two's-complement form.
    pub fn assert_big_integer(&self, value: &BigInt) -> VmResult<()> {
        let size = crate::stack_item::integer_byte_size(value);
        if size > self.max_size_for_big_integer {
            return Err(VmError::integer_too_large(
                size,
                self.max_size_for_big_integer,
            ));
        }
        Ok(())
    }

    /// Checks that a byte string or buffer length is within `max_item_size`.
    pub fn assert_item_size(&self, size: usize) -> VmResult<()> {
        if size > self.max_item_size {
            return Err(VmError::item_too_large(size, self.max_item_size));
        }
        Ok(())
    }

    /// Checks that a collection entry count is within `max_array_size`.
    pub fn assert_array_size(&self, size: usize) -> VmResult<()> {
        if size > self.max_array_size {
            return Err(VmError::array_too_large(size, self.max_array_size));
        }
        Ok(())
    }

    /// Checks that a shift count is within the permitted window.
    pub fn assert_shift(&self, shift: i64) -> VmResult<()> {
        if shift > self.max_shl_shr || shift < self.min_shl_shr {
            return Err(VmError::out_of_range(format!(
                "shift count {shift} outside [{}, {}]",
                self.min_shl_shr, self.max_shl_shr
            )));
        }
        Ok(())
    }
}
