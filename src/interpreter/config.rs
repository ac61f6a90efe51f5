//! VM configuration

use super::constants::{
    DEFAULT_FRAME_STACK_SIZE, DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_OPERAND_DEPTH,
};

/// Execution limits for a VM run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum entries on the operand stack
    pub max_operand_depth: usize,
    /// Maximum nested calls, `main` included
    pub max_call_depth: usize,
    /// Bytes reserved on the heap for arguments and locals
    pub frame_stack_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_operand_depth: DEFAULT_MAX_OPERAND_DEPTH,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            frame_stack_size: DEFAULT_FRAME_STACK_SIZE,
        }
    }
}
