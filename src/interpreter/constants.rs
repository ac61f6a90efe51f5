// Constants for the virtual machine

/// Default heap size in bytes (1 MiB)
pub const DEFAULT_HEAP_SIZE: usize = 1024 * 1024;

/// Default heap block size in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 16;

/// Default maximum number of entries on the operand stack
pub const DEFAULT_MAX_OPERAND_DEPTH: usize = 4096;

/// Default maximum number of nested calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Default size of the frame region holding arguments and locals (64 KiB)
pub const DEFAULT_FRAME_STACK_SIZE: usize = 64 * 1024;

/// Size of one global slot in bytes
pub const GLOBAL_SLOT_SIZE: usize = 4;

/// Width of the big-endian length prefix read by `outs`
pub const STRING_LENGTH_SIZE: usize = 4;
