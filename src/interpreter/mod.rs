//! Bytecode execution engine
//!
//! This module provides the core execution logic:
//! - [`engine`]: the stack-machine [`VirtualMachine`] and its run lifecycle
//! - [`ops`]: instruction implementations
//! - [`opcodes`]: the byte-level opcode table
//! - [`errors`]: fault and run error types
//! - [`host`]: output and crash collaborators supplied by the embedder
//! - [`disasm`]: code listing for the inspector
//!
//! # Execution Model
//!
//! Each `step` fetches one opcode at `ip`, decodes it through the opcode table
//! and executes it. Operands live on a typed stack of Int/Byte entries; call
//! frames, globals and the constant pool live in regions of the borrowed heap
//! that are reserved when a run starts and released when it ends.

pub mod config;
pub mod constants;
pub mod disasm;
pub mod engine;
pub mod errors;
pub mod host;
pub mod opcodes;
pub mod ops;

pub use config::VmConfig;
pub use engine::{VirtualMachine, VmState, VmStatus};
pub use errors::{Fault, VmError};
pub use host::{
    CrashHandler, IoSink, LoggingCrashHandler, MockTerminal, RecordingCrashHandler, StdoutSink,
};
pub use opcodes::{ControlOp, Opcode, TypedOp};
