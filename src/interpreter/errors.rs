//! Runtime error types for the virtual machine
//!
//! This module defines [`VmError`], the ways a run can end without a result,
//! and [`Fault`], the interpreter-level failures it wraps.
//!
//! A crash and a fault are separate variants:
//! - [`VmError::Crashed`] is the program's own `crash <code>` instruction, an
//!   in-band abort the host's crash handler has already seen
//! - [`VmError::Fault`] means the interpreter hit bytecode it cannot execute
//!   (unknown opcode, wrong operand type, broken stack discipline)
//! - [`VmError::Heap`] carries an allocator failure raised by `alloc`/`free`

use crate::memory::{HeapError, PrimitiveType};
use std::fmt;

/// Interpreter faults
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The opcode byte is not in the dispatch table
    UnknownOpcode { opcode: u8 },

    /// A typed pop found an entry of the other type
    TypeMismatch {
        expected: PrimitiveType,
        got: PrimitiveType,
    },

    /// Pop from an empty operand stack
    StackUnderflow,

    /// Operand stack limit reached
    StackOverflow { limit: usize },

    /// Call stack limit reached
    CallDepthExceeded { limit: usize },

    /// `call`/`invoke` named a function that does not exist
    FunctionIndexOutOfRange { index: i32, count: usize },

    /// The code segment ends inside an immediate operand
    TruncatedOperand { needed: usize, available: usize },

    /// Execution ran off the end of the code segment
    InstructionPointerOutOfRange { ip: usize, code_size: usize },

    /// Integer division or remainder by zero
    DivisionByZero,

    /// Argument/local storage does not fit in the frame region
    FrameOverflow { requested: i64, available: usize },

    /// A negative value was used as an address or size
    InvalidAddress { value: i32 },

    /// A heap address does not fit in an Int
    AddressOutOfRange { address: usize },

    /// `loadg`/`storeg` index past the globals table
    GlobalIndexOutOfRange { index: i32, count: usize },

    /// `ldc` offset past the constant pool
    ConstantOutOfRange { offset: i32, size: usize },

    /// The opcode exists but this VM does not implement it
    Unsupported { mnemonic: &'static str },

    /// `step` was called with no run in progress
    NotRunning,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::UnknownOpcode { opcode } => {
                write!(f, "Unknown opcode 0x{:02x} ({})", opcode, *opcode as i8)
            }
            Fault::TypeMismatch { expected, got } => {
                write!(f, "Type mismatch: expected {}, got {}", expected, got)
            }
            Fault::StackUnderflow => write!(f, "Operand stack underflow"),
            Fault::StackOverflow { limit } => {
                write!(f, "Operand stack overflow (limit {})", limit)
            }
            Fault::CallDepthExceeded { limit } => {
                write!(f, "Call depth limit of {} exceeded", limit)
            }
            Fault::FunctionIndexOutOfRange { index, count } => {
                write!(
                    f,
                    "Function index {} is out of range for {} function{}",
                    index,
                    count,
                    if *count == 1 { "" } else { "s" }
                )
            }
            Fault::TruncatedOperand { needed, available } => {
                write!(
                    f,
                    "Truncated operand: needed {} bytes, {} left in code",
                    needed, available
                )
            }
            Fault::InstructionPointerOutOfRange { ip, code_size } => {
                write!(
                    f,
                    "Instruction pointer {} is outside code of {} bytes",
                    ip, code_size
                )
            }
            Fault::DivisionByZero => write!(f, "Division by zero"),
            Fault::FrameOverflow {
                requested,
                available,
            } => {
                write!(
                    f,
                    "Frame storage overflow: requested {} bytes, {} available",
                    requested, available
                )
            }
            Fault::InvalidAddress { value } => write!(f, "Invalid address {}", value),
            Fault::AddressOutOfRange { address } => {
                write!(f, "Address {} does not fit in an Int", address)
            }
            Fault::GlobalIndexOutOfRange { index, count } => {
                write!(f, "Global index {} is out of range for {} globals", index, count)
            }
            Fault::ConstantOutOfRange { offset, size } => {
                write!(
                    f,
                    "Constant pool offset {} is outside pool of {} bytes",
                    offset, size
                )
            }
            Fault::Unsupported { mnemonic } => {
                write!(f, "Unsupported instruction '{}'", mnemonic)
            }
            Fault::NotRunning => write!(f, "No run in progress"),
        }
    }
}

/// Ways a run can end without producing a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// The program executed `crash <code>`
    Crashed { code: i32 },

    /// The interpreter could not execute the instruction at `ip`
    Fault { fault: Fault, ip: usize },

    /// A heap operation failed while executing the instruction at `ip`
    Heap { source: HeapError, ip: usize },
}

impl VmError {
    /// The crash code, if this is a program-authored crash
    pub fn crash_code(&self) -> Option<i32> {
        match self {
            VmError::Crashed { code } => Some(*code),
            _ => None,
        }
    }

    /// Offset of the failing instruction; crashes carry none
    pub fn ip(&self) -> Option<usize> {
        match self {
            VmError::Crashed { .. } => None,
            VmError::Fault { ip, .. } | VmError::Heap { ip, .. } => Some(*ip),
        }
    }

    /// The fault, if the interpreter faulted
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            VmError::Fault { fault, .. } => Some(fault),
            _ => None,
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::Crashed { code } => write!(f, "Program crashed with code {}", code),
            VmError::Fault { fault, ip } => write!(f, "Fault at {}: {}", ip, fault),
            VmError::Heap { source, ip } => write!(f, "Heap error at {}: {}", ip, source),
        }
    }
}

impl std::error::Error for VmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VmError::Heap { source, .. } => Some(source),
            _ => None,
        }
    }
}
