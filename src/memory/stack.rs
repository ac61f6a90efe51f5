//! Operand and call stacks
//!
//! This module provides the two LIFO structures owned by a running VM:
//! - [`OperandStack`]: typed [`StackEntry`] values with tag-checked pops
//! - [`CallStack`]: [`StackFrame`] activation records created by `call`
//!   and destroyed by `ret`
//!
//! Both are bounded; exceeding the bound is reported as a [`Fault`] rather
//! than growing without limit.

use super::value::{Address, PrimitiveType, StackEntry};
use crate::interpreter::errors::Fault;

/// Activation record for a function call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    /// Start of this call's argument/local storage
    pub frame_pointer: Address,
    /// Stack pointer to restore on return
    pub previous_stack_pointer: Address,
    /// Code offset to resume at
    pub return_address: usize,
}

/// The operand stack
#[derive(Debug, Clone)]
pub struct OperandStack {
    entries: Vec<StackEntry>,
    limit: usize,
}

impl OperandStack {
    pub fn new(limit: usize) -> Self {
        OperandStack {
            entries: Vec::new(),
            limit,
        }
    }

    pub fn push(&mut self, entry: StackEntry) -> Result<(), Fault> {
        if self.entries.len() >= self.limit {
            return Err(Fault::StackOverflow { limit: self.limit });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<StackEntry, Fault> {
        self.entries.pop().ok_or(Fault::StackUnderflow)
    }

    /// Pop an entry that must carry the given tag
    pub fn pop_typed(&mut self, expected: PrimitiveType) -> Result<StackEntry, Fault> {
        let entry = self.peek()?;
        if entry.kind() != expected {
            return Err(Fault::TypeMismatch {
                expected,
                got: entry.kind(),
            });
        }
        self.pop()
    }

    /// Pop an Int entry
    pub fn pop_int(&mut self) -> Result<i32, Fault> {
        match self.pop_typed(PrimitiveType::Int)? {
            StackEntry::Int(n) => Ok(n),
            StackEntry::Byte(_) => Err(Fault::TypeMismatch {
                expected: PrimitiveType::Int,
                got: PrimitiveType::Byte,
            }),
        }
    }

    /// Pop a Byte entry
    pub fn pop_byte(&mut self) -> Result<i8, Fault> {
        match self.pop_typed(PrimitiveType::Byte)? {
            StackEntry::Byte(b) => Ok(b),
            StackEntry::Int(_) => Err(Fault::TypeMismatch {
                expected: PrimitiveType::Byte,
                got: PrimitiveType::Int,
            }),
        }
    }

    /// Top entry without removing it
    pub fn peek(&self) -> Result<StackEntry, Fault> {
        self.entries.last().copied().ok_or(Fault::StackUnderflow)
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All entries, bottom first
    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }
}

/// The call stack
#[derive(Debug, Clone)]
pub struct CallStack {
    frames: Vec<StackFrame>,
    limit: usize,
}

impl CallStack {
    pub fn new(limit: usize) -> Self {
        CallStack {
            frames: Vec::new(),
            limit,
        }
    }

    /// Push a new stack frame
    pub fn push_frame(&mut self, frame: StackFrame) -> Result<(), Fault> {
        if self.frames.len() >= self.limit {
            return Err(Fault::CallDepthExceeded { limit: self.limit });
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Pop the top stack frame
    pub fn pop_frame(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    /// Get the current (top) frame
    pub fn current_frame(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    /// Get all frames, outermost first
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// Get the depth of the call stack
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
