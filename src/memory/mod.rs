//! Memory model for the virtual machine
//!
//! This module provides the core memory abstractions:
//! - [`value`]: Runtime value representation ([`value::StackEntry`], Int and Byte)
//! - [`stack`]: Operand stack and call stack with frames
//! - [`heap`]: Block-based heap with allocate/free and typed accessors
//! - [`bits`]: The heap's block occupancy table
//!
//! # Sizes
//!
//! Values have fixed, platform-independent sizes and big-endian encoding:
//! - `Int`: 4 bytes
//! - `Byte`: 1 byte
//!
//! Addresses are plain byte offsets into the heap buffer. Frame pointers,
//! globals and the constant pool all live in the same buffer, so an address
//! pushed by `pushfp` or `ldc` can be used with the generic `load`/`store`
//! opcodes like any `alloc`ed address.

pub mod bits;
pub mod heap;
pub mod stack;
pub mod value;

pub use heap::{Allocation, Heap, HeapError, HEADER_SIZE};
pub use value::{Address, PrimitiveType, StackEntry};
