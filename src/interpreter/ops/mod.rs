//! Instruction implementations, split by family
//!
//! - [`control`]: jumps, calls, crash, casts and the untyped heap opcodes
//! - [`typed`]: the mirrored Int/Byte families, written once over [`Primitive`]
//! - [`frames`]: address resolution for locals, globals and stack values
//!
//! Each module adds methods to [`VirtualMachine`](super::engine::VirtualMachine).

pub mod control;
pub mod frames;
pub mod typed;

use crate::interpreter::engine::VirtualMachine;
use crate::interpreter::errors::Fault;
use crate::memory::stack::OperandStack;
use crate::memory::{Address, Heap, HeapError, PrimitiveType, StackEntry};
use std::ops::{BitAnd, BitOr, BitXor, Not};

/// A machine type with its own opcode family
pub(crate) trait Primitive:
    Copy
    + Ord
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + BitXor<Output = Self>
    + Not<Output = Self>
{
    const KIND: PrimitiveType;
    const ZERO: Self;

    fn pop(stack: &mut OperandStack) -> Result<Self, Fault>;
    fn into_entry(self) -> StackEntry;
    fn fetch(vm: &mut VirtualMachine<'_>) -> Result<Self, Fault>;
    fn read(heap: &Heap, address: Address) -> Result<Self, HeapError>;
    fn write(self, heap: &mut Heap, address: Address) -> Result<(), HeapError>;

    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    /// Caller guarantees `rhs != ZERO`
    fn div(self, rhs: Self) -> Self;
    /// Caller guarantees `rhs != ZERO`
    fn rem(self, rhs: Self) -> Self;
    /// Shift amounts are masked to the type's width
    fn shl(self, amount: Self) -> Self;
    fn shr(self, amount: Self) -> Self;

    /// Text written by the `out` opcode
    fn render(self) -> String;
}

impl Primitive for i32 {
    const KIND: PrimitiveType = PrimitiveType::Int;
    const ZERO: Self = 0;

    fn pop(stack: &mut OperandStack) -> Result<Self, Fault> {
        stack.pop_int()
    }

    fn into_entry(self) -> StackEntry {
        StackEntry::Int(self)
    }

    fn fetch(vm: &mut VirtualMachine<'_>) -> Result<Self, Fault> {
        vm.fetch_i32()
    }

    fn read(heap: &Heap, address: Address) -> Result<Self, HeapError> {
        heap.read_int(address)
    }

    fn write(self, heap: &mut Heap, address: Address) -> Result<(), HeapError> {
        heap.write_int(address, self)
    }

    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }

    fn sub(self, rhs: Self) -> Self {
        self.wrapping_sub(rhs)
    }

    fn mul(self, rhs: Self) -> Self {
        self.wrapping_mul(rhs)
    }

    fn div(self, rhs: Self) -> Self {
        self.wrapping_div(rhs)
    }

    fn rem(self, rhs: Self) -> Self {
        self.wrapping_rem(rhs)
    }

    fn shl(self, amount: Self) -> Self {
        self.wrapping_shl(amount as u32)
    }

    fn shr(self, amount: Self) -> Self {
        self.wrapping_shr(amount as u32)
    }

    fn render(self) -> String {
        self.to_string()
    }
}

impl Primitive for i8 {
    const KIND: PrimitiveType = PrimitiveType::Byte;
    const ZERO: Self = 0;

    fn pop(stack: &mut OperandStack) -> Result<Self, Fault> {
        stack.pop_byte()
    }

    fn into_entry(self) -> StackEntry {
        StackEntry::Byte(self)
    }

    fn fetch(vm: &mut VirtualMachine<'_>) -> Result<Self, Fault> {
        vm.fetch_i8()
    }

    fn read(heap: &Heap, address: Address) -> Result<Self, HeapError> {
        heap.get(address).map(|b| b as i8)
    }

    fn write(self, heap: &mut Heap, address: Address) -> Result<(), HeapError> {
        heap.set(address, self as u8)
    }

    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }

    fn sub(self, rhs: Self) -> Self {
        self.wrapping_sub(rhs)
    }

    fn mul(self, rhs: Self) -> Self {
        self.wrapping_mul(rhs)
    }

    fn div(self, rhs: Self) -> Self {
        self.wrapping_div(rhs)
    }

    fn rem(self, rhs: Self) -> Self {
        self.wrapping_rem(rhs)
    }

    fn shl(self, amount: Self) -> Self {
        self.wrapping_shl(amount as u32)
    }

    fn shr(self, amount: Self) -> Self {
        self.wrapping_shr(amount as u32)
    }

    // Bytes print as characters
    fn render(self) -> String {
        char::from(self as u8).to_string()
    }
}
