//! Block-based heap allocator
//!
//! This module provides the VM's byte-addressed memory:
//! - A fixed-size byte buffer, rounded up to a whole number of blocks
//! - A [`BitTable`] with one bit per block (`true` = in use)
//! - First-fit allocation over contiguous runs of free blocks
//! - Self-describing allocations: a 4-byte header in front of every returned
//!   address stores the allocation's block count, read back by [`Heap::free`]
//!
//! # Layout
//!
//! ```text
//! block:   | 0 ........ | 1 ........ | 2 ........ | 3 ...
//! alloc:   [hdr][data ..............]
//!               ^ returned address = head * block_size + HEADER_SIZE
//! ```
//!
//! Freed neighbours are not coalesced and the heap is never compacted; a
//! fragmented heap can fail a request even when enough bytes are free in
//! total. [`HeapError::OutOfMemory`] reports the largest free run to make this
//! visible.

use super::bits::BitTable;
use super::value::Address;
use crate::interpreter::constants::{DEFAULT_BLOCK_SIZE, DEFAULT_HEAP_SIZE};
use std::fmt;

/// Size of the allocation header preceding every returned address
pub const HEADER_SIZE: usize = 4;

/// Errors raised by heap operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    /// No run of free blocks is large enough for the request
    OutOfMemory {
        requested: usize,
        free: usize,
        largest_free_run: usize,
    },

    /// `free` was given an address that cannot have come from `allocate`
    CorruptedHeap { address: Address, reason: String },

    /// An access fell outside the heap buffer
    OutOfBounds {
        address: Address,
        len: usize,
        size: usize,
    },
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::OutOfMemory {
                requested,
                free,
                largest_free_run,
            } => {
                write!(
                    f,
                    "Out of memory: requested {} bytes, {} bytes free",
                    requested, free
                )?;
                if largest_free_run < free {
                    write!(
                        f,
                        " (fragmented, largest contiguous run is {} bytes)",
                        largest_free_run
                    )?;
                }
                Ok(())
            }
            HeapError::CorruptedHeap { address, reason } => {
                write!(f, "Corrupted heap: free(0x{:x}): {}", address, reason)
            }
            HeapError::OutOfBounds { address, len, size } => {
                write!(
                    f,
                    "Out of bounds: {} byte(s) at 0x{:x} in heap of {} bytes",
                    len, address, size
                )
            }
        }
    }
}

impl std::error::Error for HeapError {}

/// A live allocation discovered by walking the bit table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Address returned to the caller (just past the header)
    pub address: Address,
    /// Number of blocks covered, header included
    pub blocks: usize,
}

impl Allocation {
    /// Usable bytes after the header
    pub fn capacity(&self, block_size: usize) -> usize {
        (self.blocks * block_size).saturating_sub(HEADER_SIZE)
    }
}

/// The heap
#[derive(Debug, Clone)]
pub struct Heap {
    memory: Vec<u8>,
    block_size: usize,
    blocks: BitTable,
}

impl Heap {
    /// Create a heap of at least `size` bytes split into `block_size` blocks.
    ///
    /// `size` is rounded up to a multiple of `block_size`, which must be nonzero.
    pub fn new(size: usize, block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be nonzero");

        let size = size.div_ceil(block_size) * block_size;
        Heap {
            memory: vec![0; size],
            block_size,
            blocks: BitTable::new(size / block_size),
        }
    }

    /// Total heap size in bytes
    pub fn size(&self) -> usize {
        self.memory.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn total_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn used_blocks(&self) -> usize {
        self.blocks.count_ones()
    }

    /// Whether block `index` is in use
    pub fn is_block_used(&self, index: usize) -> bool {
        self.blocks.get(index)
    }

    /// Bytes not covered by any live allocation
    pub fn free_memory_size(&self) -> usize {
        (self.blocks.len() - self.blocks.count_ones()) * self.block_size
    }

    /// Allocate at least `size` bytes and return the address of the first one
    pub fn allocate(&mut self, size: usize) -> Result<Address, HeapError> {
        let out_of_memory = |heap: &Heap| HeapError::OutOfMemory {
            requested: size,
            free: heap.free_memory_size(),
            largest_free_run: heap.blocks.longest_clear_run() * heap.block_size,
        };

        let actual_size = size
            .checked_add(HEADER_SIZE)
            .map(|n| n.div_ceil(self.block_size) * self.block_size)
            .ok_or_else(|| out_of_memory(self))?;
        let block_count = actual_size / self.block_size;

        let head = if block_count == 1 {
            self.blocks.first_clear()
        } else {
            self.find_free_run(block_count)
        }
        .ok_or_else(|| out_of_memory(self))?;

        let header_address = head * self.block_size;
        self.write_header(header_address, block_count);
        self.blocks.set_range(head, head + block_count);

        Ok(header_address + HEADER_SIZE)
    }

    /// First-fit search for `count` contiguous free blocks.
    ///
    /// Each window `[head, tail]` is scanned from `tail` downwards, stopping at
    /// the first index not already known to be clear. The highest set bit found
    /// moves the next window just past it, so no bit is examined twice.
    fn find_free_run(&self, count: usize) -> Option<usize> {
        let mut head = 0;
        let mut unchecked = 0;

        loop {
            let tail = head + count - 1;
            if tail >= self.blocks.len() {
                return None;
            }

            match self.blocks.last_set_in(head.max(unchecked), tail) {
                None => return Some(head),
                Some(used) => {
                    unchecked = tail + 1;
                    head = used + 1;
                }
            }
        }
    }

    /// Release an allocation previously returned by [`Heap::allocate`]
    pub fn free(&mut self, address: Address) -> Result<(), HeapError> {
        let corrupted = |reason: &str| HeapError::CorruptedHeap {
            address,
            reason: reason.to_string(),
        };

        let actual_address = address
            .checked_sub(HEADER_SIZE)
            .ok_or_else(|| corrupted("address precedes the first header"))?;
        if actual_address % self.block_size != 0 {
            return Err(corrupted("header is not block aligned"));
        }
        if actual_address + HEADER_SIZE > self.size() {
            return Err(corrupted("address is outside the heap"));
        }

        let block_count = self.read_header(actual_address).unwrap_or(0);
        let first = actual_address / self.block_size;
        if block_count == 0 || first + block_count > self.blocks.len() {
            return Err(corrupted(&format!(
                "header holds invalid block count {}",
                block_count
            )));
        }
        if !self.blocks.all_set(first, first + block_count) {
            return Err(corrupted("blocks are not allocated (double free?)"));
        }

        self.blocks.clear_range(first, first + block_count);
        Ok(())
    }

    /// Walk the bit table and report every live allocation
    pub fn live_allocations(&self) -> Vec<Allocation> {
        let mut allocations = Vec::new();
        let mut index = 0;

        while index < self.blocks.len() {
            if !self.blocks.get(index) {
                index += 1;
                continue;
            }

            // Headers may have been overwritten by the program
            let remaining = self.blocks.len() - index;
            let blocks = self
                .read_header(index * self.block_size)
                .unwrap_or(1)
                .clamp(1, remaining);
            allocations.push(Allocation {
                address: index * self.block_size + HEADER_SIZE,
                blocks,
            });
            index += blocks;
        }

        allocations
    }

    fn read_header(&self, header_address: Address) -> Option<usize> {
        let bytes = self.memory.get(header_address..header_address.checked_add(HEADER_SIZE)?)?;
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(bytes);
        Some(u32::from_be_bytes(header) as usize)
    }

    fn write_header(&mut self, header_address: Address, block_count: usize) {
        self.memory[header_address..header_address + HEADER_SIZE]
            .copy_from_slice(&(block_count as u32).to_be_bytes());
    }

    fn check_range(&self, address: Address, len: usize) -> Result<(), HeapError> {
        match address.checked_add(len) {
            Some(end) if end <= self.memory.len() => Ok(()),
            _ => Err(HeapError::OutOfBounds {
                address,
                len,
                size: self.memory.len(),
            }),
        }
    }

    /// Read a single byte
    pub fn get(&self, address: Address) -> Result<u8, HeapError> {
        self.check_range(address, 1)?;
        Ok(self.memory[address])
    }

    /// Write a single byte
    pub fn set(&mut self, address: Address, byte: u8) -> Result<(), HeapError> {
        self.check_range(address, 1)?;
        self.memory[address] = byte;
        Ok(())
    }

    /// Read a 4-byte big-endian integer
    pub fn read_int(&self, address: Address) -> Result<i32, HeapError> {
        self.check_range(address, 4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.memory[address..address + 4]);
        Ok(i32::from_be_bytes(bytes))
    }

    /// Write a 4-byte big-endian integer
    pub fn write_int(&mut self, address: Address, value: i32) -> Result<(), HeapError> {
        self.check_range(address, 4)?;
        self.memory[address..address + 4].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Copy `bytes` into the heap starting at `address`
    pub fn copy_in(&mut self, address: Address, bytes: &[u8]) -> Result<(), HeapError> {
        self.check_range(address, bytes.len())?;
        self.memory[address..address + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Fill `buffer` from the heap starting at `address`
    pub fn copy_out(&self, address: Address, buffer: &mut [u8]) -> Result<(), HeapError> {
        self.check_range(address, buffer.len())?;
        buffer.copy_from_slice(&self.memory[address..address + buffer.len()]);
        Ok(())
    }

    /// Move `count` bytes from `src` to `dst`; the ranges may overlap
    pub fn copy_memory(
        &mut self,
        src: Address,
        dst: Address,
        count: usize,
    ) -> Result<(), HeapError> {
        self.check_range(src, count)?;
        self.check_range(dst, count)?;
        self.memory.copy_within(src..src + count, dst);
        Ok(())
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(DEFAULT_HEAP_SIZE, DEFAULT_BLOCK_SIZE)
    }
}
