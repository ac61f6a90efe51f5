//! # Introduction
//!
//! zvm loads compiled bytecode programs and executes them on a stack machine
//! whose frames, globals, constants and dynamic allocations all live in one
//! block-allocated heap. After a run, a terminal inspector built with
//! [ratatui](https://docs.rs/ratatui) shows the disassembly, captured output
//! and the final heap layout.
//!
//! ## Execution pipeline
//!
//! ```text
//! Program bytes → Loader → LoadedProgram → VirtualMachine (+ Heap) → Result / Inspector
//! ```
//!
//! 1. [`loader`]: validates the binary format and decodes the function table,
//!    constant pool and code segment.
//! 2. [`memory`]: the block [`memory::Heap`] with its occupancy bit table, and
//!    the typed operand and call stacks.
//! 3. [`interpreter`]: opcode table, dispatch loop and instruction semantics.
//! 4. [`ui`]: ratatui-based inspector; not part of the stable library API.
//!
//! ## Embedding
//!
//! The VM borrows its heap, output sink and crash handler, so the host keeps
//! ownership of all three and can inspect them once the run is over:
//!
//! ```no_run
//! use zvm::interpreter::{MockTerminal, RecordingCrashHandler, VirtualMachine};
//! use zvm::memory::{Heap, StackEntry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("factorial.zvm")?;
//! let program = zvm::loader::load(&bytes)?;
//! let mut heap = Heap::default();
//! let mut output = MockTerminal::new();
//! let mut crashes = RecordingCrashHandler::new();
//!
//! let result = VirtualMachine::new(program, &mut heap, &mut output, &mut crashes)
//!     .run(&[StackEntry::Int(5)])?;
//! println!("{} {}", result, output.text());
//! # Ok(())
//! # }
//! ```

pub mod interpreter;
pub mod loader;
pub mod memory;
pub mod ui;
