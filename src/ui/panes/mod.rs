//! TUI pane rendering modules
//!
//! # Pane Modules
//!
//! - [`program`]: disassembly listing with function entries and the failing instruction
//! - [`heap`]: block occupancy map and live allocations with hex previews
//! - [`terminal`]: output captured from `out`/`outs`
//! - [`status`]: status bar with the run outcome and keybindings
//!
//! Each pane module exports a primary `render_*` function. Scroll offsets are
//! owned by the app and clamped by the pane while rendering.

pub mod heap;
pub mod program;
pub mod status;
pub mod terminal;

pub use heap::render_heap_pane;
pub use program::{render_program_pane, ProgramRenderData};
pub use status::render_status_bar;
pub use terminal::render_terminal_pane;
