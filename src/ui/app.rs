//! Inspector application state and event loop

use crate::interpreter::disasm::{disassemble, Instruction};
use crate::interpreter::errors::VmError;
use crate::interpreter::host::MockTerminal;
use crate::loader::LoadedProgram;
use crate::memory::{Heap, StackEntry};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    Frame, Terminal,
    backend::Backend,
    layout::{Constraint, Direction, Layout},
};
use std::io;
use std::time::Duration;

/// Everything the inspector shows about a finished run
pub struct RunReport {
    pub program: LoadedProgram,
    /// The heap as the run left it
    pub heap: Heap,
    pub output: MockTerminal,
    pub outcome: Result<StackEntry, VmError>,
}

/// Which pane is currently focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Program,
    Output,
    Heap,
}

impl FocusedPane {
    /// Move focus to the next pane (program -> output -> heap)
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Program => FocusedPane::Output,
            FocusedPane::Output => FocusedPane::Heap,
            FocusedPane::Heap => FocusedPane::Program,
        }
    }

    /// Move focus to the previous pane
    pub fn prev(self) -> Self {
        match self {
            FocusedPane::Program => FocusedPane::Heap,
            FocusedPane::Output => FocusedPane::Program,
            FocusedPane::Heap => FocusedPane::Output,
        }
    }
}

/// The inspector state
pub struct App {
    pub report: RunReport,

    /// Disassembly of the code segment, decoded once
    pub listing: Vec<Instruction>,

    /// Currently focused pane
    pub focused_pane: FocusedPane,

    /// Per-pane scroll offsets
    pub program_scroll: usize,
    pub output_scroll: usize,
    pub heap_scroll: usize,

    /// Whether the app should quit
    pub should_quit: bool,
}

impl App {
    pub fn new(report: RunReport) -> Self {
        let listing = disassemble(&report.program.code);

        // Open the listing at the failing instruction, if any
        let program_scroll = report
            .outcome
            .as_ref()
            .err()
            .and_then(VmError::ip)
            .and_then(|ip| listing.iter().position(|i| i.offset == ip))
            .map_or(0, |row| row.saturating_sub(3));

        App {
            report,
            listing,
            focused_pane: FocusedPane::Program,
            program_scroll,
            output_scroll: usize::MAX,
            heap_scroll: 0,
            should_quit: false,
        }
    }

    /// Run the inspector until the user quits
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_event(key);
                    }
                }
            }
        }

        Ok(())
    }

    fn render(&mut self, frame: &mut Frame) {
        let size = frame.area();

        // 3 panes in 2 columns, plus status bar at bottom
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(size);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(main_chunks[0]);

        // Left column: Program (top) | Output (bottom)
        let left_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(columns[0]);

        super::panes::render_program_pane(
            frame,
            left_rows[0],
            super::panes::ProgramRenderData {
                program: &self.report.program,
                listing: &self.listing,
                failing_ip: self.report.outcome.as_ref().err().and_then(VmError::ip),
            },
            self.focused_pane == FocusedPane::Program,
            &mut self.program_scroll,
        );

        super::panes::render_terminal_pane(
            frame,
            left_rows[1],
            &self.report.output,
            self.focused_pane == FocusedPane::Output,
            &mut self.output_scroll,
        );

        super::panes::render_heap_pane(
            frame,
            columns[1],
            &self.report.heap,
            self.focused_pane == FocusedPane::Heap,
            &mut self.heap_scroll,
        );

        super::panes::render_status_bar(
            frame,
            main_chunks[1],
            &self.report.outcome,
            &self.report.heap,
        );
    }

    fn scroll_mut(&mut self) -> &mut usize {
        match self.focused_pane {
            FocusedPane::Program => &mut self.program_scroll,
            FocusedPane::Output => &mut self.output_scroll,
            FocusedPane::Heap => &mut self.heap_scroll,
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
            }
            KeyCode::BackTab => {
                self.focused_pane = self.focused_pane.prev();
            }
            KeyCode::Up => {
                let scroll = self.scroll_mut();
                *scroll = scroll.saturating_sub(1);
            }
            KeyCode::Down => {
                let scroll = self.scroll_mut();
                *scroll = scroll.saturating_add(1);
            }
            KeyCode::PageUp => {
                let scroll = self.scroll_mut();
                *scroll = scroll.saturating_sub(10);
            }
            KeyCode::PageDown => {
                let scroll = self.scroll_mut();
                *scroll = scroll.saturating_add(10);
            }
            KeyCode::Home => *self.scroll_mut() = 0,
            // Panes clamp the offset to their content when rendering
            KeyCode::End => *self.scroll_mut() = usize::MAX,
            _ => {}
        }
    }
}
