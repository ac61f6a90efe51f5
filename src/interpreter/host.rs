//! Collaborators injected by the host
//!
//! - [`IoSink`]: receives text from the `out`/`outs` opcodes
//! - [`CrashHandler`]: notified when the program executes `crash <code>`
//!
//! [`MockTerminal`] and [`RecordingCrashHandler`] capture everything for tests
//! and for the inspector; [`StdoutSink`] and [`LoggingCrashHandler`] are the
//! defaults used by the command-line runner.

use std::io::{self, Write};
use tracing::error;

/// Output channel for the `out` family of opcodes
pub trait IoSink {
    fn print(&mut self, value: &str);
}

/// Receives program-authored crash codes
pub trait CrashHandler {
    fn handle_crash(&mut self, code: i32);
}

/// Writes program output straight to stdout
#[derive(Debug, Default)]
pub struct StdoutSink;

impl IoSink for StdoutSink {
    fn print(&mut self, value: &str) {
        let mut stdout = io::stdout().lock();
        // Write errors are ignored
        let _ = stdout.write_all(value.as_bytes());
        let _ = stdout.flush();
    }
}

/// Mock terminal capturing program output
#[derive(Debug, Clone, Default)]
pub struct MockTerminal {
    text: String,
}

impl MockTerminal {
    pub fn new() -> Self {
        MockTerminal {
            text: String::new(),
        }
    }

    /// Everything printed so far, verbatim
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Get all lines as a vector of strings
    pub fn get_output(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.text.split('\n').map(|s| s.to_string()).collect();
        // Remove trailing empty string if text ended with newline
        if lines.last().is_some_and(|s| s.is_empty()) {
            lines.pop();
        }
        lines
    }
}

impl IoSink for MockTerminal {
    fn print(&mut self, value: &str) {
        self.text.push_str(value);
    }
}

/// Logs crash codes and otherwise lets the run terminate
#[derive(Debug, Default)]
pub struct LoggingCrashHandler;

impl CrashHandler for LoggingCrashHandler {
    fn handle_crash(&mut self, code: i32) {
        error!(code, "program crashed");
    }
}

/// Records every crash code it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingCrashHandler {
    pub codes: Vec<i32>,
}

impl RecordingCrashHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CrashHandler for RecordingCrashHandler {
    fn handle_crash(&mut self, code: i32) {
        self.codes.push(code);
    }
}
