// zvm: bytecode virtual machine runner with a post-run heap inspector

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing_subscriber::EnvFilter;

use zvm::interpreter::constants::{DEFAULT_BLOCK_SIZE, DEFAULT_HEAP_SIZE};
use zvm::interpreter::{
    IoSink, LoggingCrashHandler, MockTerminal, StdoutSink, VirtualMachine, VmError,
};
use zvm::loader;
use zvm::memory::{Heap, StackEntry};
use zvm::ui::{App, RunReport};

#[derive(Parser, Debug)]
#[command(name = "zvm", about = "Run a compiled bytecode program")]
struct Cli {
    /// Path to the program binary
    program: PathBuf,

    /// Arguments passed to main (`5`, `int:5`, `byte:7`)
    #[arg(allow_hyphen_values = true)]
    args: Vec<StackEntry>,

    /// Heap size in bytes
    #[arg(long, default_value_t = DEFAULT_HEAP_SIZE)]
    heap_size: usize,

    /// Allocation block size in bytes
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Stream output to stdout instead of opening the inspector
    #[arg(long)]
    no_tui: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zvm=warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

/// Returns whether the program completed normally
fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let bytes = fs::read(&cli.program)
        .map_err(|e| format!("cannot read '{}': {}", cli.program.display(), e))?;
    let program = loader::load(&bytes)?;
    if cli.block_size == 0 {
        return Err("block size must be at least 1".into());
    }
    let mut heap = Heap::new(cli.heap_size, cli.block_size);

    if cli.no_tui {
        let outcome = execute_program(program, &mut heap, &mut StdoutSink, &cli.args);
        return Ok(match outcome {
            Ok(result) => {
                println!();
                println!("{}", result);
                true
            }
            Err(e) => {
                eprintln!("{}", e);
                false
            }
        });
    }

    let mut output = MockTerminal::new();
    let outcome = execute_program(program.clone(), &mut heap, &mut output, &cli.args);
    let completed = outcome.is_ok();

    let mut app = App::new(RunReport {
        program,
        heap,
        output,
        outcome,
    });
    inspect(&mut app)?;

    Ok(completed)
}

fn execute_program(
    program: loader::LoadedProgram,
    heap: &mut Heap,
    io: &mut dyn IoSink,
    args: &[StackEntry],
) -> Result<StackEntry, VmError> {
    let mut crash_handler = LoggingCrashHandler;
    let mut vm = VirtualMachine::new(program, heap, io, &mut crash_handler);
    vm.run(args)
}

fn inspect(app: &mut App) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = app.run(&mut terminal);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}
