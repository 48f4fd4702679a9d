//! Binary entry point: argument parsing, logging/config bring-up, and the
//! tick loop (spec.md §4.6, §6). Grounded on `fresh-editor`'s own
//! `main.rs::Args` (clap derive) and its setup-then-loop-then-restore shape,
//! reduced to the single buffer this crate edits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use zicro::app::App;
use zicro::config_io::load_layered_config;
use zicro::highlighter::NoHighlighter;
use zicro::terminal::{CrosstermTerminal, TerminalDriver};
use zicro::tracing_setup;

/// A terminal source editor with a piece-table buffer and LSP support.
#[derive(Parser, Debug)]
#[command(name = "zicro")]
#[command(about = "A terminal source editor with LSP support", long_about = None)]
#[command(version)]
struct Args {
    /// File to open. A new buffer is created if it doesn't exist yet.
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Path to the diagnostics log file.
    #[arg(long, value_name = "PATH", default_value = "zicro.log")]
    log_file: PathBuf,

    /// Trace raw LSP wire frames to the log (equivalent to ZICRO_LSP_TRACE=1).
    #[arg(long)]
    lsp_trace: bool,

    /// Enable debug-level logging.
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.lsp_trace {
        // Safe: no other threads have been spawned yet.
        unsafe { std::env::set_var("ZICRO_LSP_TRACE", "1") };
    }
    tracing_setup::init(&args.log_file, args.verbose);

    let cwd = std::env::current_dir().context("reading current directory")?;
    let config = load_layered_config(&cwd, args.file.as_deref());

    let mut app = App::new(args.file, config).context("opening file")?;

    let mut terminal = CrosstermTerminal::enter().context("entering raw mode")?;
    let highlighter = NoHighlighter;

    let result = run(&mut app, &mut terminal, &highlighter);
    drop(terminal);
    result
}

fn run(app: &mut App, terminal: &mut dyn TerminalDriver, highlighter: &NoHighlighter) -> Result<()> {
    while app.running {
        app.tick(terminal, highlighter)?;
    }
    Ok(())
}
