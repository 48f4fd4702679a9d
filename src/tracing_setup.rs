//! Tracing subscriber setup, grounded on `fresh`'s
//! `services/tracing_setup.rs`: a single file-backed writer (never
//! stdout/stderr, which the terminal UI owns) plus `RUST_LOG` env
//! filtering. LSP wire traces (`lsp::client::trace_wire`) land in the same
//! file at `trace!` level when `ZICRO_LSP_TRACE=1` is set.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `verbose` lowers the default level from
/// `INFO` to `DEBUG` when `RUST_LOG` isn't set. Returns `false` (and leaves
/// tracing uninitialized) if the log file can't be created — the app falls
/// back to running without logging rather than failing to start.
pub fn init(log_file: &Path, verbose: bool) -> bool {
    let Ok(file) = File::create(log_file) else {
        return false;
    };
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = fmt::layer().with_ansi(false).with_writer(Arc::new(file));

    tracing_subscriber::registry().with(fmt_layer).with(env_filter).init();
    true
}
