//! Logging utilities and the script console sink.
//!
//! This module provides:
//! - `log!` macro for formatted terminal output with colored module prefixes
//! - `debug!` macro gated on the global verbose flag
//! - [`Console`], the sink the evaluator's `debug_log` output and the
//!   document's "clear console on reload" behavior operate on

use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::{
    io::{Write, stdout},
    sync::atomic::{AtomicBool, Ordering},
};

/// Global verbose flag (set by the embedding application)
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set verbose mode globally
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

// ============================================================================
// Log Macros
// ============================================================================

/// Log a message with a colored module prefix
///
/// # Usage
/// ```ignore
/// log!("load"; "task #{} reading {}", id, path.display());
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a debug message (only shown when verbose mode is enabled)
///
/// # Usage
/// ```ignore
/// debug!("watch"; "baseline reset: {}", path.display());
/// ```
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Log a message with a colored module prefix
#[inline]
pub fn log(module: &str, message: &str) {
    let prefix = colorize_prefix(module);
    let mut stdout = stdout().lock();
    writeln!(stdout, "{prefix} {message}").ok();
    stdout.flush().ok();
}

/// Apply color to a module prefix based on module type
#[inline]
fn colorize_prefix(module: &str) -> String {
    let prefix = format!("[{module}]");
    match module {
        "load" => prefix.bright_blue().bold().to_string(),
        "watch" => prefix.bright_green().bold().to_string(),
        "sandbox" => prefix.bright_magenta().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// Console sink
// ============================================================================

/// Sink for script console output.
///
/// The evaluator forwards `debug_log` values here, and the document clears
/// it at the start of every load so stale output never outlives the script
/// that produced it.
pub trait Console: Send + Sync {
    /// Append one line of script output.
    fn append(&self, line: &str);

    /// Discard all accumulated output.
    fn clear(&self);
}

/// Console that writes straight to the terminal.
///
/// `clear` is a no-op: terminal scrollback is not ours to erase.
#[derive(Debug, Default)]
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn append(&self, line: &str) {
        log("script", line);
    }

    fn clear(&self) {}
}

/// Console that accumulates lines in memory.
///
/// Used by embedding UIs that render the console themselves, and by tests.
#[derive(Debug, Default)]
pub struct BufferConsole {
    lines: Mutex<Vec<String>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the accumulated lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl Console for BufferConsole {
    fn append(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }

    fn clear(&self) {
        self.lines.lock().clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
