//! TUI debugger for the CPU81 emulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Real-time register and flag visualization
//! - Scratch-RAM view with the current B address highlighted
//! - Output-port log
//! - Step/run/breakpoint controls
//! - Disassembly view

mod app;
mod ui;

pub use app::{run_debugger, DebuggerApp};
