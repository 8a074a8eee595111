//! # CPU81 Emulator
//!
//! An emulator for the CPU81, a minimal 8-bit fantasy CPU: sixteen
//! single-byte instructions, three registers, 256 bytes of scratch RAM,
//! a 64KB external program store, and 16 output ports.
//!
//! The CPU81 has no branch instructions. Instead, the operand nibble of
//! most opcodes is a condition mask tested against the zero/minus/carry
//! flags, so any instruction can be skipped (predicated execution).

pub mod cpu;
pub mod rom;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use cpu::{Cond, Cpu, CpuError, Flags, Instruction, Ports, Ram, Registers, StepOutcome};
pub use rom::{load_image, load_mem, ImageError, ProgramImage};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
