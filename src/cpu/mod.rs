//! CPU emulation for the CPU81.
//!
//! This module implements the complete CPU81 architecture:
//! - three 8-bit registers (A, B, X) and a 16-bit program counter
//! - 256 bytes of scratch RAM addressed through the B register
//! - 16 output ports with an observable write callback
//! - a 16-instruction set with predicated execution in place of branches

pub mod decode;
pub mod execute;
pub mod memory;
pub mod registers;

pub use decode::{Cond, Instruction};
pub use execute::{Cpu, CpuError, OutputSink, Rom, Snapshot, StepOutcome};
pub use memory::{Ports, Ram};
pub use registers::{Flags, Registers};
