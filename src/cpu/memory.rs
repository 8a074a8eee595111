//! CPU81 data memory and I/O port latches.
//!
//! Scratch RAM is 256 bytes and is addressed exclusively through the
//! B register, so every address is valid and no access can fail.

use serde::{Deserialize, Serialize};

/// Number of bytes in the scratch RAM.
pub const RAM_SIZE: usize = 256;

/// Number of output (and reserved input) port latches.
pub const PORT_COUNT: usize = 16;

/// CPU81 scratch memory: 256 byte cells.
#[derive(Clone, Serialize, Deserialize)]
pub struct Ram {
    cells: Vec<u8>,
}

impl Ram {
    /// Create a new RAM with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; RAM_SIZE],
        }
    }

    /// Read the cell addressed by the B register.
    #[inline]
    pub fn read(&self, addr: u8) -> u8 {
        self.cells[addr as usize]
    }

    /// Write the cell addressed by the B register.
    #[inline]
    pub fn write(&mut self, addr: u8, value: u8) {
        self.cells[addr as usize] = value;
    }

    /// Clear all cells to zero.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// The whole RAM as a byte slice, for dumps and snapshots.
    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    /// Dump a range of cells (for debugging).
    pub fn dump(&self, start: u8, count: usize) -> Vec<(u8, u8)> {
        let end = (start as usize + count).min(RAM_SIZE);
        (start as usize..end)
            .map(|i| (i as u8, self.cells[i]))
            .collect()
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Ram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Ram")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &RAM_SIZE)
            .finish()
    }
}

/// Output and input port latches, 16 of each.
///
/// The input latches are part of the architectural state but no
/// instruction writes them; INP reads back the output latches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ports {
    /// Output latches, written by OUT.
    pub out: [u8; PORT_COUNT],

    /// Input latches, reserved for host extensions.
    pub inp: [u8; PORT_COUNT],
}

impl Ports {
    /// Create ports with all latches zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every latch to zero.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
