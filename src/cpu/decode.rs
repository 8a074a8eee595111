//! Instruction decoder for the CPU81.
//!
//! Every instruction is a single byte: the high nibble selects one of
//! 16 opcodes, the low nibble is an operand. For most opcodes the
//! operand is a condition mask tested against the flags; PHA uses it
//! as a 4-bit immediate and OUT/INP use it as a port number.

use crate::cpu::registers::Flags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition mask taken from an instruction's operand nibble.
///
/// Bits 0-2 each require a flag to be set (zero, minus, carry in that
/// order); bit 3 inverts the combined result. A mask of zero always
/// passes, so `OP 0` is the unconditional form of every opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cond(u8);

impl Cond {
    /// The unconditional mask.
    pub const ALWAYS: Cond = Cond(0);

    /// Build a mask from an operand nibble. The high four bits of the
    /// byte are ignored.
    pub fn from_nibble(nibble: u8) -> Self {
        Cond(nibble & 0x0F)
    }

    /// The raw 4-bit mask.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Evaluate the mask against the current flags.
    ///
    /// Pure function: true means the instruction body runs, false
    /// means it is skipped (only the PC advance happens).
    pub fn is_met(self, flags: &Flags) -> bool {
        if self.0 == 0 {
            return true; // Always
        }
        let mut met = true;
        if self.0 & 0b0001 != 0 && !flags.zero {
            met = false;
        }
        if self.0 & 0b0010 != 0 && !flags.minus {
            met = false;
        }
        if self.0 & 0b0100 != 0 && !flags.carry {
            met = false;
        }
        if self.0 & 0b1000 != 0 {
            met = !met; // Invert
        }
        met
    }
}

impl fmt::Display for Cond {
    /// Assembler-style suffix: empty when unconditional, otherwise a
    /// `.` followed by the required-flag letters (`Z`, `M`, `C`) and
    /// `I` for inversion, e.g. `.Z` or `.IC`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return Ok(());
        }
        write!(f, ".")?;
        if self.0 & 0b1000 != 0 {
            write!(f, "I")?;
        }
        if self.0 & 0b0001 != 0 {
            write!(f, "Z")?;
        }
        if self.0 & 0b0010 != 0 {
            write!(f, "M")?;
        }
        if self.0 & 0b0100 != 0 {
            write!(f, "C")?;
        }
        Ok(())
    }
}

/// Decoded CPU81 instruction.
///
/// The opcode space is closed: all 16 high-nibble values are defined,
/// so decoding a byte can never fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Copy accumulator to B: B := A
    Tab { cond: Cond },

    /// Swap accumulator and X
    Sax { cond: Cond },

    /// Store accumulator: RAM[B] := A
    Sta { cond: Cond },

    /// Load accumulator: A := RAM[B]
    Lda { cond: Cond },

    /// Jump: PC := A | B << 8
    Jmp { cond: Cond },

    /// Push nibble: A := A << 4 | imm. Two in a row build a full byte.
    Pha { imm: u8 },

    /// Write accumulator to an output port and notify the host
    Out { port: u8 },

    /// Read an output-port latch back into the accumulator
    Inp { port: u8 },

    /// A := A + B, carry on unsigned overflow
    Add { cond: Cond },

    /// A := A - B, carry on unsigned underflow (borrow)
    Sub { cond: Cond },

    /// A := A + 1, carry on unsigned overflow
    Inc { cond: Cond },

    /// A := A - 1, carry on unsigned underflow
    Dec { cond: Cond },

    /// A := A AND B
    And { cond: Cond },

    /// A := A OR B
    Ora { cond: Cond },

    /// A := A XOR B
    Xor { cond: Cond },

    /// A := NOT A
    Not { cond: Cond },
}

impl Instruction {
    /// The condition mask gating this instruction, or `None` for the
    /// three opcodes that execute regardless of flags (PHA, OUT, INP).
    pub fn cond(&self) -> Option<Cond> {
        match *self {
            Instruction::Tab { cond }
            | Instruction::Sax { cond }
            | Instruction::Sta { cond }
            | Instruction::Lda { cond }
            | Instruction::Jmp { cond }
            | Instruction::Add { cond }
            | Instruction::Sub { cond }
            | Instruction::Inc { cond }
            | Instruction::Dec { cond }
            | Instruction::And { cond }
            | Instruction::Ora { cond }
            | Instruction::Xor { cond }
            | Instruction::Not { cond } => Some(cond),
            Instruction::Pha { .. } | Instruction::Out { .. } | Instruction::Inp { .. } => None,
        }
    }

    /// Assembler mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Tab { .. } => "TAB",
            Instruction::Sax { .. } => "SAX",
            Instruction::Sta { .. } => "STA",
            Instruction::Lda { .. } => "LDA",
            Instruction::Jmp { .. } => "JMP",
            Instruction::Pha { .. } => "PHA",
            Instruction::Out { .. } => "OUT",
            Instruction::Inp { .. } => "INP",
            Instruction::Add { .. } => "ADD",
            Instruction::Sub { .. } => "SUB",
            Instruction::Inc { .. } => "INC",
            Instruction::Dec { .. } => "DEC",
            Instruction::And { .. } => "AND",
            Instruction::Ora { .. } => "ORA",
            Instruction::Xor { .. } => "XOR",
            Instruction::Not { .. } => "NOT",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instruction::Pha { imm } => write!(f, "PHA 0x{:X}", imm),
            Instruction::Out { port } => write!(f, "OUT {}", port),
            Instruction::Inp { port } => write!(f, "INP {}", port),
            other => {
                // cond() is Some for every predicated opcode
                let cond = other.cond().unwrap_or(Cond::ALWAYS);
                write!(f, "{}{}", other.mnemonic(), cond)
            }
        }
    }
}

/// Decode a fetched byte: high nibble opcode, low nibble operand.
///
/// The opcode set is closed over all 16 values, so there is no
/// unknown-opcode case; the final arm is unreachable because the
/// nibble is masked to 4 bits.
pub fn decode(byte: u8) -> Instruction {
    let opcode = byte >> 4;
    let operand = byte & 0x0F;
    let cond = Cond::from_nibble(operand);

    match opcode {
        0x0 => Instruction::Tab { cond },
        0x1 => Instruction::Sax { cond },
        0x2 => Instruction::Sta { cond },
        0x3 => Instruction::Lda { cond },
        0x4 => Instruction::Jmp { cond },
        0x5 => Instruction::Pha { imm: operand },
        0x6 => Instruction::Out { port: operand },
        0x7 => Instruction::Inp { port: operand },
        0x8 => Instruction::Add { cond },
        0x9 => Instruction::Sub { cond },
        0xA => Instruction::Inc { cond },
        0xB => Instruction::Dec { cond },
        0xC => Instruction::And { cond },
        0xD => Instruction::Ora { cond },
        0xE => Instruction::Xor { cond },
        0xF => Instruction::Not { cond },
        _ => unreachable!("opcode nibble is masked to 4 bits"),
    }
}

/// Encode an instruction back into its single-byte form.
pub fn encode(instr: &Instruction) -> u8 {
    let (opcode, operand): (u8, u8) = match *instr {
        Instruction::Tab { cond } => (0x0, cond.bits()),
        Instruction::Sax { cond } => (0x1, cond.bits()),
        Instruction::Sta { cond } => (0x2, cond.bits()),
        Instruction::Lda { cond } => (0x3, cond.bits()),
        Instruction::Jmp { cond } => (0x4, cond.bits()),
        Instruction::Pha { imm } => (0x5, imm & 0x0F),
        Instruction::Out { port } => (0x6, port & 0x0F),
        Instruction::Inp { port } => (0x7, port & 0x0F),
        Instruction::Add { cond } => (0x8, cond.bits()),
        Instruction::Sub { cond } => (0x9, cond.bits()),
        Instruction::Inc { cond } => (0xA, cond.bits()),
        Instruction::Dec { cond } => (0xB, cond.bits()),
        Instruction::And { cond } => (0xC, cond.bits()),
        Instruction::Ora { cond } => (0xD, cond.bits()),
        Instruction::Xor { cond } => (0xE, cond.bits()),
        Instruction::Not { cond } => (0xF, cond.bits()),
    };
    (opcode << 4) | operand
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_splits_nibbles() {
        assert_eq!(
            decode(0x21),
            Instruction::Sta {
                cond: Cond::from_nibble(0x1)
            }
        );
        assert_eq!(decode(0x5A), Instruction::Pha { imm: 0xA });
        assert_eq!(decode(0x63), Instruction::Out { port: 3 });
        assert_eq!(
            decode(0x40),
            Instruction::Jmp { cond: Cond::ALWAYS }
        );
    }

    #[test]
    fn test_encode_roundtrip() {
        for byte in [0x00, 0x21, 0x3F, 0x5A, 0x6F, 0x70, 0x84, 0xB8, 0xFF] {
            assert_eq!(encode(&decode(byte)), byte);
        }
    }

    #[test]
    fn test_cond_always() {
        let flags = Flags::new();
        assert!(Cond::ALWAYS.is_met(&flags));

        // Mask zero passes regardless of flag state
        let flags = Flags {
            zero: true,
            minus: true,
            carry: true,
        };
        assert!(Cond::from_nibble(0).is_met(&flags));
    }

    #[test]
    fn test_cond_single_flags() {
        let flags = Flags {
            zero: true,
            minus: false,
            carry: false,
        };

        assert!(Cond::from_nibble(0b0001).is_met(&flags));
        assert!(!Cond::from_nibble(0b0010).is_met(&flags));
        assert!(!Cond::from_nibble(0b0100).is_met(&flags));
    }

    #[test]
    fn test_cond_requires_all_masked_flags() {
        let flags = Flags {
            zero: true,
            minus: false,
            carry: true,
        };

        // Z and C both set: passes
        assert!(Cond::from_nibble(0b0101).is_met(&flags));
        // Z and M: minus is clear, fails
        assert!(!Cond::from_nibble(0b0011).is_met(&flags));
    }

    #[test]
    fn test_cond_invert_bit() {
        let flags = Flags {
            zero: true,
            minus: false,
            carry: false,
        };

        // Inverted Z: zero is set, so the inverted test fails
        assert!(!Cond::from_nibble(0b1001).is_met(&flags));
        // Inverted M: minus is clear, so the inverted test passes
        assert!(Cond::from_nibble(0b1010).is_met(&flags));
        // Bare invert bit is a "never" condition
        assert!(!Cond::from_nibble(0b1000).is_met(&flags));
    }

    #[test]
    fn test_display() {
        assert_eq!(decode(0x00).to_string(), "TAB");
        assert_eq!(decode(0x31).to_string(), "LDA.Z");
        assert_eq!(decode(0x8D).to_string(), "ADD.IZC");
        assert_eq!(decode(0x5B).to_string(), "PHA 0xB");
        assert_eq!(decode(0x72).to_string(), "INP 2");
    }
}
