//! Program image loading for the CPU81.
//!
//! Two on-disk formats, both produced by external toolchains:
//! - raw binary: one byte per instruction address, no header
//! - `.mem` text: one two-digit hex byte per line
//!   - lines starting with `;` are comments
//!   - blank lines are ignored

use crate::cpu::execute::Rom;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

/// Number of addressable bytes in the instruction store.
pub const IMAGE_SIZE: usize = 1 << 16;

/// A 64KB instruction store with the program loaded at address zero.
///
/// Addresses past the end of the loaded program read as zero.
#[derive(Clone)]
pub struct ProgramImage {
    bytes: Vec<u8>,
    len: usize,
}

impl ProgramImage {
    /// Build an image from raw program bytes.
    pub fn from_bytes(program: &[u8]) -> Result<Self, ImageError> {
        if program.len() > IMAGE_SIZE {
            return Err(ImageError::TooLarge {
                size: program.len(),
            });
        }

        let mut bytes = vec![0u8; IMAGE_SIZE];
        bytes[..program.len()].copy_from_slice(program);

        Ok(Self {
            bytes,
            len: program.len(),
        })
    }

    /// Number of bytes the program occupied in the source file.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no program bytes were loaded.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Rom for ProgramImage {
    #[inline]
    fn read(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }
}

impl std::fmt::Debug for ProgramImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramImage")
            .field("len", &self.len)
            .finish()
    }
}

/// Load a raw binary image from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ProgramImage, ImageError> {
    let mut file = std::fs::File::open(path.as_ref())
        .map_err(|e| ImageError::IoError(e.to_string()))?;

    let mut program = Vec::new();
    file.read_to_end(&mut program)
        .map_err(|e| ImageError::IoError(e.to_string()))?;

    ProgramImage::from_bytes(&program)
}

/// Load a `.mem` hex text image from disk.
pub fn load_mem<P: AsRef<Path>>(path: P) -> Result<ProgramImage, ImageError> {
    let file = std::fs::File::open(path.as_ref())
        .map_err(|e| ImageError::IoError(e.to_string()))?;
    parse_mem(BufReader::new(file))
}

/// Parse the `.mem` hex text format from any reader.
pub fn parse_mem<R: BufRead>(reader: R) -> Result<ProgramImage, ImageError> {
    let mut program = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| ImageError::IoError(e.to_string()))?;
        let trimmed = line.trim();

        // Skip empty lines and comments
        if trimmed.is_empty() || trimmed.starts_with(';') {
            continue;
        }

        // Anything after the byte is treated as an inline comment
        let hex = trimmed.split_whitespace().next().unwrap_or("");
        let byte = u8::from_str_radix(hex, 16).map_err(|_| ImageError::ParseError {
            line: line_num + 1,
            message: format!("expected a two-digit hex byte, found {:?}", hex),
        })?;

        program.push(byte);
    }

    ProgramImage::from_bytes(&program)
}

/// Errors that can occur while loading a program image.
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("program size {size} exceeds the 64KB instruction store")]
    TooLarge { size: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unoccupied_addresses_read_zero() {
        let image = ProgramImage::from_bytes(&[0x30, 0x62]).unwrap();

        assert_eq!(image.len(), 2);
        assert_eq!(image.read(0), 0x30);
        assert_eq!(image.read(1), 0x62);
        assert_eq!(image.read(2), 0);
        assert_eq!(image.read(0xFFFF), 0);
    }

    #[test]
    fn test_full_size_image_is_accepted() {
        let image = ProgramImage::from_bytes(&[0xAB; IMAGE_SIZE]).unwrap();
        assert_eq!(image.read(0xFFFF), 0xAB);
    }

    #[test]
    fn test_oversize_image_is_rejected() {
        let result = ProgramImage::from_bytes(&vec![0; IMAGE_SIZE + 1]);
        assert!(matches!(result, Err(ImageError::TooLarge { .. })));
    }

    #[test]
    fn test_parse_mem() {
        let source = b"; CPU81 memory image\n30\n62\n\nA0 ; INC\n" as &[u8];

        let image = parse_mem(source).unwrap();

        assert_eq!(image.len(), 3);
        assert_eq!(image.read(0), 0x30);
        assert_eq!(image.read(1), 0x62);
        assert_eq!(image.read(2), 0xA0);
    }

    #[test]
    fn test_parse_mem_reports_line_number() {
        let source = b"30\nzz\n" as &[u8];

        match parse_mem(source) {
            Err(ImageError::ParseError { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected a parse error, got {:?}", other),
        }
    }
}
