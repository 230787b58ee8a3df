//! Compiled program file format
//!
//! A compiled program is a length header followed by the raw bytecode. The
//! header is either a single byte ([`HeaderFormat::Legacy`], programs of at
//! most 255 bytes) or a 4-byte little-endian length ([`HeaderFormat::Wide`]).

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Program encoding/decoding errors
#[derive(Debug, Error)]
pub enum ProgramError {
    /// Program does not fit the length header
    #[error("Program of {len} bytes does not fit the {format} header (max {max})")]
    TooLarge {
        /// Program length
        len: usize,
        /// Maximum length the header can express
        max: usize,
        /// Header format in use
        format: HeaderFormat,
    },

    /// Fewer bytes than the header declares
    #[error("Truncated program: header declares {declared} bytes, {available} available")]
    Truncated {
        /// Declared length
        declared: usize,
        /// Bytes actually present
        available: usize,
    },

    /// Extra bytes after the declared program
    #[error("Trailing data: {0} bytes after the declared program")]
    TrailingData(usize),

    /// Missing or short header
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for program file operations
pub type ProgramResult<T> = Result<T, ProgramError>;

/// Width of the length header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderFormat {
    /// One length byte
    Legacy,
    /// Four little-endian length bytes
    #[default]
    Wide,
}

impl HeaderFormat {
    /// Header size in bytes
    pub fn header_len(self) -> usize {
        match self {
            Self::Legacy => 1,
            Self::Wide => 4,
        }
    }

    /// Largest program length the header can express
    pub fn max_len(self) -> usize {
        match self {
            Self::Legacy => u8::MAX as usize,
            Self::Wide => u32::MAX as usize,
        }
    }

    /// Parse a format name (`legacy` or `wide`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "legacy" => Some(Self::Legacy),
            "wide" => Some(Self::Wide),
            _ => None,
        }
    }

    /// Format name
    pub fn name(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Wide => "wide",
        }
    }
}

impl std::fmt::Display for HeaderFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A finished bytecode program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    code: Vec<u8>,
}

impl Program {
    /// Wrap raw bytecode
    pub fn new(code: Vec<u8>) -> Self {
        Self { code }
    }

    /// Bytecode bytes
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Consume the program and return its bytecode
    pub fn into_code(self) -> Vec<u8> {
        self.code
    }

    /// Program length in bytes
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Whether the program has no bytes at all
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Encode header and bytecode
    pub fn encode(&self, format: HeaderFormat) -> ProgramResult<Vec<u8>> {
        let len = self.code.len();
        if len > format.max_len() {
            return Err(ProgramError::TooLarge {
                len,
                max: format.max_len(),
                format,
            });
        }

        let mut out = Vec::with_capacity(format.header_len() + len);
        match format {
            HeaderFormat::Legacy => out.push(len as u8),
            HeaderFormat::Wide => out.extend_from_slice(&(len as u32).to_le_bytes()),
        }
        out.extend_from_slice(&self.code);
        Ok(out)
    }

    /// Decode a program, requiring the data to hold exactly the declared length
    pub fn decode(data: &[u8], format: HeaderFormat) -> ProgramResult<Self> {
        let mut reader = BytecodeReader::new(data);
        let declared = match format {
            HeaderFormat::Legacy => reader.read_u8()? as usize,
            HeaderFormat::Wide => reader.read_u32()? as usize,
        };

        let available = reader.remaining();
        if available < declared {
            return Err(ProgramError::Truncated {
                declared,
                available,
            });
        }
        if available > declared {
            return Err(ProgramError::TrailingData(available - declared));
        }

        let start = reader.position();
        Ok(Self::new(data[start..start + declared].to_vec()))
    }

    /// Write header and bytecode to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W, format: HeaderFormat) -> ProgramResult<()> {
        let bytes = self.encode(format)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a whole program from a reader
    pub fn read_from<R: Read>(reader: &mut R, format: HeaderFormat) -> ProgramResult<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::decode(&data, format)
    }

    /// Save to a file
    pub fn save(&self, path: impl AsRef<Path>, format: HeaderFormat) -> ProgramResult<()> {
        let bytes = self.encode(format)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Load from a file
    pub fn load(path: impl AsRef<Path>, format: HeaderFormat) -> ProgramResult<Self> {
        let data = fs::read(path)?;
        Self::decode(&data, format)
    }
}

impl From<Vec<u8>> for Program {
    fn from(code: Vec<u8>) -> Self {
        Self::new(code)
    }
}

impl From<BytecodeWriter> for Program {
    fn from(writer: BytecodeWriter) -> Self {
        Self::new(writer.into_bytes())
    }
}
