//! Compact light program bytecode and its low-level reader
//!
//! A light program is an immutable byte stream describing a single drone's
//! LED output over time. Instructions are a 1-byte opcode followed by raw
//! color/level bytes and varuint-encoded durations counted in 1/50 s ticks.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::color::Rgb;

/// Duration of one light program tick in milliseconds (programs count time
/// in units of 1/50 s).
pub const TICK_MS: u64 = 20;

/// Errors raised while decoding light program bytecode or querying a player.
#[derive(Debug, Error)]
pub enum LightProgramError {
    /// The base64 text form of a program could not be decoded into bytes
    #[error("invalid base64 light program: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The byte stream ended in the middle of an instruction
    #[error("light program truncated at byte {offset}")]
    TruncatedProgram {
        /// Byte offset at which more input was expected
        offset: usize,
    },

    /// A varuint-encoded value did not fit in 64 bits
    #[error("varuint at byte {offset} does not fit in 64 bits")]
    VarintOverflow {
        /// Byte offset of the first byte of the offending value
        offset: usize,
    },

    /// An instruction code outside the instruction set was encountered
    #[error("unknown opcode {opcode} at byte {offset}")]
    UnknownOpcode {
        /// The unrecognized instruction code
        opcode: u8,
        /// Byte offset of the instruction
        offset: usize,
    },

    /// A loop-end instruction executed with no open loop
    #[error("loop end at byte {offset} without a matching loop begin")]
    UnmatchedLoopEnd {
        /// Byte offset of the instruction
        offset: usize,
    },

    /// A color query was made with a NaN or infinite timestamp
    #[error("query time {0} is not finite")]
    NonFiniteTime(f64),

    /// A frame iterator was requested with a non-finite or non-positive rate
    #[error("invalid frame rate {0}")]
    InvalidFrameRate(f64),
}

/// Instruction codes of the light program bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// End of program
    End,
    /// No operation
    Nop,
    /// Hold the current color for a duration
    Sleep,
    /// Hold the current color until an absolute timestamp
    WaitUntil,
    /// Set an RGB color, then hold it for a duration
    SetColor,
    /// Set a gray level, then hold it for a duration
    SetGray,
    /// Set black, then hold it for a duration
    SetBlack,
    /// Set white, then hold it for a duration
    SetWhite,
    /// Fade linearly to an RGB color over a duration
    FadeToColor,
    /// Fade linearly to a gray level over a duration
    FadeToGray,
    /// Fade linearly to black over a duration
    FadeToBlack,
    /// Fade linearly to white over a duration
    FadeToWhite,
    /// Open a loop with an iteration count (0 = infinite)
    LoopBegin,
    /// Close the innermost open loop
    LoopEnd,
    /// Set a pyrotechnic channel; no effect on color
    SetPyro,
    /// Set all pyrotechnic channels; no effect on color
    SetPyroAll,
}

impl Opcode {
    /// Decode an instruction code; `None` for codes outside the set.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        match byte {
            0 => Some(Opcode::End),
            1 => Some(Opcode::Nop),
            2 => Some(Opcode::Sleep),
            3 => Some(Opcode::WaitUntil),
            4 => Some(Opcode::SetColor),
            5 => Some(Opcode::SetGray),
            6 => Some(Opcode::SetBlack),
            7 => Some(Opcode::SetWhite),
            8 => Some(Opcode::FadeToColor),
            9 => Some(Opcode::FadeToGray),
            10 => Some(Opcode::FadeToBlack),
            11 => Some(Opcode::FadeToWhite),
            12 => Some(Opcode::LoopBegin),
            13 => Some(Opcode::LoopEnd),
            20 => Some(Opcode::SetPyro),
            21 => Some(Opcode::SetPyroAll),
            _ => None,
        }
    }
}

/// A single drone's LED light program: an immutable, cheaply clonable
/// instruction stream.
///
/// Programs are owned by the show data and read-only to the interpreter.
/// On the wire (show files) a program is base64 text; serde support uses
/// that form.
#[derive(Clone)]
pub struct LightProgram {
    data: Arc<[u8]>,
}

impl LightProgram {
    /// Wrap an already-decoded byte stream
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: bytes.into().into(),
        }
    }

    /// Decode a base64 text form of a program
    pub fn from_base64(text: &str) -> Result<Self, LightProgramError> {
        let bytes = STANDARD.decode(text)?;
        Ok(Self::from_bytes(bytes))
    }

    /// The raw instruction stream
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Length of the instruction stream in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the program contains no instructions at all
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for LightProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LightProgram({} bytes)", self.data.len())
    }
}

impl Serialize for LightProgram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.data))
    }
}

impl<'de> Deserialize<'de> for LightProgram {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        LightProgram::from_base64(&text).map_err(serde::de::Error::custom)
    }
}

/// Cursor over a program's byte stream with primitive readers for the
/// operand encodings the instruction set uses.
#[derive(Debug, Clone)]
pub(crate) struct ProgramReader {
    program: LightProgram,
    cursor: usize,
}

impl ProgramReader {
    pub(crate) fn new(program: LightProgram) -> Self {
        Self { program, cursor: 0 }
    }

    /// Current byte offset into the program
    pub(crate) fn offset(&self) -> usize {
        self.cursor
    }

    /// Jump to an absolute byte offset (loop back-edges)
    pub(crate) fn jump(&mut self, offset: usize) {
        self.cursor = offset;
    }

    pub(crate) fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Read the next byte, `None` once the stream is exhausted
    pub(crate) fn read_byte(&mut self) -> Option<u8> {
        let byte = self.program.as_bytes().get(self.cursor).copied()?;
        self.cursor += 1;
        Some(byte)
    }

    /// Read the next byte, failing if the stream ends mid-instruction
    pub(crate) fn expect_byte(&mut self) -> Result<u8, LightProgramError> {
        let offset = self.cursor;
        self.read_byte()
            .ok_or(LightProgramError::TruncatedProgram { offset })
    }

    /// Read three raw bytes as an RGB color operand
    pub(crate) fn read_rgb(&mut self) -> Result<Rgb, LightProgramError> {
        let r = self.expect_byte()?;
        let g = self.expect_byte()?;
        let b = self.expect_byte()?;
        Ok(Rgb::new(r, g, b))
    }

    /// Read a little-endian base-128 varuint (LEB128, continuation bit 0x80)
    pub(crate) fn read_varuint(&mut self) -> Result<u64, LightProgramError> {
        let start = self.cursor;
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.expect_byte()?;
            if shift >= 64 {
                return Err(LightProgramError::VarintOverflow { offset: start });
            }
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }
}
