//! PackStream serialization format.
//!
//! PackStream is the self-describing binary serialization format used by
//! the Bolt protocol. Every value starts with a one-byte marker that
//! identifies its type and, for short variants, its length.
//!
//! # Supported Types
//!
//! - **Null**: single byte marker
//! - **Boolean**: true/false markers
//! - **Integer**: signed 64-bit, variable-length encoding
//! - **Float**: 64-bit IEEE 754, big-endian
//! - **String**: UTF-8, variable length prefix
//! - **Bytes**: raw bytes, variable length prefix
//! - **List**: ordered sequence of values
//! - **Map**: string keys to values, insertion order preserved
//! - **Structure**: signature byte plus ordered fields
//!
//! Bolt messages are structures; so are graph values such as nodes
//! (signature `0x4E`) and relationships (`0x52`), which this layer keeps
//! as generic [`Structure`] values.

pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod types;

pub use decoder::{decode, Decoder, MAX_NESTING_DEPTH};
pub use encoder::{encode, Encoder};
pub use types::{Structure, Value, ValueMap};

use std::fmt;

/// PackStream codec errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackStreamError {
    /// Unexpected end of input
    UnexpectedEof,
    /// Unknown marker byte
    UnknownMarker(u8),
    /// Invalid UTF-8 in string
    InvalidUtf8(String),
    /// Invalid map key (must be a string)
    InvalidMapKey,
    /// Value too large to encode
    ValueTooLarge(&'static str, usize),
    /// Invalid structure format
    InvalidStructure(String),
    /// Value nesting exceeds the decoder's depth limit
    NestingTooDeep(usize),
}

impl fmt::Display for PackStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackStreamError::UnexpectedEof => write!(f, "Unexpected end of PackStream data"),
            PackStreamError::UnknownMarker(m) => {
                write!(f, "Unknown PackStream marker: 0x{:02X}", m)
            }
            PackStreamError::InvalidUtf8(e) => write!(f, "Invalid UTF-8 in string: {}", e),
            PackStreamError::InvalidMapKey => write!(f, "Map keys must be strings"),
            PackStreamError::ValueTooLarge(t, s) => write!(f, "{} too large: {} items", t, s),
            PackStreamError::InvalidStructure(msg) => write!(f, "Invalid structure: {}", msg),
            PackStreamError::NestingTooDeep(limit) => {
                write!(f, "Value nesting exceeds depth limit of {}", limit)
            }
        }
    }
}

impl std::error::Error for PackStreamError {}
