//! PackStream decoder.
//!
//! `decode` consumes exactly one value from the input and reports how
//! many bytes it read via [`Decoder::position`]. Unknown markers,
//! truncated input, and non-string map keys are malformed input.

use bytes::Buf;

use super::marker::*;
use super::types::{Structure, Value, ValueMap};
use super::PackStreamError;

/// Maximum nesting depth the decoder will follow before bailing out.
///
/// Bounds recursion on hostile input; values nested deeper than this
/// fail with [`PackStreamError::NestingTooDeep`] instead of overflowing
/// the stack.
pub const MAX_NESTING_DEPTH: usize = 128;

/// PackStream decoder that reads values from a byte buffer.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Get the current position (bytes consumed so far).
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get remaining bytes count.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> Result<Value, PackStreamError> {
        self.decode_value(0)
    }

    fn decode_value(&mut self, depth: usize) -> Result<Value, PackStreamError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(PackStreamError::NestingTooDeep(MAX_NESTING_DEPTH));
        }

        let marker = self.read_u8()?;

        // Tiny markers carry the length in the low nibble
        if is_tiny_string(marker) {
            let len = tiny_string_len(marker);
            return self.read_string_data(len);
        }

        if is_tiny_list(marker) {
            let len = tiny_list_len(marker);
            return self.read_list_data(len, depth);
        }

        if is_tiny_map(marker) {
            let len = tiny_map_len(marker);
            return self.read_map_data(len, depth);
        }

        if is_tiny_struct(marker) {
            let len = tiny_struct_fields(marker);
            return self.read_struct_data(len, depth);
        }

        match marker {
            NULL => Ok(Value::Null),
            TRUE => Ok(Value::Boolean(true)),
            FALSE => Ok(Value::Boolean(false)),

            FLOAT_64 => Ok(Value::Float(self.read_f64()?)),

            INT_8 => Ok(Value::Integer(self.read_i8()? as i64)),
            INT_16 => Ok(Value::Integer(self.read_i16()? as i64)),
            INT_32 => Ok(Value::Integer(self.read_i32()? as i64)),
            INT_64 => Ok(Value::Integer(self.read_i64()?)),

            BYTES_8 => {
                let len = self.read_u8()? as usize;
                self.read_bytes_data(len)
            }
            BYTES_16 => {
                let len = self.read_u16()? as usize;
                self.read_bytes_data(len)
            }
            BYTES_32 => {
                let len = self.read_u32()? as usize;
                self.read_bytes_data(len)
            }

            STRING_8 => {
                let len = self.read_u8()? as usize;
                self.read_string_data(len)
            }
            STRING_16 => {
                let len = self.read_u16()? as usize;
                self.read_string_data(len)
            }
            STRING_32 => {
                let len = self.read_u32()? as usize;
                self.read_string_data(len)
            }

            LIST_8 => {
                let len = self.read_u8()? as usize;
                self.read_list_data(len, depth)
            }
            LIST_16 => {
                let len = self.read_u16()? as usize;
                self.read_list_data(len, depth)
            }
            LIST_32 => {
                let len = self.read_u32()? as usize;
                self.read_list_data(len, depth)
            }

            MAP_8 => {
                let len = self.read_u8()? as usize;
                self.read_map_data(len, depth)
            }
            MAP_16 => {
                let len = self.read_u16()? as usize;
                self.read_map_data(len, depth)
            }
            MAP_32 => {
                let len = self.read_u32()? as usize;
                self.read_map_data(len, depth)
            }

            STRUCT_8 => {
                let len = self.read_u8()? as usize;
                self.read_struct_data(len, depth)
            }
            STRUCT_16 => {
                let len = self.read_u16()? as usize;
                self.read_struct_data(len, depth)
            }

            // Remaining markers are tiny ints (positive 0x00-0x7F,
            // negative 0xF0-0xFF); every other range was matched above.
            m if is_tiny_int(m) => Ok(Value::Integer(decode_tiny_int(m) as i64)),

            _ => Err(PackStreamError::UnknownMarker(marker)),
        }
    }

    fn read_bytes_data(&mut self, len: usize) -> Result<Value, PackStreamError> {
        let bytes = self.read_bytes(len)?;
        Ok(Value::Bytes(bytes.to_vec()))
    }

    fn read_string_data(&mut self, len: usize) -> Result<Value, PackStreamError> {
        let bytes = self.read_bytes(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))?;
        Ok(Value::String(s.to_string()))
    }

    fn read_list_data(&mut self, len: usize, depth: usize) -> Result<Value, PackStreamError> {
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(self.decode_value(depth + 1)?);
        }
        Ok(Value::List(items))
    }

    fn read_map_data(&mut self, len: usize, depth: usize) -> Result<Value, PackStreamError> {
        let mut map = ValueMap::with_capacity(len.min(1024));
        for _ in 0..len {
            let key = match self.decode_value(depth + 1)? {
                Value::String(s) => s,
                _ => return Err(PackStreamError::InvalidMapKey),
            };
            let value = self.decode_value(depth + 1)?;
            // Duplicate keys: last value wins
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }

    fn read_struct_data(&mut self, field_count: usize, depth: usize) -> Result<Value, PackStreamError> {
        let signature = self.read_u8()?;
        let mut fields = Vec::with_capacity(field_count.min(64));
        for _ in 0..field_count {
            fields.push(self.decode_value(depth + 1)?);
        }
        Ok(Value::Structure(Structure::new(signature, fields)))
    }

    // Low-level read methods

    fn read_u8(&mut self) -> Result<u8, PackStreamError> {
        if self.remaining() < 1 {
            return Err(PackStreamError::UnexpectedEof);
        }
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    fn read_i8(&mut self) -> Result<i8, PackStreamError> {
        Ok(self.read_u8()? as i8)
    }

    fn read_u16(&mut self) -> Result<u16, PackStreamError> {
        if self.remaining() < 2 {
            return Err(PackStreamError::UnexpectedEof);
        }
        let value = (&self.data[self.pos..]).get_u16();
        self.pos += 2;
        Ok(value)
    }

    fn read_i16(&mut self) -> Result<i16, PackStreamError> {
        if self.remaining() < 2 {
            return Err(PackStreamError::UnexpectedEof);
        }
        let value = (&self.data[self.pos..]).get_i16();
        self.pos += 2;
        Ok(value)
    }

    fn read_u32(&mut self) -> Result<u32, PackStreamError> {
        if self.remaining() < 4 {
            return Err(PackStreamError::UnexpectedEof);
        }
        let value = (&self.data[self.pos..]).get_u32();
        self.pos += 4;
        Ok(value)
    }

    fn read_i32(&mut self) -> Result<i32, PackStreamError> {
        if self.remaining() < 4 {
            return Err(PackStreamError::UnexpectedEof);
        }
        let value = (&self.data[self.pos..]).get_i32();
        self.pos += 4;
        Ok(value)
    }

    fn read_i64(&mut self) -> Result<i64, PackStreamError> {
        if self.remaining() < 8 {
            return Err(PackStreamError::UnexpectedEof);
        }
        let value = (&self.data[self.pos..]).get_i64();
        self.pos += 8;
        Ok(value)
    }

    fn read_f64(&mut self) -> Result<f64, PackStreamError> {
        if self.remaining() < 8 {
            return Err(PackStreamError::UnexpectedEof);
        }
        let value = (&self.data[self.pos..]).get_f64();
        self.pos += 8;
        Ok(value)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], PackStreamError> {
        if self.remaining() < len {
            return Err(PackStreamError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
}

/// Convenience function to decode a single value from bytes.
pub fn decode(data: &[u8]) -> Result<Value, PackStreamError> {
    let mut decoder = Decoder::new(data);
    decoder.decode()
}
