//! Primitive wire encoding: tags, varints, zigzag integers and strings.

use crate::error::DecodeError;

/// Leading byte of every encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    /// Zigzag varint follows.
    Int32 = 0,
    /// Varint byte length and UTF-8 bytes follow.
    String = 1,
    /// Varint count and that many values follow.
    Array = 2,
    /// Varint count and that many key/value pairs follow.
    Map = 3,
    /// Nothing follows.
    Null = 4,
    /// Nothing follows.
    True = 5,
    /// Nothing follows.
    False = 6,
    /// Header value and payload value follow.
    Object = 7,
    /// Varint backward slot offset follows.
    Reference = 8,
    /// Key value follows.
    Environment = 9,
}

impl Tag {
    /// Decodes a tag byte.
    pub fn from_byte(byte: u8) -> Option<Tag> {
        Some(match byte {
            0 => Tag::Int32,
            1 => Tag::String,
            2 => Tag::Array,
            3 => Tag::Map,
            4 => Tag::Null,
            5 => Tag::True,
            6 => Tag::False,
            7 => Tag::Object,
            8 => Tag::Reference,
            9 => Tag::Environment,
            _ => return None,
        })
    }
}

/// Maps a signed integer onto an unsigned one so small magnitudes stay small.
#[inline]
pub fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Appends `value` as a base-128 varint, low groups first.
pub fn write_uint32(buffer: &mut Vec<u8>, mut value: u32) {
    while value > 0x7F {
        buffer.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    buffer.push(value as u8);
}

/// Appends `value` as a zigzag varint.
pub fn write_int32(buffer: &mut Vec<u8>, value: i32) {
    write_uint32(buffer, zigzag_encode(value));
}

/// Appends a string as its byte length followed by its UTF-8 bytes.
pub fn write_string(buffer: &mut Vec<u8>, s: &str) {
    write_uint32(buffer, s.len() as u32);
    buffer.extend_from_slice(s.as_bytes());
}

/// Cursor over an input buffer.
#[derive(Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    /// Starts reading at the beginning of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    /// Position of the next byte.
    pub fn offset(&self) -> usize {
        self.cursor
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    /// Reads one byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .bytes
            .get(self.cursor)
            .ok_or(DecodeError::Truncated { offset: self.cursor })?;
        self.cursor += 1;
        Ok(byte)
    }

    /// Reads a tag byte.
    pub fn read_tag(&mut self) -> Result<Tag, DecodeError> {
        let offset = self.cursor;
        let byte = self.read_u8()?;
        Tag::from_byte(byte).ok_or(DecodeError::UnknownTag { tag: byte, offset })
    }

    /// Reads a base-128 varint. Bits beyond the 32nd are dropped.
    pub fn read_uint32(&mut self) -> Result<u32, DecodeError> {
        let mut result: u32 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift < 32 {
                result |= ((byte & 0x7F) as u32) << shift;
            }
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// Reads a zigzag varint.
    pub fn read_int32(&mut self) -> Result<i32, DecodeError> {
        self.read_uint32().map(zigzag_decode)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let length = self.read_uint32()? as usize;
        let start = self.cursor;
        if length > self.remaining() {
            return Err(DecodeError::Truncated { offset: self.bytes.len() });
        }
        let bytes = &self.bytes[start..start + length];
        self.cursor += length;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| DecodeError::InvalidUtf8 { offset: start })
    }
}
