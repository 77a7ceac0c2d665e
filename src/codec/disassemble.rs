//! Textual trace of an encoded stream, for debugging.
//!
//! Nothing is materialized: each value becomes one line naming its tag, and
//! children follow on their own lines with a prefix showing where they sit.
//!
//! ```text
//! object (@0)
//! ^ string 'Point'
//!   map 2
//!   : string 'x'
//!     int32 1
//!   : string 'y'
//!     int32 2
//! ```

use super::MAX_DEPTH;
use super::wire::{ByteReader, Tag};
use crate::error::DecodeError;

/// Disassembles one top-level value; the whole input must be consumed.
pub fn disassemble(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut disassembler = Disassembler {
        input: ByteReader::new(bytes),
        slot_count: 0,
        depth: 0,
    };
    let text = disassembler.value("")?;
    match disassembler.input.remaining() {
        0 => Ok(text),
        remaining => Err(DecodeError::TrailingBytes { remaining }),
    }
}

struct Disassembler<'a> {
    input: ByteReader<'a>,
    slot_count: u32,
    depth: usize,
}

impl Disassembler<'_> {
    fn value(&mut self, indent: &str) -> Result<String, DecodeError> {
        if self.depth == MAX_DEPTH {
            return Err(DecodeError::TooDeep {
                offset: self.input.offset(),
            });
        }
        self.depth += 1;
        let text = self.tagged(indent);
        self.depth -= 1;
        text
    }

    fn tagged(&mut self, indent: &str) -> Result<String, DecodeError> {
        Ok(match self.input.read_tag()? {
            Tag::Int32 => format!("{indent}int32 {}", self.input.read_int32()?),
            Tag::String => format!("{indent}string '{}'", self.input.read_string()?),
            Tag::Array => {
                let length = self.input.read_uint32()?;
                let mut children = Vec::new();
                for i in 0..length {
                    children.push(self.value(&format!("{indent}{i:<2}"))?);
                }
                block(format!("{indent}array {length}"), children)
            }
            Tag::Map => {
                let length = self.input.read_uint32()?;
                let mut children = Vec::new();
                for _ in 0..length {
                    let key = self.value(&format!("{indent}: "))?;
                    let value = self.value(&format!("{indent}  "))?;
                    children.push(format!("{key}\n{value}"));
                }
                block(format!("{indent}map {length}"), children)
            }
            Tag::Null => format!("{indent}null"),
            Tag::True => format!("{indent}true"),
            Tag::False => format!("{indent}false"),
            Tag::Object => {
                let index = self.grab_slot();
                let header = self.value(&format!("{indent}^ "))?;
                let payload = self.value(&format!("{indent}  "))?;
                format!("{indent}object (@{index})\n{header}\n{payload}")
            }
            Tag::Reference => {
                let offset = self.input.read_uint32()?;
                let index = self.slot_count as i64 - offset as i64 - 1;
                format!("{indent}reference {offset} (=@{index})")
            }
            Tag::Environment => {
                let index = self.grab_slot();
                let key = self.value(&format!("{indent}  "))?;
                format!("{indent}environment (@{index})\n{key}")
            }
        })
    }

    fn grab_slot(&mut self) -> u32 {
        let index = self.slot_count;
        self.slot_count += 1;
        index
    }
}

fn block(line: String, children: Vec<String>) -> String {
    if children.is_empty() {
        line
    } else {
        format!("{line}\n{}", children.join("\n"))
    }
}
