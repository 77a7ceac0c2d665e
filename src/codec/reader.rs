//! Reader for the plankton object-graph format.
//!
//! Mirrors [`GraphWriter`](super::writer::GraphWriter): slots are taken in
//! the same order, so a reference's backward offset names the same slot on
//! both sides. An object's slot is filled with an empty instance as soon as
//! its header is read, which lets its payload refer back to it.

use super::MAX_DEPTH;
use super::wire::{ByteReader, Tag};
use crate::error::DecodeError;
use crate::registry::{Header, Registry};
use crate::value::{EnvironmentKey, Map, ObjectRef, Value};

/// Looks up the value an environment key stands for.
pub type Access<'r> = dyn Fn(&Value) -> Option<Value> + 'r;

/// Per-call reader state.
pub struct GraphReader<'a> {
    input: ByteReader<'a>,
    /// One entry per slot; `None` until the slot is finalized.
    slots: Vec<Option<Value>>,
    registry: &'a Registry,
    access: Option<&'a Access<'a>>,
    default_object: bool,
    /// Values currently being read, outermost included.
    depth: usize,
}

impl<'a> GraphReader<'a> {
    /// Creates a reader over `bytes`.
    pub fn new(bytes: &'a [u8], registry: &'a Registry) -> Self {
        Self {
            input: ByteReader::new(bytes),
            slots: Vec::new(),
            registry,
            access: None,
            default_object: true,
            depth: 0,
        }
    }

    /// Resolves environment keys through `access`.
    pub fn with_access(mut self, access: &'a Access<'a>) -> Self {
        self.access = Some(access);
        self
    }

    /// Whether objects with unregistered headers decode as
    /// [`UnknownObject`](crate::UnknownObject)s (the default) or fail.
    pub fn with_default_object(mut self, enabled: bool) -> Self {
        self.default_object = enabled;
        self
    }

    /// Number of slots taken so far.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Checks that the whole input was consumed.
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.input.remaining() {
            0 => Ok(()),
            remaining => Err(DecodeError::TrailingBytes { remaining }),
        }
    }

    /// Reads the next value.
    ///
    /// Fails with [`DecodeError::TooDeep`] rather than recursing past
    /// [`MAX_DEPTH`] levels.
    pub fn read_value(&mut self) -> Result<Value, DecodeError> {
        if self.depth == MAX_DEPTH {
            return Err(DecodeError::TooDeep {
                offset: self.input.offset(),
            });
        }
        self.depth += 1;
        let value = self.read_tagged();
        self.depth -= 1;
        value
    }

    fn read_tagged(&mut self) -> Result<Value, DecodeError> {
        match self.input.read_tag()? {
            Tag::Int32 => Ok(Value::Int(self.input.read_int32()?)),
            Tag::String => Ok(Value::Str(self.input.read_string()?)),
            Tag::Array => {
                let length = self.input.read_uint32()? as usize;
                // Cap the preallocation; the count is untrusted.
                let mut elements = Vec::with_capacity(length.min(self.input.remaining()));
                for _ in 0..length {
                    elements.push(self.read_value()?);
                }
                Ok(Value::Array(elements))
            }
            Tag::Map => {
                let length = self.input.read_uint32()? as usize;
                let mut map = Map::with_capacity(length.min(self.input.remaining() / 2));
                for _ in 0..length {
                    let key = self.read_value()?;
                    let value = self.read_value()?;
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }
            Tag::Null => Ok(Value::Null),
            Tag::True => Ok(Value::Bool(true)),
            Tag::False => Ok(Value::Bool(false)),
            Tag::Object => self.read_object(),
            Tag::Reference => self.read_reference(),
            Tag::Environment => self.read_environment(),
        }
    }

    fn read_object(&mut self) -> Result<Value, DecodeError> {
        let index = self.grab_slot();
        let header = self.read_value()?;

        let record = match Header::from_value(&header)
            .and_then(|key| self.registry.lookup_by_header(&key))
        {
            Some(record) => record,
            None if self.default_object => self.registry.unknown_record().clone(),
            None => {
                return Err(DecodeError::UnknownHeader {
                    header: crate::stringify::stringify(&header),
                });
            }
        };

        let object = ObjectRef::from_boxed(record.instantiate(&header));
        self.slots[index] = Some(Value::Object(object.clone()));
        log::trace!("object {} @{index}", record.type_name());

        let payload = self.read_value()?;
        record.apply(&mut *object.borrow_mut(), payload)?;
        Ok(Value::Object(object))
    }

    fn read_environment(&mut self) -> Result<Value, DecodeError> {
        let index = self.grab_slot();
        let key = self.read_value()?;
        let value = self.access_environment(&key)?;
        self.slots[index] = Some(value.clone());
        log::trace!("environment @{index}");
        Ok(value)
    }

    fn access_environment(&self, key: &Value) -> Result<Value, DecodeError> {
        if let Some(marker) = EnvironmentKey::from_array(key) {
            if self.registry.is_deferred(&marker) {
                return Ok(Value::Environment(marker));
            }
        }
        self.access
            .and_then(|access| access(key))
            .ok_or_else(|| DecodeError::ResolverMismatch {
                key: crate::stringify::stringify(key),
            })
    }

    fn read_reference(&mut self) -> Result<Value, DecodeError> {
        let offset = self.input.read_uint32()?;
        let slot = self.slots.len() as i64 - offset as i64 - 1;
        usize::try_from(slot)
            .ok()
            .and_then(|index| self.slots.get(index))
            .and_then(|value| value.clone())
            .ok_or(DecodeError::DanglingReference { offset, slot })
    }

    fn grab_slot(&mut self) -> usize {
        self.slots.push(None);
        self.slots.len() - 1
    }
}
