//! Writer for the plankton object-graph format.
//!
//! Values are written depth first in a single pass. Every object or
//! environment value written in full takes the next slot; a later occurrence
//! of the same object is written as a backward reference to its slot.

use ahash::AHashMap;

use super::MAX_DEPTH;
use super::wire::{self, Tag};
use crate::error::EncodeError;
use crate::registry::Registry;
use crate::value::{EnvironmentKey, ObjectRef, Value};

/// Substitutes an environment key for an object, or `None` to write it.
pub type Resolver<'r> = dyn Fn(&ObjectRef) -> Option<Value> + 'r;

/// Replacements are followed at most this many times per object.
const MAX_REPLACEMENTS: usize = 64;

/// State of a slot table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Slot taken, header still being written.
    Pending,
    /// Slot resolvable by references.
    Committed(u32),
}

/// Per-call writer state.
pub struct GraphWriter<'a> {
    /// The output buffer containing encoded data
    buffer: Vec<u8>,

    /// Maps object identity to its slot
    obj_table: AHashMap<usize, Slot>,

    /// Maps environment keys to their slot (content-based sharing)
    env_table: AHashMap<EnvironmentKey, Slot>,

    /// Slots taken so far
    obj_counter: u32,

    /// Values currently being written, outermost included
    depth: usize,

    registry: &'a Registry,
    resolver: Option<&'a Resolver<'a>>,

    /// Keeps every tabled object alive so its address is not reused while
    /// the table refers to it.
    pinned: Vec<ObjectRef>,
}

impl<'a> GraphWriter<'a> {
    /// Creates a writer that resolves types through `registry`.
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            obj_table: AHashMap::new(),
            env_table: AHashMap::new(),
            obj_counter: 0,
            depth: 0,
            registry,
            resolver: None,
            pinned: Vec::new(),
        }
    }

    /// Consults `resolver` before writing any object in full.
    pub fn with_resolver(mut self, resolver: &'a Resolver<'a>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Number of slots taken so far.
    pub fn obj_counter(&self) -> u32 {
        self.obj_counter
    }

    /// Bytes written so far.
    pub fn payload(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }

    #[inline]
    fn write_tag(&mut self, tag: Tag) {
        self.buffer.push(tag as u8);
    }

    /// Writes any value.
    ///
    /// Values nested deeper than [`MAX_DEPTH`] are rejected, since no reader
    /// would accept them.
    pub fn write_value(&mut self, value: &Value) -> Result<(), EncodeError> {
        if self.depth == MAX_DEPTH {
            return Err(EncodeError::TooDeep { limit: MAX_DEPTH });
        }
        self.depth += 1;
        let result = self.write_tagged(value);
        self.depth -= 1;
        result
    }

    fn write_tagged(&mut self, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Int(n) => {
                self.write_tag(Tag::Int32);
                wire::write_int32(&mut self.buffer, *n);
            }
            Value::Str(s) => {
                self.write_tag(Tag::String);
                wire::write_string(&mut self.buffer, s);
            }
            Value::Array(elements) => {
                self.write_tag(Tag::Array);
                wire::write_uint32(&mut self.buffer, elements.len() as u32);
                for element in elements {
                    self.write_value(element)?;
                }
            }
            Value::Map(map) => {
                self.write_tag(Tag::Map);
                wire::write_uint32(&mut self.buffer, map.len() as u32);
                for (key, value) in map.canonical_entries() {
                    self.write_value(key)?;
                    self.write_value(value)?;
                }
            }
            Value::Null => self.write_tag(Tag::Null),
            Value::Bool(true) => self.write_tag(Tag::True),
            Value::Bool(false) => self.write_tag(Tag::False),
            Value::Object(object) => self.write_object(object)?,
            Value::Environment(key) => self.write_environment(key)?,
        }
        Ok(())
    }

    /// Writes an environment marker, sharing slots between equal keys.
    pub fn write_environment(&mut self, key: &EnvironmentKey) -> Result<(), EncodeError> {
        if let Some(&slot) = self.env_table.get(key) {
            self.write_reference(slot);
            return Ok(());
        }
        let index = self.acquire_slot();
        self.write_tag(Tag::Environment);
        self.env_table.insert(key.clone(), Slot::Pending);
        self.write_value(&key.to_value())?;
        self.env_table.insert(key.clone(), Slot::Committed(index));
        log::trace!("environment <{key}> @{index}");
        Ok(())
    }

    /// Writes an object in full, as an environment value, or as a reference
    /// to an earlier occurrence.
    pub fn write_object(&mut self, object: &ObjectRef) -> Result<(), EncodeError> {
        if self.check_shared(object) {
            return Ok(());
        }

        if let Some(key) = self.resolver.and_then(|resolve| resolve(object)) {
            let index = self.acquire_slot();
            self.write_tag(Tag::Environment);
            self.table(object, Slot::Pending);
            self.write_value(&key)?;
            self.table(object, Slot::Committed(index));
            log::trace!("{} resolved to environment @{index}", object.type_name());
            return Ok(());
        }

        let target = self.follow_replacements(object)?;
        if !target.ptr_eq(object) {
            match self.obj_table.get(&target.id()) {
                Some(&Slot::Committed(index)) => {
                    self.table(object, Slot::Committed(index));
                    self.write_reference(Slot::Committed(index));
                    return Ok(());
                }
                // The target's header is being written; `object` stays
                // untabled so a later occurrence can refer to the finished slot.
                Some(&Slot::Pending) => {
                    self.write_reference(Slot::Pending);
                    return Ok(());
                }
                None => {}
            }
        }

        let record = self
            .registry
            .lookup_by_type(target.record_type())
            .ok_or_else(|| EncodeError::UnregisteredType {
                type_name: target.type_name(),
            })?;

        let index = self.acquire_slot();
        self.write_tag(Tag::Object);
        self.table(object, Slot::Pending);
        if !target.ptr_eq(object) {
            self.table(&target, Slot::Pending);
        }

        let header = record.header_for(&*target.borrow())?;
        self.write_value(&header)?;

        self.table(object, Slot::Committed(index));
        if !target.ptr_eq(object) {
            self.table(&target, Slot::Committed(index));
        }
        log::trace!("object {} @{index}", record.type_name());

        let payload = record.payload_for(&*target.borrow())?;
        self.write_value(&payload)
    }

    /// Follows replacement functions from `object` to the object that is
    /// actually written.
    fn follow_replacements(&self, object: &ObjectRef) -> Result<ObjectRef, EncodeError> {
        let mut current = object.clone();
        for _ in 0..MAX_REPLACEMENTS {
            let Some(record) = self.registry.lookup_by_type(current.record_type()) else {
                return Ok(current);
            };
            let replacement = record.replacement(&*current.borrow());
            match replacement {
                Some(next) if !next.ptr_eq(&current) => current = next,
                _ => return Ok(current),
            }
        }
        Err(EncodeError::ReplacementLoop {
            type_name: object.type_name(),
        })
    }

    /// Checks if `object` has been seen before
    ///
    /// If found, writes a reference and returns true.
    /// If not found, returns false and the caller should write the object.
    pub fn check_shared(&mut self, object: &ObjectRef) -> bool {
        match self.obj_table.get(&object.id()) {
            Some(&slot) => {
                self.write_reference(slot);
                true
            }
            None => false,
        }
    }

    /// Writes a reference to `slot`.
    ///
    /// A pending slot has no index yet. It is written as if its index were
    /// -1, which no reader can resolve.
    fn write_reference(&mut self, slot: Slot) {
        let offset = match slot {
            Slot::Committed(index) => self.obj_counter - index - 1,
            Slot::Pending => self.obj_counter,
        };
        self.write_tag(Tag::Reference);
        wire::write_uint32(&mut self.buffer, offset);
    }

    fn table(&mut self, object: &ObjectRef, slot: Slot) {
        if self.obj_table.insert(object.id(), slot).is_none() {
            self.pinned.push(object.clone());
        }
    }

    fn acquire_slot(&mut self) -> u32 {
        let index = self.obj_counter;
        self.obj_counter += 1;
        index
    }
}
