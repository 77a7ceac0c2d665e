//! Human-readable rendering of decoded values for logs and diagnostics.
//!
//! The output is lossy and not meant to be parsed back.

use std::fmt::Write as _;

use crate::codec::MAX_DEPTH;
use crate::record::UnknownObject;
use crate::registry::{Registry, short_name};
use crate::value::{ObjectRef, Value};

/// Renders `value` without a registry.
///
/// Registered objects show only their type name: `#<Point>`.
pub fn stringify(value: &Value) -> String {
    Stringifier::new(None).render(value)
}

/// Renders `value`, showing registered objects with the payload their
/// record would write: `#<Point: {"x": 1, "y": 2}>`.
pub fn stringify_with(registry: &Registry, value: &Value) -> String {
    Stringifier::new(Some(registry)).render(value)
}

struct Stringifier<'a> {
    registry: Option<&'a Registry>,
    out: String,
    /// Objects currently being rendered.
    active: Vec<usize>,
    depth: usize,
}

impl<'a> Stringifier<'a> {
    fn new(registry: Option<&'a Registry>) -> Self {
        Self {
            registry,
            out: String::new(),
            active: Vec::new(),
            depth: 0,
        }
    }

    fn render(mut self, value: &Value) -> String {
        self.value(value);
        self.out
    }

    /// Renders `value`, eliding anything nested past [`MAX_DEPTH`] as `...`.
    fn value(&mut self, value: &Value) {
        if self.depth == MAX_DEPTH {
            self.out.push_str("...");
            return;
        }
        self.depth += 1;
        self.nested(value);
        self.depth -= 1;
    }

    fn nested(&mut self, value: &Value) {
        match value {
            Value::Int(n) => {
                let _ = write!(self.out, "{n}");
            }
            Value::Str(s) => {
                let _ = write!(self.out, "\"{s}\"");
            }
            Value::Array(elements) => {
                self.out.push('[');
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.value(element);
                }
                self.out.push(']');
            }
            Value::Map(map) => {
                self.out.push('{');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.value(key);
                    self.out.push_str(": ");
                    self.value(value);
                }
                self.out.push('}');
            }
            Value::Null => self.out.push_str("null"),
            Value::Bool(b) => {
                let _ = write!(self.out, "{b}");
            }
            Value::Object(object) => self.object(object),
            Value::Environment(key) => {
                let _ = write!(self.out, "<env {key}>");
            }
        }
    }

    fn object(&mut self, object: &ObjectRef) {
        let id = object.id();
        if self.active.contains(&id) {
            self.out.push_str("#<...>");
            return;
        }

        // Take what is needed out of the object before recursing, so no
        // borrow is held while its children are rendered.
        let parts = match object.downcast_ref::<UnknownObject>() {
            Some(unknown) => Some((None, unknown.header.clone(), unknown.payload.clone())),
            None => self.registered_parts(object),
        };

        match parts {
            Some((name, header, payload)) => {
                self.active.push(id);
                self.out.push_str("#<");
                match name {
                    Some(name) => self.out.push_str(name),
                    None => self.value(&header),
                }
                self.out.push_str(": ");
                self.value(&payload);
                self.out.push('>');
                self.active.pop();
            }
            None => {
                let name = object
                    .try_borrow()
                    .map(|record| short_name(record.type_name()))
                    .unwrap_or("?");
                let _ = write!(self.out, "#<{name}>");
            }
        }
    }

    /// Type name and payload of a registered object, if a registry is at
    /// hand and can produce the payload.
    fn registered_parts(&self, object: &ObjectRef) -> Option<(Option<&'static str>, Value, Value)> {
        let registry = self.registry?;
        let record = object.try_borrow()?;
        let type_record = registry.lookup_by_type((*record).as_any().type_id())?;
        let payload = type_record.payload_for(&*record).ok()?;
        Some((Some(short_name(record.type_name())), Value::Null, payload))
    }
}
