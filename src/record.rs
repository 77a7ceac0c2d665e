//! Native records that can travel as plankton objects.
//!
//! A type becomes serializable by implementing [`WireRecord`], usually through
//! [`wire_record!`](crate::wire_record), and by registering a
//! [`TypeRecord`](crate::TypeRecord) for it. The trait only gives generic
//! field access; everything else (header, payload shape, construction) is
//! declared in the registry.

use std::any::Any;
use std::fmt;

use crate::error::DecodeError;
use crate::value::Value;

/// Upcast to [`Any`] for downcasting trait objects.
pub trait AsAny: Any {
    /// `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// `self` as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A native type whose instances can be stored in an [`ObjectRef`](crate::ObjectRef).
pub trait WireRecord: AsAny + fmt::Debug {
    /// The Rust type name, used in diagnostics.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Reads the named field, or `None` if there is no such field.
    fn field(&self, name: &str) -> Option<Value> {
        let _ = name;
        None
    }

    /// Writes the named field from a decoded value.
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), DecodeError> {
        let _ = value;
        Err(DecodeError::invalid_payload(
            self.type_name(),
            format!("no field `{name}`"),
        ))
    }
}

/// Implements [`WireRecord`] for a struct by listing its serialized fields.
///
/// Every listed field must be `Clone`, convertible into [`Value`] and
/// implement [`FromValue`](crate::FromValue). The macro also defines
/// `Type::FIELDS`, the field names in the order given, for use with
/// [`TypeRecordBuilder::fields`](crate::registry::TypeRecordBuilder::fields).
///
/// ```
/// use plankton::{wire_record, Value};
///
/// #[derive(Debug, Default)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// wire_record!(Point { x, y });
///
/// assert_eq!(Point::FIELDS, &["x", "y"]);
/// ```
#[macro_export]
macro_rules! wire_record {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $ty {
            /// Serialized field names, in declaration order.
            pub const FIELDS: &'static [&'static str] = &[$(stringify!($field)),*];
        }

        impl $crate::WireRecord for $ty {
            fn field(&self, name: &str) -> Option<$crate::Value> {
                match name {
                    $(stringify!($field) => Some($crate::Value::from(self.$field.clone())),)*
                    _ => None,
                }
            }

            fn set_field(
                &mut self,
                name: &str,
                value: $crate::Value,
            ) -> Result<(), $crate::DecodeError> {
                match name {
                    $(stringify!($field) => {
                        self.$field = $crate::FromValue::from_value(value).map_err(|reason| {
                            $crate::DecodeError::InvalidPayload {
                                type_name: std::any::type_name::<$ty>(),
                                reason: format!("field `{}`: {}", name, reason),
                            }
                        })?;
                        Ok(())
                    })*
                    _ => Err($crate::DecodeError::InvalidPayload {
                        type_name: std::any::type_name::<$ty>(),
                        reason: format!("no field `{}`", name),
                    }),
                }
            }
        }
    };
}

/// An object whose header matched no registered type.
///
/// Decoding keeps the header and payload verbatim so the object can be
/// inspected or written back out unchanged.
#[derive(Debug, Clone, Default)]
pub struct UnknownObject {
    /// The header as it was read.
    pub header: Value,
    /// The payload as it was read.
    pub payload: Value,
}

impl UnknownObject {
    /// Creates an unknown object with the given header and payload.
    pub fn new(header: impl Into<Value>, payload: impl Into<Value>) -> Self {
        Self {
            header: header.into(),
            payload: payload.into(),
        }
    }
}

wire_record!(UnknownObject { header, payload });

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectRef;

    #[derive(Debug, Default)]
    struct Pair {
        first: Value,
        second: Option<i32>,
    }

    wire_record!(Pair { first, second });

    #[test]
    fn test_fields_in_declaration_order() {
        assert_eq!(Pair::FIELDS, &["first", "second"]);
    }

    #[test]
    fn test_field_access() {
        let mut pair = Pair::default();
        pair.set_field("first", Value::str("a")).unwrap();
        pair.set_field("second", Value::Int(4)).unwrap();
        assert_eq!(pair.field("first"), Some(Value::str("a")));
        assert_eq!(pair.field("second"), Some(Value::Int(4)));
        assert_eq!(pair.field("third"), None);
    }

    #[test]
    fn test_set_field_type_mismatch() {
        let mut pair = Pair::default();
        let err = pair.set_field("second", Value::str("x")).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidPayload { .. }));
        let err = pair.set_field("third", Value::Null).unwrap_err();
        assert!(err.to_string().contains("no field `third`"));
    }

    #[test]
    fn test_type_name_through_trait_object() {
        let object = ObjectRef::new(Pair::default());
        assert!(object.type_name().ends_with("Pair"));
    }
}
