//! Plankton encoding and decoding
//!
//! Plankton is a compact, self-describing binary format for graphs of values.
//! Scalars, arrays and maps are written structurally; registered native
//! objects are written as a header (which identifies their type) and a
//! payload (their data). Shared and cyclic object graphs survive a round
//! trip because every object is written in full only once.
//!
//! # Wire Format
//!
//! Every value starts with a one-byte tag:
//!
//! ```text
//! ┌──────────────┬─────┬──────────────────────────────────────────┐
//! │ Tag          │ Hex │ Followed by                              │
//! ├──────────────┼─────┼──────────────────────────────────────────┤
//! │ INT32        │ 00  │ zigzag varint                            │
//! │ STRING       │ 01  │ varint byte length, UTF-8 bytes          │
//! │ ARRAY        │ 02  │ varint count, count values               │
//! │ MAP          │ 03  │ varint count, count × (key, value)       │
//! │ NULL         │ 04  │                                          │
//! │ TRUE         │ 05  │                                          │
//! │ FALSE        │ 06  │                                          │
//! │ OBJECT       │ 07  │ header value, payload value              │
//! │ REFERENCE    │ 08  │ varint backward slot offset              │
//! │ ENVIRONMENT  │ 09  │ key value                                │
//! └──────────────┴─────┴──────────────────────────────────────────┘
//! ```
//!
//! Varints are base-128, least significant group first, with the high bit of
//! each byte set when more bytes follow. Signed integers are zigzag mapped
//! first: `(v << 1) ^ (v >> 31)`.
//!
//! # Slots
//!
//! Each `OBJECT` and `ENVIRONMENT` takes the next slot number, in the order
//! they are met. A `REFERENCE` with offset `d` written when `n` slots have
//! been taken points at slot `n - d - 1`. No slot numbers are written; reader
//! and writer count them the same way.
//!
//! # Module Structure
//!
//! - [`wire`] - tags, varints, strings
//! - [`writer`] - graph writer
//! - [`reader`] - graph reader
//! - [`disassemble`] - textual trace of a stream

pub mod disassemble;
pub mod reader;
pub mod wire;
pub mod writer;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::error::{DecodeError, EncodeError};
use crate::registry::Registry;
use crate::value::{ObjectRef, Value};

pub use reader::GraphReader;
pub use writer::GraphWriter;

/// Prefix marking a base64 plankton string on a command line or in a log.
pub const P64_PREFIX: &str = "p64/";

/// Deepest nesting of values the writer, reader and disassembler accept.
/// Every array, map, object header or payload and environment key is one
/// level.
pub const MAX_DEPTH: usize = 512;

/// Encodes values against a registry.
pub struct Encoder<'r> {
    registry: &'r Registry,
    resolver: Option<Box<dyn Fn(&ObjectRef) -> Option<Value> + 'r>>,
}

impl<'r> Encoder<'r> {
    /// An encoder that writes every object in full.
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            resolver: None,
        }
    }

    /// Before writing an object, asks `resolver` for an environment key to
    /// write instead.
    pub fn with_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&ObjectRef) -> Option<Value> + 'r,
    {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Encodes `value` to bytes.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let mut writer = GraphWriter::new(self.registry);
        if let Some(resolver) = &self.resolver {
            writer = writer.with_resolver(resolver.as_ref());
        }
        writer.write_value(value)?;
        log::debug!(
            "plankton encode: {} bytes, {} slots",
            writer.payload().len(),
            writer.obj_counter()
        );
        Ok(writer.finish())
    }

    /// Encodes `value` to standard base64.
    pub fn base64encode(&self, value: &Value) -> Result<String, EncodeError> {
        Ok(BASE64.encode(self.encode(value)?))
    }

    /// Encodes `value` to a `p64/` prefixed base64 string.
    pub fn p64encode(&self, value: &Value) -> Result<String, EncodeError> {
        Ok(format!("{P64_PREFIX}{}", self.base64encode(value)?))
    }
}

/// Decodes values against a registry.
pub struct Decoder<'r> {
    registry: &'r Registry,
    access: Option<Box<dyn Fn(&Value) -> Option<Value> + 'r>>,
    default_object: bool,
}

impl<'r> Decoder<'r> {
    /// A decoder that reads unregistered objects as
    /// [`UnknownObject`](crate::UnknownObject)s and has no environment.
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            access: None,
            default_object: true,
        }
    }

    /// Resolves environment keys through `access`. Returning `None` fails
    /// the decode with [`DecodeError::ResolverMismatch`].
    pub fn with_access<F>(mut self, access: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + 'r,
    {
        self.access = Some(Box::new(access));
        self
    }

    /// Fails with [`DecodeError::UnknownHeader`] on unregistered headers
    /// instead of producing unknown objects.
    pub fn without_default_object(mut self) -> Self {
        self.default_object = false;
        self
    }

    /// Decodes one value; the whole buffer must be consumed.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, DecodeError> {
        let mut reader =
            GraphReader::new(bytes, self.registry).with_default_object(self.default_object);
        if let Some(access) = &self.access {
            reader = reader.with_access(access.as_ref());
        }
        let value = reader.read_value()?;
        log::debug!(
            "plankton decode: {} bytes, {} slots",
            bytes.len(),
            reader.slot_count()
        );
        reader.finish()?;
        Ok(value)
    }

    /// Decodes standard base64.
    pub fn base64decode(&self, data: &str) -> Result<Value, DecodeError> {
        self.decode(&base64_bytes(data)?)
    }

    /// Decodes a `p64/` prefixed base64 string.
    pub fn p64decode(&self, data: &str) -> Result<Value, DecodeError> {
        let data = data
            .strip_prefix(P64_PREFIX)
            .ok_or(DecodeError::MissingPrefix)?;
        self.base64decode(data)
    }

    /// Renders the stream as an indented trace instead of decoding it.
    pub fn disassemble(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        disassemble::disassemble(bytes)
    }

    /// [`disassemble`](Self::disassemble) for standard base64 input.
    pub fn base64disassemble(&self, data: &str) -> Result<String, DecodeError> {
        self.disassemble(&base64_bytes(data)?)
    }
}

fn base64_bytes(data: &str) -> Result<Vec<u8>, DecodeError> {
    BASE64
        .decode(data.trim())
        .map_err(|e| DecodeError::Base64(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::UnknownObject;
    use crate::registry::{Header, TypeRecord};
    use crate::value::{EnvironmentKey, Map};
    use crate::wire_record;
    use proptest::prelude::*;
    use std::cell::Cell;

    #[derive(Debug, Default)]
    struct Pair {
        first: Value,
        second: Value,
    }

    wire_record!(Pair { first, second });

    #[derive(Debug, Default)]
    struct Literal {
        value: Value,
    }

    wire_record!(Literal { value });

    #[derive(Debug, Default)]
    struct Quote {
        value: Value,
    }

    wire_record!(Quote { value });

    #[derive(Debug, Default)]
    struct Shape {
        sides: i32,
    }

    wire_record!(Shape { sides });

    #[derive(Debug, Default)]
    struct Square {
        sides: i32,
    }

    wire_record!(Square { sides });

    #[derive(Debug, Default)]
    struct Module;

    impl crate::record::WireRecord for Module {}

    fn registry() -> Registry {
        let mut builder = Registry::builder();
        builder
            .register(TypeRecord::builder::<Pair>().fields(Pair::FIELDS).build())
            .register(
                TypeRecord::builder::<Literal>()
                    .fields(Literal::FIELDS)
                    .build(),
            )
            .register(
                TypeRecord::builder::<Quote>()
                    .fields(Quote::FIELDS)
                    .replacement(|quote: &Quote| {
                        Some(ObjectRef::new(Literal {
                            value: quote.value.clone(),
                        }))
                    })
                    .build(),
            )
            .register(
                TypeRecord::builder::<Shape>()
                    .header(Header::environment(["geo", "Shape"]))
                    .fields(Shape::FIELDS)
                    .build(),
            )
            .fallback::<Square, Shape>();
        builder.build().unwrap()
    }

    fn encode(value: impl Into<Value>) -> Vec<u8> {
        Encoder::new(&registry()).encode(&value.into()).unwrap()
    }

    fn pair(first: Value, second: Value) -> ObjectRef {
        ObjectRef::new(Pair { first, second })
    }

    #[test]
    fn test_encode_int() {
        assert_eq!(encode(1027), vec![0x00, 0x86, 0x10]);
    }

    #[test]
    fn test_encode_string() {
        assert_eq!(encode("foo!"), vec![0x01, 0x04, b'f', b'o', b'o', b'!']);
    }

    #[test]
    fn test_encode_array() {
        assert_eq!(
            encode(vec![1, 2, 3]),
            vec![0x02, 0x03, 0x00, 0x02, 0x00, 0x04, 0x00, 0x06]
        );
    }

    #[test]
    fn test_encode_map_in_key_order() {
        let map: Map = [("b", 2), ("a", 1)].into_iter().collect();
        assert_eq!(
            encode(map),
            vec![0x03, 0x02, 0x01, 0x01, b'a', 0x00, 0x02, 0x01, 0x01, b'b', 0x00, 0x04]
        );
    }

    #[test]
    fn test_primitive_boundaries_round_trip() {
        let registry = registry();
        let decoder = Decoder::new(&registry);
        let long = "x".repeat(300);
        for value in [
            Value::Int(0),
            Value::Int(-1),
            Value::Int(i32::MIN),
            Value::Int(i32::MAX),
            Value::str(""),
            Value::str("ünïcødé"),
            Value::str(long),
            Value::Null,
            Value::Bool(true),
            Value::Bool(false),
        ] {
            let bytes = Encoder::new(&registry).encode(&value).unwrap();
            assert_eq!(decoder.decode(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn test_deeply_nested_round_trip() {
        let registry = registry();
        let mut value = Value::str("leaf");
        for level in 0..400 {
            value = if level % 2 == 0 {
                Value::from(vec![value, Value::Int(level)])
            } else {
                Value::Map([("k", value)].into_iter().collect())
            };
        }
        let bytes = Encoder::new(&registry).encode(&value).unwrap();
        assert_eq!(Decoder::new(&registry).decode(&bytes).unwrap(), value);
        assert!(Decoder::new(&registry).disassemble(&bytes).is_ok());
    }

    #[test]
    fn test_nesting_limit_applies_to_both_sides() {
        let registry = registry();
        let mut value = Value::Null;
        for _ in 0..MAX_DEPTH - 1 {
            value = Value::Array(vec![value]);
        }
        let bytes = Encoder::new(&registry).encode(&value).unwrap();
        assert_eq!(Decoder::new(&registry).decode(&bytes).unwrap(), value);

        let value = Value::Array(vec![value]);
        assert_eq!(
            Encoder::new(&registry).encode(&value),
            Err(EncodeError::TooDeep { limit: MAX_DEPTH })
        );
    }

    #[test]
    fn test_large_map_round_trip() {
        let registry = registry();
        let map: Map = (0..50_000i32).map(|i| (i, i * 2)).collect();
        let bytes = Encoder::new(&registry).encode(&Value::Map(map.clone())).unwrap();
        let decoded = Decoder::new(&registry).decode(&bytes).unwrap();
        let decoded = decoded.as_map().unwrap();
        assert_eq!(decoded.len(), 50_000);
        assert_eq!(decoded.get(&Value::Int(49_999)), Some(&Value::Int(99_998)));
        assert_eq!(decoded, &map);
    }

    #[test]
    fn test_identity_preserved() {
        let registry = registry();
        let object = pair(Value::Int(1), Value::Null);
        let value = Value::from(vec![object.clone(), object.clone(), object]);
        let bytes = Encoder::new(&registry).encode(&value).unwrap();

        let decoded = Decoder::new(&registry).decode(&bytes).unwrap();
        let elements = decoded.as_array().unwrap();
        let first = elements[0].as_object().unwrap();
        assert!(first.ptr_eq(elements[1].as_object().unwrap()));
        assert!(first.ptr_eq(elements[2].as_object().unwrap()));
        assert_eq!(first.downcast_ref::<Pair>().unwrap().first, Value::Int(1));
    }

    #[test]
    fn test_self_cycle_bytes() {
        let object = ObjectRef::new(UnknownObject::default());
        object.downcast_mut::<UnknownObject>().unwrap().payload = Value::Object(object.clone());
        assert_eq!(encode(object.clone()), vec![7, 4, 8, 0]);
        object.downcast_mut::<UnknownObject>().unwrap().payload = Value::Null;
    }

    #[test]
    fn test_two_field_cycle() {
        let registry = registry();
        let p = pair(Value::Null, Value::Null);
        p.downcast_mut::<Pair>().unwrap().second = Value::Object(p.clone());

        let bytes = Encoder::new(&registry).encode(&Value::Object(p.clone())).unwrap();
        assert_eq!(
            bytes,
            [
                &[7u8, 1, 4][..],
                b"Pair",
                &[3, 2, 1, 5],
                b"first",
                &[4, 1, 6],
                b"second",
                &[8, 0],
            ]
            .concat()
        );

        let decoded = Decoder::new(&registry).decode(&bytes).unwrap();
        let object = decoded.as_object().unwrap();
        let second = object.downcast_ref::<Pair>().unwrap().second.clone();
        assert!(second.as_object().unwrap().ptr_eq(object));

        object.downcast_mut::<Pair>().unwrap().second = Value::Null;
        p.downcast_mut::<Pair>().unwrap().second = Value::Null;
    }

    #[test]
    fn test_environment_substitution() {
        let registry = registry();
        let module = ObjectRef::new(Module);
        let value = Value::from(vec![module.clone(), module]);

        let encoder = Encoder::new(&registry).with_resolver(|object: &ObjectRef| {
            object
                .is::<Module>()
                .then(|| EnvironmentKey::new(["core", "Module"]).to_value())
        });
        let bytes = encoder.encode(&value).unwrap();
        assert_eq!(
            bytes,
            [
                &[2u8, 2, 9, 2, 2, 1, 4][..],
                b"core",
                &[1, 6],
                b"Module",
                &[8, 0],
            ]
            .concat()
        );

        let calls = Cell::new(0);
        let decoder = Decoder::new(&registry).with_access(|key: &Value| {
            calls.set(calls.get() + 1);
            assert_eq!(key, &EnvironmentKey::new(["core", "Module"]).to_value());
            Some(Value::str("the core module"))
        });
        let decoded = decoder.decode(&bytes).unwrap();
        assert_eq!(
            decoded,
            Value::from(vec!["the core module", "the core module"])
        );
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_unresolvable_environment_key() {
        let registry = registry();
        let decoder = Decoder::new(&registry).with_access(|_: &Value| None);
        let err = decoder.decode(&[9, 1, 1, b'k']).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ResolverMismatch {
                key: "\"k\"".to_string()
            }
        );
    }

    #[test]
    fn test_deferred_environment_header() {
        let registry = registry();
        let value = Value::from(vec![
            ObjectRef::new(Shape { sides: 3 }),
            ObjectRef::new(Shape { sides: 4 }),
        ]);
        let bytes = Encoder::new(&registry).encode(&value).unwrap();
        // The second header is a reference to the first one's environment slot.
        let text = Decoder::new(&registry).disassemble(&bytes).unwrap();
        assert!(text.contains("^ reference 1 (=@1)"), "{text}");

        // No access function is needed: the key is a registered header.
        let decoded = Decoder::new(&registry).decode(&bytes).unwrap();
        let sides: Vec<i32> = decoded
            .as_array()
            .unwrap()
            .iter()
            .map(|shape| shape.as_object().unwrap().downcast_ref::<Shape>().unwrap().sides)
            .collect();
        assert_eq!(sides, vec![3, 4]);
    }

    #[test]
    fn test_fallback_writes_parent_record() {
        let registry = registry();
        let bytes = Encoder::new(&registry)
            .encode(&Value::Object(ObjectRef::new(Square { sides: 4 })))
            .unwrap();
        let decoded = Decoder::new(&registry).decode(&bytes).unwrap();
        let object = decoded.as_object().unwrap();
        assert!(object.is::<Shape>());
        assert_eq!(object.downcast_ref::<Shape>().unwrap().sides, 4);
    }

    #[test]
    fn test_replacement() {
        let registry = registry();
        let quote = ObjectRef::new(Quote {
            value: Value::Int(9),
        });
        let value = Value::from(vec![quote.clone(), quote]);
        let bytes = Encoder::new(&registry).encode(&value).unwrap();

        let decoded = Decoder::new(&registry).decode(&bytes).unwrap();
        let elements = decoded.as_array().unwrap();
        let literal = elements[0].as_object().unwrap();
        assert!(literal.is::<Literal>());
        assert_eq!(literal.downcast_ref::<Literal>().unwrap().value, Value::Int(9));
        assert!(literal.ptr_eq(elements[1].as_object().unwrap()));
    }

    #[test]
    fn test_unregistered_type() {
        let registry = registry();
        let err = Encoder::new(&registry)
            .encode(&Value::Object(ObjectRef::new(Module)))
            .unwrap_err();
        assert!(matches!(err, EncodeError::UnregisteredType { .. }));
    }

    #[test]
    fn test_unknown_object_reencodes_unchanged() {
        let registry = registry();
        let bytes = [7, 1, 1, b'X', 3, 1, 1, 1, b'a', 0, 2];
        let decoded = Decoder::new(&registry).decode(&bytes).unwrap();
        let object = decoded.as_object().unwrap();
        assert_eq!(
            object.downcast_ref::<UnknownObject>().unwrap().header,
            Value::str("X")
        );
        assert_eq!(Encoder::new(&registry).encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_strict_decoder_rejects_unknown_header() {
        let registry = registry();
        let err = Decoder::new(&registry)
            .without_default_object()
            .decode(&[7, 1, 1, b'X', 4])
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownHeader {
                header: "\"X\"".to_string()
            }
        );
    }

    #[test]
    fn test_header_self_reference_does_not_decode() {
        let registry = registry();
        let object = ObjectRef::new(UnknownObject::default());
        object.downcast_mut::<UnknownObject>().unwrap().header = Value::Object(object.clone());

        let bytes = Encoder::new(&registry).encode(&Value::Object(object.clone())).unwrap();
        assert_eq!(bytes, vec![7, 8, 1, 4]);
        assert_eq!(
            Decoder::new(&registry).decode(&bytes),
            Err(DecodeError::DanglingReference { offset: 1, slot: -1 })
        );

        object.downcast_mut::<UnknownObject>().unwrap().header = Value::Null;
    }

    #[test]
    fn test_malformed_input() {
        let registry = registry();
        let decoder = Decoder::new(&registry);
        assert_eq!(decoder.decode(&[]), Err(DecodeError::Truncated { offset: 0 }));
        assert_eq!(
            decoder.decode(&[1, 5, b'a']),
            Err(DecodeError::Truncated { offset: 3 })
        );
        assert_eq!(
            decoder.decode(&[0x0B]),
            Err(DecodeError::UnknownTag { tag: 0x0B, offset: 0 })
        );
        assert_eq!(
            decoder.decode(&[4, 0]),
            Err(DecodeError::TrailingBytes { remaining: 1 })
        );
    }

    #[test]
    fn test_base64_and_p64() {
        let registry = registry();
        let encoder = Encoder::new(&registry);
        let decoder = Decoder::new(&registry);
        let value = Value::from(vec![1, 2, 3]);

        assert_eq!(encoder.base64encode(&value).unwrap(), "AgMAAgAEAAY=");
        assert_eq!(encoder.p64encode(&value).unwrap(), "p64/AgMAAgAEAAY=");
        assert_eq!(decoder.p64decode("p64/AgMAAgAEAAY=").unwrap(), value);
        assert_eq!(
            decoder.p64decode("AgMAAgAEAAY="),
            Err(DecodeError::MissingPrefix)
        );
        assert!(matches!(
            decoder.base64decode("not base64!"),
            Err(DecodeError::Base64(_))
        ));
        assert_eq!(
            decoder.base64disassemble("AgMAAgAEAAY=").unwrap(),
            "array 3\n0 int32 1\n1 int32 2\n2 int32 3"
        );
    }

    #[test]
    fn test_registry_shared_between_threads() {
        let registry = registry();
        std::thread::scope(|scope| {
            for sides in 0..4 {
                let registry = &registry;
                scope.spawn(move || {
                    let value = Value::Object(ObjectRef::new(Square { sides }));
                    let bytes = Encoder::new(registry).encode(&value).unwrap();
                    let decoded = Decoder::new(registry).decode(&bytes).unwrap();
                    let object = decoded.as_object().unwrap();
                    assert_eq!(object.downcast_ref::<Shape>().unwrap().sides, sides);
                });
            }
        });
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<i32>().prop_map(Value::Int),
            ".{0,12}".prop_map(Value::Str),
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                prop::collection::vec((inner.clone(), inner), 0..8)
                    .prop_map(|entries| Value::Map(entries.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_composite_round_trip(value in arb_value()) {
            let registry = Registry::default();
            let bytes = Encoder::new(&registry).encode(&value).unwrap();
            prop_assert_eq!(Decoder::new(&registry).decode(&bytes).unwrap(), value);
        }

        #[test]
        fn prop_encoding_is_deterministic(value in arb_value()) {
            let registry = Registry::default();
            let encoder = Encoder::new(&registry);
            prop_assert_eq!(encoder.encode(&value).unwrap(), encoder.encode(&value).unwrap());
        }
    }
}
