//! Type registry: how native records map to wire headers and payloads.
//!
//! A [`Registry`] is built once with a [`RegistryBuilder`] and is read-only
//! afterwards. It is `Send + Sync`, so one registry can serve any number of
//! concurrent encode and decode calls.
//!
//! There is no inheritance to walk. A type that should be written with
//! another type's record declares that explicitly with
//! [`RegistryBuilder::fallback`]; lookups follow those links and memoize the
//! result, misses included.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{DecodeError, EncodeError, RegistryError};
use crate::record::{UnknownObject, WireRecord};
use crate::value::{EnvironmentKey, Map, ObjectRef, Value};

type HeaderFn = Arc<dyn Fn(&dyn WireRecord) -> Result<Value, EncodeError> + Send + Sync>;
type PayloadFn = Arc<dyn Fn(&dyn WireRecord) -> Result<Value, EncodeError> + Send + Sync>;
type ApplyFn = Arc<dyn Fn(&mut dyn WireRecord, Value) -> Result<(), DecodeError> + Send + Sync>;
type ReplaceFn = Arc<dyn Fn(&dyn WireRecord) -> Option<ObjectRef> + Send + Sync>;
type FactoryFn = Arc<dyn Fn(&Value) -> Box<dyn WireRecord> + Send + Sync>;

/// A header a registered type is written with and recognized by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Header {
    /// A plain string header, usually the type's name.
    Name(String),
    /// A header supplied by the environment. Written as an `ENVIRONMENT`
    /// value; the key is a deferred marker on decode.
    Environment(EnvironmentKey),
}

impl Header {
    /// A string header.
    pub fn name(name: impl Into<String>) -> Self {
        Header::Name(name.into())
    }

    /// An environment header with the given key path.
    pub fn environment<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Header::Environment(EnvironmentKey::new(parts))
    }

    /// The value written on the wire for this header.
    pub fn to_value(&self) -> Value {
        match self {
            Header::Name(name) => Value::Str(name.clone()),
            Header::Environment(key) => Value::Environment(key.clone()),
        }
    }

    /// The header a decoded header value stands for, if it can be one.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(name) => Some(Header::Name(name.clone())),
            Value::Environment(key) => Some(Header::Environment(key.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Header::Name(name) => write!(f, "\"{name}\""),
            Header::Environment(key) => write!(f, "<env {key}>"),
        }
    }
}

enum HeaderSource {
    Fixed(Header),
    Dynamic(HeaderFn),
}

enum PayloadSource {
    Fields(&'static [&'static str]),
    Custom { payload: PayloadFn, apply: ApplyFn },
}

/// How one native type is written and read.
pub struct TypeRecord {
    type_id: TypeId,
    type_name: &'static str,
    header: HeaderSource,
    payload: PayloadSource,
    replacement: Option<ReplaceFn>,
    factory: FactoryFn,
    decodes: Vec<Header>,
}

impl TypeRecord {
    /// Starts describing the record for `T`.
    ///
    /// Defaults: header is `T`'s unqualified name, payload is empty, new
    /// instances come from `T::default()`.
    pub fn builder<T: WireRecord + Default>() -> TypeRecordBuilder<T> {
        TypeRecordBuilder {
            header: HeaderSource::Fixed(Header::Name(short_type_name::<T>().to_string())),
            payload: PayloadSource::Fields(&[]),
            replacement: None,
            factory: Arc::new(|_: &Value| -> Box<dyn WireRecord> { Box::new(T::default()) }),
            decodes: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Rust type this record was registered for.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of that type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The fixed header, if the header does not depend on the instance.
    pub fn fixed_header(&self) -> Option<&Header> {
        match &self.header {
            HeaderSource::Fixed(header) => Some(header),
            HeaderSource::Dynamic(_) => None,
        }
    }

    /// Header value to write for `record`.
    pub fn header_for(&self, record: &dyn WireRecord) -> Result<Value, EncodeError> {
        match &self.header {
            HeaderSource::Fixed(header) => Ok(header.to_value()),
            HeaderSource::Dynamic(header) => header(record),
        }
    }

    /// Payload value to write for `record`.
    ///
    /// With a field list this is a map from field name to field value.
    pub fn payload_for(&self, record: &dyn WireRecord) -> Result<Value, EncodeError> {
        match &self.payload {
            PayloadSource::Fields(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for &field in fields.iter() {
                    let value = record.field(field).ok_or(EncodeError::MissingField {
                        type_name: record.type_name(),
                        field,
                    })?;
                    map.insert(field, value);
                }
                Ok(Value::Map(map))
            }
            PayloadSource::Custom { payload, .. } => payload(record),
        }
    }

    /// Fills a freshly constructed `record` from a decoded payload.
    pub fn apply(&self, record: &mut dyn WireRecord, payload: Value) -> Result<(), DecodeError> {
        match &self.payload {
            PayloadSource::Fields(_) => match payload {
                Value::Map(map) => {
                    for (name, value) in map {
                        let Value::Str(name) = name else {
                            return Err(DecodeError::invalid_payload(
                                record.type_name(),
                                "field names must be strings",
                            ));
                        };
                        record.set_field(&name, value)?;
                    }
                    Ok(())
                }
                Value::Null => Ok(()),
                _ => Err(DecodeError::invalid_payload(
                    record.type_name(),
                    "payload must be a map of fields",
                )),
            },
            PayloadSource::Custom { apply, .. } => apply(record, payload),
        }
    }

    /// The object `record` should be written as instead of itself, if any.
    pub fn replacement(&self, record: &dyn WireRecord) -> Option<ObjectRef> {
        self.replacement.as_ref().and_then(|replace| replace(record))
    }

    /// Constructs an empty instance for an object read with `header`.
    pub fn instantiate(&self, header: &Value) -> Box<dyn WireRecord> {
        (self.factory)(header)
    }

    fn decode_headers(&self) -> impl Iterator<Item = &Header> {
        self.fixed_header().into_iter().chain(self.decodes.iter())
    }
}

impl fmt::Debug for TypeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRecord")
            .field("type_name", &self.type_name)
            .field("header", &self.fixed_header())
            .field("decodes", &self.decodes)
            .finish()
    }
}

/// Builder for a [`TypeRecord`] of type `T`.
pub struct TypeRecordBuilder<T> {
    header: HeaderSource,
    payload: PayloadSource,
    replacement: Option<ReplaceFn>,
    factory: FactoryFn,
    decodes: Vec<Header>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: WireRecord> TypeRecordBuilder<T> {
    /// Writes every instance with this header and recognizes it on decode.
    pub fn header(mut self, header: Header) -> Self {
        self.header = HeaderSource::Fixed(header);
        self
    }

    /// Computes the header from the instance. Such headers are not matched
    /// on decode unless also listed with [`decodes`](Self::decodes).
    pub fn header_with<F>(mut self, header: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.header = HeaderSource::Dynamic(Arc::new(move |record: &dyn WireRecord| {
            Ok(header(downcast::<T>(record)?))
        }));
        self
    }

    /// Payload is the map of these fields, read and written through
    /// [`WireRecord::field`] and [`WireRecord::set_field`].
    pub fn fields(mut self, fields: &'static [&'static str]) -> Self {
        self.payload = PayloadSource::Fields(fields);
        self
    }

    /// Custom payload: `payload` builds it, `apply` reads it back.
    pub fn payload_with<P, A>(mut self, payload: P, apply: A) -> Self
    where
        P: Fn(&T) -> Value + Send + Sync + 'static,
        A: Fn(&mut T, Value) -> Result<(), DecodeError> + Send + Sync + 'static,
    {
        self.payload = PayloadSource::Custom {
            payload: Arc::new(move |record: &dyn WireRecord| Ok(payload(downcast::<T>(record)?))),
            apply: Arc::new(move |record: &mut dyn WireRecord, value: Value| {
                let type_name = record.type_name();
                match record.as_any_mut().downcast_mut::<T>() {
                    Some(record) => apply(record, value),
                    None => Err(DecodeError::invalid_payload(
                        type_name,
                        format!("record expects `{}`", std::any::type_name::<T>()),
                    )),
                }
            }),
        };
        self
    }

    /// Substitutes another object for an instance at encode time. Returning
    /// `None` writes the instance itself.
    pub fn replacement<F>(mut self, replace: F) -> Self
    where
        F: Fn(&T) -> Option<ObjectRef> + Send + Sync + 'static,
    {
        self.replacement = Some(Arc::new(move |record: &dyn WireRecord| {
            record.as_any().downcast_ref::<T>().and_then(&replace)
        }));
        self
    }

    /// Constructs new instances from the decoded header instead of `T::default()`.
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Value) -> T + Send + Sync + 'static,
    {
        self.factory = Arc::new(move |header: &Value| -> Box<dyn WireRecord> {
            Box::new(factory(header))
        });
        self
    }

    /// Also decode objects carrying `header` as this type.
    pub fn decodes(mut self, header: Header) -> Self {
        self.decodes.push(header);
        self
    }

    /// Finishes the record.
    pub fn build(self) -> TypeRecord {
        TypeRecord {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            header: self.header,
            payload: self.payload,
            replacement: self.replacement,
            factory: self.factory,
            decodes: self.decodes,
        }
    }
}

fn downcast<T: WireRecord>(record: &dyn WireRecord) -> Result<&T, EncodeError> {
    record
        .as_any()
        .downcast_ref::<T>()
        .ok_or(EncodeError::RecordMismatch {
            expected: std::any::type_name::<T>(),
            found: record.type_name(),
        })
}

fn short_type_name<T: ?Sized>() -> &'static str {
    short_name(std::any::type_name::<T>())
}

/// `a::b::Name<c::D>` to `Name`.
pub(crate) fn short_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// The record every registry carries for [`UnknownObject`]: header and
/// payload are whatever the object holds, so it re-encodes unchanged.
fn unknown_object_record() -> TypeRecord {
    TypeRecord::builder::<UnknownObject>()
        .header_with(|object: &UnknownObject| object.header.clone())
        .payload_with(
            |object: &UnknownObject| object.payload.clone(),
            |object, payload| {
                object.payload = payload;
                Ok(())
            },
        )
        .factory(|header| UnknownObject::new(header.clone(), Value::Null))
        .build()
}

/// Collects type records and fallback links, then freezes them into a
/// [`Registry`].
pub struct RegistryBuilder {
    records: Vec<TypeRecord>,
    fallbacks: Vec<(TypeId, &'static str, TypeId)>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// A builder that already knows [`UnknownObject`].
    pub fn new() -> Self {
        Self {
            records: vec![unknown_object_record()],
            fallbacks: Vec::new(),
        }
    }

    /// Adds a type record.
    pub fn register(&mut self, record: TypeRecord) -> &mut Self {
        self.records.push(record);
        self
    }

    /// Writes `Sub` values with the record found for `Parent` when `Sub`
    /// has none of its own.
    pub fn fallback<Sub: 'static, Parent: 'static>(&mut self) -> &mut Self {
        self.fallbacks.push((
            TypeId::of::<Sub>(),
            std::any::type_name::<Sub>(),
            TypeId::of::<Parent>(),
        ));
        self
    }

    /// Validates and freezes the registry.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut by_type: HashMap<TypeId, Arc<TypeRecord>> = HashMap::new();
        let mut by_header: HashMap<Header, Arc<TypeRecord>> = HashMap::new();
        let mut deferred = HashSet::new();

        for record in self.records {
            let record = Arc::new(record);
            if by_type.insert(record.type_id, record.clone()).is_some() {
                return Err(RegistryError::DuplicateType {
                    type_name: record.type_name,
                });
            }
            for header in record.decode_headers() {
                if let Some(previous) = by_header.insert(header.clone(), record.clone()) {
                    return Err(RegistryError::DuplicateHeader {
                        header: header.to_string(),
                        first: previous.type_name,
                        second: record.type_name,
                    });
                }
                if let Header::Environment(key) = header {
                    deferred.insert(key.clone());
                }
            }
        }

        let names: HashMap<TypeId, &'static str> = self
            .fallbacks
            .iter()
            .map(|(sub, name, _)| (*sub, *name))
            .collect();
        let fallbacks: HashMap<TypeId, TypeId> = self
            .fallbacks
            .iter()
            .map(|(sub, _, parent)| (*sub, *parent))
            .collect();
        for &start in fallbacks.keys() {
            let mut seen = HashSet::from([start]);
            let mut current = start;
            while let Some(&parent) = fallbacks.get(&current) {
                if !seen.insert(parent) {
                    return Err(RegistryError::CyclicFallback {
                        type_name: names.get(&start).copied().unwrap_or("<unknown>"),
                    });
                }
                current = parent;
            }
        }

        let unknown = by_type
            .get(&TypeId::of::<UnknownObject>())
            .cloned()
            .unwrap_or_else(|| Arc::new(unknown_object_record()));

        log::debug!(
            "plankton registry: {} types, {} headers, {} fallbacks",
            by_type.len(),
            by_header.len(),
            fallbacks.len()
        );

        Ok(Registry {
            by_type,
            by_header,
            fallbacks,
            deferred,
            unknown,
            memo: DashMap::new(),
        })
    }
}

/// Frozen set of type records.
pub struct Registry {
    by_type: HashMap<TypeId, Arc<TypeRecord>>,
    by_header: HashMap<Header, Arc<TypeRecord>>,
    fallbacks: HashMap<TypeId, TypeId>,
    deferred: HashSet<EnvironmentKey>,
    unknown: Arc<TypeRecord>,
    /// Resolved type lookups, misses included.
    memo: DashMap<TypeId, Option<Arc<TypeRecord>>>,
}

impl Registry {
    /// Starts building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The record used to write values of type `type_id`: its own, or the
    /// nearest one along its declared fallback chain.
    pub fn lookup_by_type(&self, type_id: TypeId) -> Option<Arc<TypeRecord>> {
        if let Some(hit) = self.memo.get(&type_id) {
            return hit.clone();
        }
        let mut current = type_id;
        let found = loop {
            if let Some(record) = self.by_type.get(&current) {
                break Some(record.clone());
            }
            match self.fallbacks.get(&current) {
                Some(&parent) => current = parent,
                None => break None,
            }
        };
        self.memo.insert(type_id, found.clone());
        found
    }

    /// The record registered for exactly this header.
    pub fn lookup_by_header(&self, header: &Header) -> Option<Arc<TypeRecord>> {
        self.by_header.get(header).cloned()
    }

    /// Returns true if `key` is the header key of a registered type and so
    /// decodes to a marker instead of going through the access function.
    pub fn is_deferred(&self, key: &EnvironmentKey) -> bool {
        self.deferred.contains(key)
    }

    /// The record for [`UnknownObject`].
    pub fn unknown_record(&self) -> &Arc<TypeRecord> {
        &self.unknown
    }
}

impl Default for Registry {
    /// A registry that only knows [`UnknownObject`].
    fn default() -> Self {
        let unknown = Arc::new(unknown_object_record());
        Registry {
            by_type: HashMap::from([(TypeId::of::<UnknownObject>(), unknown.clone())]),
            by_header: HashMap::new(),
            fallbacks: HashMap::new(),
            deferred: HashSet::new(),
            unknown,
            memo: DashMap::new(),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.by_type.len())
            .field("headers", &self.by_header.len())
            .field("fallbacks", &self.fallbacks.len())
            .finish()
    }
}
