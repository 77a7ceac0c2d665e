//! The plankton value tree.
//!
//! A [`Value`] is what the codec reads and writes. Scalars and containers are
//! plain data; custom objects are shared, mutable [`ObjectRef`] handles so
//! that a decoded graph keeps the identity (and the cycles) of the graph that
//! was encoded.

use std::any::TypeId;
use std::cell::{Ref, RefCell, RefMut};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::rc::Rc;

use ahash::{AHashMap, RandomState};

use crate::record::WireRecord;

/// A plankton value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Value {
    /// A signed 32-bit integer.
    Int(i32),
    /// A UTF-8 string.
    Str(String),
    /// An ordered sequence.
    Array(Vec<Value>),
    /// A key/value mapping.
    Map(Map),
    /// The null value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A registered custom object, compared by identity.
    Object(ObjectRef),
    /// A value that lives outside the stream and is addressed by key.
    Environment(EnvironmentKey),
}

impl Value {
    /// Convenience constructor for string values.
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The integer, if this is one.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The elements, if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(elements) => Some(elements),
            _ => None,
        }
    }

    /// The map, if this is one.
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The object handle, if this is an object.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Position of this variant in the canonical map-key order.
    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Str(_) => 1,
            Value::Array(_) => 2,
            Value::Map(_) => 3,
            Value::Null => 4,
            Value::Bool(_) => 5,
            Value::Object(_) => 6,
            Value::Environment(_) => 7,
        }
    }

    /// Total order used to sort map keys before they are written.
    ///
    /// Maps and objects have no content order among themselves and compare
    /// equal, so a stable sort keeps their insertion order.
    pub fn canonical_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Environment(a), Value::Environment(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.canonical_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Int(n) => n.hash(state),
            Value::Str(s) => s.hash(state),
            Value::Array(elements) => elements.hash(state),
            // Equal maps may hold their entries in any order.
            Value::Map(map) => map.len().hash(state),
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Object(object) => object.hash(state),
            Value::Environment(key) => key.hash(state),
        }
    }
}

/// Hashes a `&str` exactly as the equal [`Value::Str`] hashes.
struct StrKey<'a>(&'a str);

impl Hash for StrKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Value::Str(String::new()).rank().hash(state);
        self.0.hash(state);
    }
}

/// A key/value mapping.
///
/// Entries keep insertion order in memory, but equality ignores order: two
/// maps are equal when they hold the same keys bound to equal values.
#[derive(Clone, Default)]
pub struct Map {
    entries: Vec<(Value, Value)>,
    /// Newest entry for each key hash.
    heads: AHashMap<u64, usize>,
    /// For each entry, the previous entry whose key has the same hash.
    chain: Vec<Option<usize>>,
    hasher: RandomState,
}

impl Map {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            heads: AHashMap::with_capacity(capacity),
            chain: Vec::with_capacity(capacity),
            hasher: RandomState::new(),
        }
    }

    /// Position of the entry whose key hashes to `hash` and satisfies `matches`.
    fn position(&self, hash: u64, matches: impl Fn(&Value) -> bool) -> Option<usize> {
        let mut current = self.heads.get(&hash).copied();
        while let Some(index) = current {
            if matches(&self.entries[index].0) {
                return Some(index);
            }
            current = self.chain[index];
        }
        None
    }

    /// Binds `key` to `value`, returning the previous value for an equal key.
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        let hash = self.hasher.hash_one(&key);
        if let Some(index) = self.position(hash, |k| *k == key) {
            return Some(std::mem::replace(&mut self.entries[index].1, value));
        }
        let index = self.entries.len();
        self.chain.push(self.heads.insert(hash, index));
        self.entries.push((key, value));
        None
    }

    /// Looks up the value bound to `key`.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        let hash = self.hasher.hash_one(key);
        self.position(hash, |k| k == key)
            .map(|index| &self.entries[index].1)
    }

    /// Looks up the value bound to the string key `key`.
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        let hash = self.hasher.hash_one(StrKey(key));
        self.position(hash, |k| k.as_str() == Some(key))
            .map(|index| &self.entries[index].1)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Entries sorted by [`Value::canonical_cmp`] on their keys.
    pub fn canonical_entries(&self) -> Vec<&(Value, Value)> {
        let mut sorted: Vec<&(Value, Value)> = self.entries.iter().collect();
        sorted.sort_by(|(a, _), (b, _)| a.canonical_cmp(b));
        sorted
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|w| w == v))
    }
}

impl Eq for Map {}

impl<K: Into<Value>, V: Into<Value>> FromIterator<(K, V)> for Map {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Map::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for Map {
    type Item = (Value, Value);
    type IntoIter = std::vec::IntoIter<(Value, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Shared handle to a custom object.
///
/// Cloning the handle shares the object; equality is identity. Graphs may be
/// cyclic, in which case the objects on the cycle are never freed unless the
/// caller clears one of the links.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<Box<dyn WireRecord>>>);

impl ObjectRef {
    /// Wraps a record in a fresh object.
    pub fn new<T: WireRecord>(record: T) -> Self {
        Self::from_boxed(Box::new(record))
    }

    /// Wraps an already boxed record in a fresh object.
    pub fn from_boxed(record: Box<dyn WireRecord>) -> Self {
        ObjectRef(Rc::new(RefCell::new(record)))
    }

    /// Stable identity of this object for the lifetime of the allocation.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Returns true if both handles point at the same object.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Borrows the record.
    ///
    /// Panics if the record is currently borrowed mutably.
    pub fn borrow(&self) -> Ref<'_, dyn WireRecord> {
        Ref::map(self.0.borrow(), |record| &**record)
    }

    /// Borrows the record mutably.
    ///
    /// Panics if the record is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, dyn WireRecord> {
        RefMut::map(self.0.borrow_mut(), |record| &mut **record)
    }

    /// Borrows the record, or returns `None` if it is borrowed mutably.
    pub fn try_borrow(&self) -> Option<Ref<'_, dyn WireRecord>> {
        let record = self.0.try_borrow().ok()?;
        Some(Ref::map(record, |record| &**record))
    }

    /// The concrete Rust type of the record.
    pub fn record_type(&self) -> TypeId {
        let record = self.borrow();
        (*record).as_any().type_id()
    }

    /// The Rust type name of the record.
    pub fn type_name(&self) -> &'static str {
        self.borrow().type_name()
    }

    /// Returns true if the record is a `T`.
    pub fn is<T: WireRecord>(&self) -> bool {
        self.record_type() == TypeId::of::<T>()
    }

    /// Borrows the record as a `T`.
    ///
    /// Returns `None` if it is some other type or is borrowed mutably.
    pub fn downcast_ref<T: WireRecord>(&self) -> Option<Ref<'_, T>> {
        let record = self.0.try_borrow().ok()?;
        Ref::filter_map(record, |record| (**record).as_any().downcast_ref::<T>()).ok()
    }

    /// Borrows the record mutably as a `T`.
    ///
    /// Returns `None` if it is some other type or is already borrowed.
    pub fn downcast_mut<T: WireRecord>(&self) -> Option<RefMut<'_, T>> {
        let record = self.0.try_borrow_mut().ok()?;
        RefMut::filter_map(record, |record| (**record).as_any_mut().downcast_mut::<T>()).ok()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    // Payloads are not printed: they may lead back to this object.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(record) => write!(f, "ObjectRef({} @{:#x})", record.type_name(), self.id()),
            Err(_) => write!(f, "ObjectRef(<borrowed> @{:#x})", self.id()),
        }
    }
}

/// Key of a value that is supplied by the environment rather than the stream,
/// conventionally a short path such as `["core", "Module"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvironmentKey(Vec<String>);

impl EnvironmentKey {
    /// Builds a key from its path segments.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EnvironmentKey(parts.into_iter().map(Into::into).collect())
    }

    /// The path segments.
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// The key as it appears on the wire: an array of strings.
    pub fn to_value(&self) -> Value {
        Value::Array(self.0.iter().cloned().map(Value::Str).collect())
    }

    /// Reads a key back from an array of strings.
    pub fn from_array(value: &Value) -> Option<Self> {
        let elements = value.as_array()?;
        elements
            .iter()
            .map(|element| element.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(EnvironmentKey)
    }
}

impl fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::UnknownObject;

    #[test]
    fn test_map_equality_ignores_order() {
        let a: Map = [("a", 1), ("b", 2)].into_iter().collect();
        let b: Map = [("b", 2), ("a", 1)].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_map_insert_replaces_equal_key() {
        let mut map = Map::new();
        assert_eq!(map.insert("x", 1), None);
        assert_eq!(map.insert("x", 2), Some(Value::Int(1)));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get_str("x"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_map_keys_with_equal_hashes_stay_apart() {
        // Map keys hash by length only, so these two share a hash.
        let first = Value::Map([("a", 1)].into_iter().collect());
        let second = Value::Map([("b", 2)].into_iter().collect());
        let mut map = Map::new();
        map.insert(first.clone(), "first");
        map.insert(second.clone(), "second");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&first), Some(&Value::str("first")));
        assert_eq!(map.get(&second), Some(&Value::str("second")));

        assert_eq!(map.insert(first.clone(), "again"), Some(Value::str("first")));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&first), Some(&Value::str("again")));
        assert_eq!(map.get(&Value::Map(Map::new())), None);
    }

    #[test]
    fn test_map_get_str_matches_string_keys_only() {
        let map: Map = [(Value::str("1"), Value::Int(1)), (Value::Int(1), Value::Int(2))]
            .into_iter()
            .collect();
        assert_eq!(map.get_str("1"), Some(&Value::Int(1)));
        assert_eq!(map.get(&Value::Int(1)), Some(&Value::Int(2)));
        assert_eq!(map.get_str("2"), None);
    }

    #[test]
    fn test_many_entries() {
        let map: Map = (0..100_000i32).map(|i| (i, i)).collect();
        assert_eq!(map.len(), 100_000);
        assert_eq!(map.get(&Value::Int(77_777)), Some(&Value::Int(77_777)));
        let clone = map.clone();
        assert_eq!(clone, map);
    }

    #[test]
    fn test_equal_values_hash_equal() {
        let hasher = RandomState::new();
        let a: Map = [("x", 1), ("y", 2)].into_iter().collect();
        let b: Map = [("y", 2), ("x", 1)].into_iter().collect();
        assert_eq!(
            hasher.hash_one(&Value::Map(a)),
            hasher.hash_one(&Value::Map(b))
        );
        assert_eq!(
            hasher.hash_one(&Value::str("k")),
            hasher.hash_one(StrKey("k"))
        );
    }

    #[test]
    fn test_canonical_order() {
        let mut keys = vec![
            Value::Null,
            Value::str("b"),
            Value::Int(10),
            Value::str("a"),
            Value::Int(-3),
            Value::Bool(false),
        ];
        keys.sort_by(|a, b| a.canonical_cmp(b));
        assert_eq!(
            keys,
            vec![
                Value::Int(-3),
                Value::Int(10),
                Value::str("a"),
                Value::str("b"),
                Value::Null,
                Value::Bool(false),
            ]
        );
    }

    #[test]
    fn test_object_identity() {
        let a = ObjectRef::new(UnknownObject::default());
        let b = ObjectRef::new(UnknownObject::default());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(a.is::<UnknownObject>());
        assert!(a.downcast_ref::<UnknownObject>().is_some());
    }

    #[test]
    fn test_downcast_while_mutably_borrowed() {
        let a = ObjectRef::new(UnknownObject::default());
        let _guard = a.borrow_mut();
        assert!(a.downcast_ref::<UnknownObject>().is_none());
    }

    #[test]
    fn test_environment_key_value_form() {
        let key = EnvironmentKey::new(["core", "Module"]);
        let value = key.to_value();
        assert_eq!(value, Value::Array(vec![Value::str("core"), Value::str("Module")]));
        assert_eq!(EnvironmentKey::from_array(&value), Some(key.clone()));
        assert_eq!(EnvironmentKey::from_array(&Value::Int(1)), None);
        assert_eq!(key.to_string(), "core/Module");
    }
}
