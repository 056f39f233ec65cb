use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Timestamp;

/// The distinguished map key other Hessian bindings use to carry a
/// typed map's class name in band. In this crate the class name is a
/// proper attribute of [`Map`]; the key only resurfaces at the serde
/// boundary, where maps have no second channel.
pub const CLASS_KEY: &str = "#class";

/// A value in the Hessian 2.0 data model.
///
/// Integers and longs are unified: every wire integer form decodes to
/// `Int(i64)` and the encoder picks the narrowest form that holds the
/// value. Composite kinds ([`List`], [`Map`]) are shared handles, so
/// the same list or map can appear at several points of a value graph
/// and the codec will emit it once plus back-references.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Date(Timestamp),
    List(List),
    Map(Map),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(*self, Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        self.as_bool().is_some()
    }

    pub fn is_int(&self) -> bool {
        self.as_int().is_some()
    }

    pub fn is_double(&self) -> bool {
        matches!(*self, Value::Double(_))
    }

    pub fn is_str(&self) -> bool {
        self.as_str().is_some()
    }

    pub fn is_binary(&self) -> bool {
        self.as_binary().is_some()
    }

    pub fn is_date(&self) -> bool {
        self.as_date().is_some()
    }

    pub fn is_list(&self) -> bool {
        self.as_list().is_some()
    }

    pub fn is_map(&self) -> bool {
        self.as_map().is_some()
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    /// Numeric view: doubles as themselves, integers widened.
    pub fn as_double(&self) -> Option<f64> {
        match *self {
            Value::Double(v) => Some(v),
            Value::Int(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(ref v) = *self {
            Some(v.as_str())
        } else {
            None
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        if let Value::Binary(ref v) = *self {
            Some(v.as_slice())
        } else {
            None
        }
    }

    pub fn as_date(&self) -> Option<Timestamp> {
        if let Value::Date(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        if let Value::List(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        if let Value::Map(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Value {
                Value::Int(v as i64)
            }
        })*
    };
}
value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Value {
        Value::Binary(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Value {
        Value::Binary(v.to_vec())
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Value {
        Value::Date(v)
    }
}

impl From<List> for Value {
    fn from(v: List) -> Value {
        Value::List(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Value {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// An ordered sequence of values behind a shared handle.
///
/// Cloning a `List` clones the handle, not the contents: both clones
/// see the same elements, and the encoder treats them as the same
/// object when deciding whether to emit a back-reference.
#[derive(Clone, Default)]
pub struct List {
    pub(crate) items: Rc<RefCell<Vec<Value>>>,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, v: impl Into<Value>) {
        self.items.borrow_mut().push(v.into());
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Clone out the element at `index`. Cheap for composites (handle
    /// clone), deep for strings and binaries.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    /// Clone the contents into a plain vector.
    pub fn to_vec(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }

    /// Whether two handles refer to the same underlying list.
    pub fn ptr_eq(a: &List, b: &List) -> bool {
        Rc::ptr_eq(&a.items, &b.items)
    }

    /// Stable address of the shared allocation, used as the identity
    /// key in the encoder's reference table.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.items) as usize
    }
}

impl PartialEq for List {
    fn eq(&self, other: &List) -> bool {
        List::ptr_eq(self, other) || *self.items.borrow() == *other.items.borrow()
    }
}

impl From<Vec<Value>> for List {
    fn from(items: Vec<Value>) -> List {
        List {
            items: Rc::new(RefCell::new(items)),
        }
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> List {
        List::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.items.borrow().iter()).finish()
    }
}

/// An insertion-ordered key-value map behind a shared handle,
/// optionally carrying a class name (the wire's typed-map form).
///
/// Keys are arbitrary values. [`Map::insert`] replaces the value of a
/// structurally equal key in place, keeping the key's original
/// position. Like [`List`], cloning clones the handle.
#[derive(Clone, Default)]
pub struct Map {
    pub(crate) inner: Rc<RefCell<MapInner>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct MapInner {
    pub(crate) class: Option<String>,
    pub(crate) entries: Vec<(Value, Value)>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map that will be emitted as the typed `M` form carrying
    /// `class` as its type name.
    pub fn with_class(class: impl Into<String>) -> Self {
        let map = Map::new();
        map.inner.borrow_mut().class = Some(class.into());
        map
    }

    /// The class name, if this is a typed map.
    pub fn class_name(&self) -> Option<String> {
        self.inner.borrow().class.clone()
    }

    pub fn set_class_name(&self, class: Option<String>) {
        self.inner.borrow_mut().class = class;
    }

    /// Insert a pair, replacing the value in place if a structurally
    /// equal key is already present.
    pub fn insert(&self, key: impl Into<Value>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let mut inner = self.inner.borrow_mut();
        match inner.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => inner.entries.push((key, value)),
        }
    }

    /// Clone out the value under a structurally equal key.
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.inner
            .borrow()
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Convenience lookup under a string key.
    pub fn get_str(&self, key: &str) -> Option<Value> {
        self.inner
            .borrow()
            .entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// Clone the pairs out in insertion order.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.inner.borrow().entries.clone()
    }

    /// Whether two handles refer to the same underlying map.
    pub fn ptr_eq(a: &Map, b: &Map) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    pub(crate) fn borrow_inner(&self) -> Ref<'_, MapInner> {
        self.inner.borrow()
    }
}

impl PartialEq for Map {
    fn eq(&self, other: &Map) -> bool {
        Map::ptr_eq(self, other) || *self.inner.borrow() == *other.inner.borrow()
    }
}

impl FromIterator<(Value, Value)> for Map {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Map {
        let map = Map::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.inner.borrow();
        let mut dbg = f.debug_map();
        if let Some(ref class) = inner.class {
            dbg.entry(&CLASS_KEY, class);
        }
        dbg.entries(inner.entries.iter().map(|(k, v)| (k, v))).finish()
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Binary(v) => serializer.serialize_bytes(v),
            Value::Date(v) => v.serialize(serializer),
            Value::List(list) => {
                let items = list.items.borrow();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let inner = map.inner.borrow();
                let extra = inner.class.is_some() as usize;
                let mut ser = serializer.serialize_map(Some(inner.entries.len() + extra))?;
                if let Some(ref class) = inner.class {
                    ser.serialize_entry(CLASS_KEY, class)?;
                }
                for (k, v) in inner.entries.iter() {
                    ser.serialize_entry(k, v)?;
                }
                ser.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any Hessian-representable value")
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Value, E>
    where
        E: de::Error,
    {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| E::custom(format!("integer {} overflows the value model", v)))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Double(v))
    }

    fn visit_str<E>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::Binary(v.to_vec()))
    }

    fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Value, E> {
        Ok(Value::Binary(v))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let list = List::new();
        while let Some(item) = seq.next_element::<Value>()? {
            list.push(item);
        }
        Ok(Value::List(list))
    }

    fn visit_map<A>(self, mut access: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let map = Map::new();
        while let Some(key) = access.next_key::<Value>()? {
            let value = access.next_value::<Value>()?;
            // Hoist the in-band class key back into the attribute.
            if map.class_name().is_none() && key.as_str() == Some(CLASS_KEY) {
                if let Value::String(class) = value {
                    map.set_class_name(Some(class));
                    continue;
                }
            }
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(7i32).as_int(), Some(7));
        assert_eq!(Value::from(7i32).as_double(), Some(7.0));
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(Value::from(vec![1u8, 2]).as_binary(), Some(&[1u8, 2][..]));
        assert!(Value::from(Timestamp::from_secs(1)).is_date());
        assert!(Value::from(List::new()).is_list());
        assert!(Value::from(Map::new()).is_map());
        assert!(Value::from(None::<i64>).is_null());
    }

    #[test]
    fn list_handles_share() {
        let a = List::new();
        let b = a.clone();
        a.push(1i64);
        assert_eq!(b.len(), 1);
        assert!(List::ptr_eq(&a, &b));
        assert_eq!(a, List::from(vec![Value::Int(1)]));
        assert!(!List::ptr_eq(&a, &List::from(vec![Value::Int(1)])));
    }

    #[test]
    fn map_insert_replaces_in_place() {
        let m = Map::new();
        m.insert("a", 1i64);
        m.insert("b", 2i64);
        m.insert("a", 3i64);
        assert_eq!(m.len(), 2);
        assert_eq!(m.get_str("a"), Some(Value::Int(3)));
        let keys: Vec<_> = m
            .entries()
            .into_iter()
            .map(|(k, _)| k.as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn map_non_string_keys() {
        let m = Map::new();
        m.insert(1i64, "one");
        m.insert(Value::Null, "nothing");
        assert_eq!(m.get(&Value::Int(1)), Some(Value::from("one")));
        assert_eq!(m.get(&Value::Null), Some(Value::from("nothing")));
    }

    #[test]
    fn double_equality_is_ieee() {
        assert_eq!(Value::Double(1.5), Value::Double(1.5));
        assert_ne!(Value::Double(f64::NAN), Value::Double(f64::NAN));
        assert_ne!(Value::Double(1.0), Value::Int(1));
    }

    mod serde_surface {
        use super::*;

        #[test]
        fn scalars_to_json() {
            let list: List = vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(-5),
                Value::Double(1.5),
                Value::from("x"),
            ]
            .into();
            let json = serde_json::to_string(&Value::List(list)).unwrap();
            assert_eq!(json, "[null,true,-5,1.5,\"x\"]");
        }

        #[test]
        fn class_name_surfaces_as_class_key() {
            let m = Map::with_class("com.example.Bean");
            m.insert("a", 1i64);
            let json = serde_json::to_value(Value::Map(m)).unwrap();
            assert_eq!(json["#class"], "com.example.Bean");
            assert_eq!(json["a"], 1);
        }

        #[test]
        fn class_key_hoists_on_deserialize() {
            let v: Value =
                serde_json::from_str(r##"{"#class":"com.example.Bean","a":1}"##).unwrap();
            let m = v.as_map().unwrap();
            assert_eq!(m.class_name().as_deref(), Some("com.example.Bean"));
            assert_eq!(m.len(), 1);
            assert_eq!(m.get_str("a"), Some(Value::Int(1)));
        }

        #[test]
        fn json_roundtrip() {
            // serde_json hands object keys back in sorted order, so
            // keep insertion order alphabetical for the comparison.
            let m = Map::new();
            m.insert("a", List::from(vec![Value::Int(1), Value::Int(2)]));
            m.insert("b", "text");
            let v = Value::Map(m);
            let json = serde_json::to_string(&v).unwrap();
            let back: Value = serde_json::from_str(&json).unwrap();
            assert_eq!(back, v);
        }
    }
}
