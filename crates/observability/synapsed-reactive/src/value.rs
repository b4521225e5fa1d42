//! Dynamic value model shared by every container kind.
//!
//! Primitives compare by value (`NaN` equals `NaN`, `-0` equals `0`), containers
//! compare by identity. This is the equality used for map keys, set items and
//! every "did the slot change" check inside the adapters.

use crate::container::{Array, Date, DateProperty, Deferred, Map, Record, Set, Stream};
use crate::types::{ContainerId, Index, ReactiveError, ReactiveResult};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Record(Record),
    Array(Array),
    Map(Map),
    Set(Set),
    Date(Date),
    Deferred(Deferred),
    Stream(Stream),
}

impl Value {
    /// Short kind name used in errors and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Record(_) => "record",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Date(_) => "date",
            Value::Deferred(_) => "deferred",
            Value::Stream(_) => "stream",
        }
    }

    pub fn container_id(&self) -> Option<ContainerId> {
        match self {
            Value::Record(record) => Some(record.id()),
            Value::Array(array) => Some(array.id()),
            Value::Map(map) => Some(map.id()),
            Value::Set(set) => Some(set.id()),
            Value::Date(date) => Some(date.id()),
            Value::Deferred(deferred) => Some(deferred.id()),
            Value::Stream(stream) => Some(stream.id()),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        self.container_id().is_some()
    }

    /// Deferred values and streams
    pub fn is_async(&self) -> bool {
        matches!(self, Value::Deferred(_) | Value::Stream(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&Set> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&Date> {
        match self {
            Value::Date(date) => Some(date),
            _ => None,
        }
    }

    /// The value a deferred or stream has produced so far
    pub fn settled(&self) -> Option<Value> {
        match self {
            Value::Deferred(deferred) => deferred.value(),
            Value::Stream(stream) => stream.latest(),
            _ => None,
        }
    }

    /// Reads a slot without going through any observer.
    ///
    /// Missing slots and non-container values read as `Undefined`.
    pub fn read_slot(&self, index: &Index) -> Value {
        match (self, index) {
            (Value::Record(record), Index::Name(name)) => record.get(name),
            (Value::Array(array), Index::Position(position)) => array.get(*position),
            (Value::Map(map), Index::Key(key)) => map.get(key),
            (Value::Set(set), Index::Key(item)) if set.contains(item) => item.clone(),
            (Value::Date(date), Index::Name(name)) => DateProperty::from_name(name)
                .map(|property| Value::Number(date.component(property)))
                .unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Currently addressable slots, in container order
    pub fn slots(&self) -> Vec<Index> {
        match self {
            Value::Record(record) => record
                .readable_names()
                .into_iter()
                .map(Index::Name)
                .collect(),
            Value::Array(array) => (0..array.len()).map(Index::Position).collect(),
            Value::Map(map) => map.keys().into_iter().map(Index::Key).collect(),
            Value::Set(set) => set.items().into_iter().map(Index::Key).collect(),
            Value::Date(_) => DateProperty::ALL
                .iter()
                .map(|property| Index::name(property.name()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Writes a slot without notifying any hook
    pub fn put_untracked(&self, index: &Index, value: Value) -> ReactiveResult<()> {
        match (self, index) {
            (Value::Record(record), Index::Name(name)) => {
                record.put_untracked(name, value)
            }
            (Value::Array(array), Index::Position(position)) => {
                array.put_untracked(*position, value);
                Ok(())
            }
            (Value::Map(map), Index::Key(key)) => {
                map.put_untracked(key.clone(), value);
                Ok(())
            }
            (Value::Set(set), Index::Key(item)) => {
                set.replace_untracked(item, value);
                Ok(())
            }
            (Value::Date(date), Index::Name(name)) => {
                let property = DateProperty::from_name(name).ok_or_else(|| {
                    ReactiveError::InvalidIndex {
                        index: index.to_string(),
                        kind: self.kind(),
                    }
                })?;
                let number = value.as_number().ok_or_else(|| {
                    ReactiveError::InvalidDate(format!("{} expects a number", property.name()))
                })?;
                date.set_component_untracked(property, number)
            }
            (container, _) if container.is_container() => Err(ReactiveError::InvalidIndex {
                index: index.to_string(),
                kind: container.kind(),
            }),
            (other, _) => Err(ReactiveError::NotAContainer { kind: other.kind() }),
        }
    }
}

fn canonical_bits(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0
    } else {
        n.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (a, b) => match (a.container_id(), b.container_id()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Undefined | Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => canonical_bits(*n).hash(state),
            Value::String(s) => s.hash(state),
            other => other.container_id().hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            other => match other.container_id() {
                Some(id) => write!(f, "{}{}", other.kind(), id),
                None => f.write_str(other.kind()),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

macro_rules! container_from {
    ($($ty:ident),*) => {
        $(
            impl From<$ty> for Value {
                fn from(container: $ty) -> Self {
                    Value::$ty(container)
                }
            }
        )*
    };
}

container_from!(Record, Array, Map, Set, Date, Deferred, Stream);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_same_value_zero() {
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_eq!(Value::from(0.0), Value::from(-0.0));
        assert_ne!(Value::from(1.0), Value::from("1"));
        assert_ne!(Value::Undefined, Value::Null);
    }

    #[test]
    fn test_containers_compare_by_identity() {
        let a = Record::new().with_field("x", 1);
        let b = Record::new().with_field("x", 1);
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn test_hash_agrees_with_eq() {
        let mut seen = HashSet::new();
        seen.insert(Value::from(0.0));
        seen.insert(Value::from(-0.0));
        seen.insert(Value::from(f64::NAN));
        seen.insert(Value::from(f64::NAN));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_read_slot_per_kind() {
        let record = Value::from(Record::new().with_field("x", 1));
        assert_eq!(record.read_slot(&Index::from("x")), Value::from(1));
        assert_eq!(record.read_slot(&Index::from("missing")), Value::Undefined);
        assert_eq!(record.read_slot(&Index::from(0usize)), Value::Undefined);

        let array = Value::from(Array::from_values([Value::from(5), Value::from(6)]));
        assert_eq!(array.read_slot(&Index::from(1usize)), Value::from(6));
        assert_eq!(array.slots().len(), 2);

        let set = Set::new();
        set.add(Value::from("a"));
        let set = Value::from(set);
        assert_eq!(set.read_slot(&Index::from(Value::from("a"))), Value::from("a"));
        assert_eq!(set.read_slot(&Index::from(Value::from("b"))), Value::Undefined);

        assert_eq!(Value::from(3).read_slot(&Index::from("x")), Value::Undefined);
    }

    #[test]
    fn test_put_untracked_on_primitive_fails() {
        let err = Value::from(1)
            .put_untracked(&Index::from("x"), Value::Null)
            .unwrap_err();
        assert_eq!(err, ReactiveError::NotAContainer { kind: "number" });
    }
}
