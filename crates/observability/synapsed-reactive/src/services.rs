//! Injectable services: structural equality, deep cloning, id generation and error logging

use crate::container::{Array, Date, Map, Member, Record, Set};
use crate::types::{ContainerId, ObserverId};
use crate::value::Value;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Decides whether two values are interchangeable for change detection
pub trait EqualityService: Send + Sync {
    fn is_equal(&self, a: &Value, b: &Value) -> bool;
}

/// Produces an independent snapshot of a value
pub trait DeepClone: Send + Sync {
    fn clone_value(&self, value: &Value) -> anyhow::Result<Value>;
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> ObserverId;
}

/// Sink for errors raised while delivering notifications
pub trait ErrorLog: Send + Sync {
    fn add(&self, entry: ErrorEntry);
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub message: String,
    pub exception: Option<String>,
    pub context: Option<String>,
    pub fatal: bool,
    pub timestamp: DateTime<Utc>,
}

impl ErrorEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exception: None,
            context: None,
            fatal: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_exception(mut self, exception: impl fmt::Display) -> Self {
        self.exception = Some(exception.to_string());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }
}

/// Deep structural equality.
///
/// Containers of the same kind are equal when their readable contents are
/// equal. Methods compare by function identity, deferred values and streams
/// by container identity. Cycles are handled by assuming pairs already under
/// comparison are equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralEquality;

impl StructuralEquality {
    fn equal(&self, a: &Value, b: &Value, seen: &mut HashSet<(ContainerId, ContainerId)>) -> bool {
        if a == b {
            return true;
        }
        let (Some(x), Some(y)) = (a.container_id(), b.container_id()) else {
            return false;
        };
        if !seen.insert((x, y)) {
            return true;
        }

        match (a, b) {
            (Value::Record(a), Value::Record(b)) => self.records(a, b, seen),
            (Value::Array(a), Value::Array(b)) => self.arrays(a, b, seen),
            (Value::Map(a), Value::Map(b)) => self.maps(a, b, seen),
            (Value::Set(a), Value::Set(b)) => self.sets(a, b, seen),
            (Value::Date(a), Value::Date(b)) => a.epoch_millis() == b.epoch_millis(),
            _ => false,
        }
    }

    fn records(&self, a: &Record, b: &Record, seen: &mut HashSet<(ContainerId, ContainerId)>) -> bool {
        let names = a.member_names();
        if names.len() != b.len() {
            return false;
        }
        names.iter().all(|name| match (a.member(name), b.member(name)) {
            (Some(Member::Method(x)), Some(Member::Method(y))) => Arc::ptr_eq(&x, &y),
            (Some(Member::Method(_)), _) | (_, Some(Member::Method(_))) => false,
            (Some(_), Some(_)) => self.equal(&a.get(name), &b.get(name), seen),
            _ => false,
        })
    }

    fn arrays(&self, a: &Array, b: &Array, seen: &mut HashSet<(ContainerId, ContainerId)>) -> bool {
        let (a, b) = (a.to_vec(), b.to_vec());
        a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| self.equal(x, y, seen))
    }

    fn maps(&self, a: &Map, b: &Map, seen: &mut HashSet<(ContainerId, ContainerId)>) -> bool {
        a.len() == b.len()
            && a
                .entries()
                .iter()
                .all(|(key, value)| b.has(key) && self.equal(value, &b.get(key), seen))
    }

    fn sets(&self, a: &Set, b: &Set, seen: &mut HashSet<(ContainerId, ContainerId)>) -> bool {
        let others = b.items();
        a.len() == others.len()
            && a
                .items()
                .iter()
                .all(|item| others.iter().any(|other| self.equal(item, other, &mut seen.clone())))
    }
}

impl EqualityService for StructuralEquality {
    fn is_equal(&self, a: &Value, b: &Value) -> bool {
        self.equal(a, b, &mut HashSet::new())
    }
}

/// Deep cloner preserving shared references and cycles.
///
/// Record accessors and methods are shared with the copy. Deferred values and
/// streams cannot be copied and are shared by handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeepCloner;

impl DeepCloner {
    fn copy(&self, value: &Value, memo: &mut HashMap<ContainerId, Value>) -> anyhow::Result<Value> {
        let Some(id) = value.container_id() else {
            return Ok(value.clone());
        };
        if let Some(copy) = memo.get(&id) {
            return Ok(copy.clone());
        }

        match value {
            Value::Record(source) => {
                let target = Record::new();
                memo.insert(id, Value::Record(target.clone()));
                for name in source.member_names() {
                    let member = match source.member(&name) {
                        Some(Member::Field(inner)) => Member::Field(self.copy(&inner, memo)?),
                        Some(other) => other,
                        None => continue,
                    };
                    target.define(name, member);
                }
                Ok(Value::Record(target))
            }
            Value::Array(source) => {
                let target = Array::new();
                memo.insert(id, Value::Array(target.clone()));
                let items = source
                    .to_vec()
                    .iter()
                    .map(|item| self.copy(item, memo))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                target.replace_untracked(items);
                Ok(Value::Array(target))
            }
            Value::Map(source) => {
                let target = Map::new();
                memo.insert(id, Value::Map(target.clone()));
                for (key, inner) in source.entries() {
                    target.put_untracked(key, self.copy(&inner, memo)?);
                }
                Ok(Value::Map(target))
            }
            Value::Set(source) => {
                let target = Set::new();
                memo.insert(id, Value::Set(target.clone()));
                for item in source.items() {
                    target.insert_untracked(self.copy(&item, memo)?);
                }
                Ok(Value::Set(target))
            }
            Value::Date(source) => {
                let target = Date::with_offset(source.epoch_millis(), source.offset_seconds());
                memo.insert(id, Value::Date(target.clone()));
                Ok(Value::Date(target))
            }
            other => Ok(other.clone()),
        }
    }
}

impl DeepClone for DeepCloner {
    fn clone_value(&self, value: &Value) -> anyhow::Result<Value> {
        self.copy(value, &mut HashMap::new())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> ObserverId {
        ObserverId::new(uuid::Uuid::new_v4().to_string())
    }
}

/// Error log that forwards entries to `tracing` and keeps the most recent ones
pub struct TracingErrorLog {
    capacity: usize,
    entries: Mutex<VecDeque<ErrorEntry>>,
}

impl TracingErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Entries kept before the oldest is dropped
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> Vec<ErrorEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for TracingErrorLog {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ErrorLog for TracingErrorLog {
    fn add(&self, entry: ErrorEntry) {
        if entry.fatal {
            tracing::error!(
                message = %entry.message,
                exception = ?entry.exception,
                context = ?entry.context,
                "Fatal reactive error"
            );
        } else {
            tracing::warn!(
                message = %entry.message,
                exception = ?entry.exception,
                context = ?entry.context,
                "Reactive error"
            );
        }

        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

impl fmt::Debug for TracingErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingErrorLog")
            .field("capacity", &self.capacity)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

/// Bundle of services shared by the factory and the state manager
#[derive(Clone)]
pub struct Services {
    pub equality: Arc<dyn EqualityService>,
    pub cloner: Arc<dyn DeepClone>,
    pub ids: Arc<dyn IdGenerator>,
    pub errors: Arc<dyn ErrorLog>,
}

impl Services {
    pub fn with_equality(mut self, equality: Arc<dyn EqualityService>) -> Self {
        self.equality = equality;
        self
    }

    pub fn with_cloner(mut self, cloner: Arc<dyn DeepClone>) -> Self {
        self.cloner = cloner;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_error_log(mut self, errors: Arc<dyn ErrorLog>) -> Self {
        self.errors = errors;
        self
    }
}

impl Default for Services {
    fn default() -> Self {
        Self {
            equality: Arc::new(StructuralEquality),
            cloner: Arc::new(DeepCloner),
            ids: Arc::new(UuidGenerator),
            errors: Arc::new(TracingErrorLog::default()),
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
