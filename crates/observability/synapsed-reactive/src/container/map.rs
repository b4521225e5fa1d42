//! Map implementation - insertion-ordered key/value pairs keyed by value identity

use super::{Hooks, SlotBatch, SlotWrite};
use crate::types::{ContainerId, Index};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

struct MapInner {
    id: ContainerId,
    entries: RwLock<IndexMap<Value, Value>>,
    hooks: Hooks<SlotBatch>,
}

#[derive(Clone)]
pub struct Map {
    inner: Arc<MapInner>,
}

impl Map {
    pub fn new() -> Self {
        Self::from_entries(Vec::new())
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Self {
            inner: Arc::new(MapInner {
                id: ContainerId::next(),
                entries: RwLock::new(entries.into_iter().collect()),
                hooks: Hooks::new(),
            }),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    pub(crate) fn hooks(&self) -> &Hooks<SlotBatch> {
        &self.inner.hooks
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Value stored under `key`, `Undefined` when absent
    pub fn get(&self, key: &Value) -> Value {
        self.inner
            .entries
            .read()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has(&self, key: &Value) -> bool {
        self.inner.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<Value> {
        self.inner.entries.read().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.inner
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) {
        let (key, value) = (key.into(), value.into());
        let previous = self.inner.entries.write().insert(key.clone(), value.clone());
        let write = match previous {
            Some(old) if old == value => return,
            Some(old) => SlotWrite::assign(Index::Key(key), old, value, false),
            None => SlotWrite::assign(Index::Key(key), Value::Undefined, value, true),
        };
        self.inner.hooks.notify(&SlotBatch::new(vec![write]));
    }

    pub fn delete(&self, key: &Value) -> bool {
        let removed = self.inner.entries.write().shift_remove(key);
        match removed {
            Some(old) => {
                self.inner.hooks.notify(&SlotBatch::new(vec![SlotWrite::delete(
                    Index::Key(key.clone()),
                    old,
                )]));
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.inner.entries.write());
        if removed.is_empty() {
            return;
        }
        let writes = removed
            .into_iter()
            .map(|(key, old)| SlotWrite::delete(Index::Key(key), old))
            .collect();
        self.inner.hooks.notify(&SlotBatch::new(writes));
    }

    pub(crate) fn put_untracked(&self, key: Value, value: Value) {
        self.inner.entries.write().insert(key, value);
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("id", &self.inner.id)
            .field("len", &self.len())
            .finish()
    }
}
