//! Set implementation - unique items that double as their own keys

use super::{Hooks, SlotBatch, SlotWrite};
use crate::types::{ContainerId, Index};
use crate::value::Value;
use indexmap::IndexSet;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

struct SetInner {
    id: ContainerId,
    items: RwLock<IndexSet<Value>>,
    hooks: Hooks<SlotBatch>,
}

#[derive(Clone)]
pub struct Set {
    inner: Arc<SetInner>,
}

impl Set {
    pub fn new() -> Self {
        Self::from_items(Vec::new())
    }

    pub fn from_items(items: impl IntoIterator<Item = Value>) -> Self {
        Self {
            inner: Arc::new(SetInner {
                id: ContainerId::next(),
                items: RwLock::new(items.into_iter().collect()),
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
        self.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }

    pub fn contains(&self, item: &Value) -> bool {
        self.inner.items.read().contains(item)
    }

    pub fn items(&self) -> Vec<Value> {
        self.inner.items.read().iter().cloned().collect()
    }

    /// Adds an item. Returns `false` if it was already present.
    pub fn add(&self, item: impl Into<Value>) -> bool {
        let item = item.into();
        if !self.inner.items.write().insert(item.clone()) {
            return false;
        }
        self.inner.hooks.notify(&SlotBatch::new(vec![SlotWrite::assign(
            Index::Key(item.clone()),
            Value::Undefined,
            item,
            true,
        )]));
        true
    }

    pub fn delete(&self, item: &Value) -> bool {
        if !self.inner.items.write().shift_remove(item) {
            return false;
        }
        self.inner.hooks.notify(&SlotBatch::new(vec![SlotWrite::delete(
            Index::Key(item.clone()),
            item.clone(),
        )]));
        true
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.inner.items.write());
        if removed.is_empty() {
            return;
        }
        let writes = removed
            .into_iter()
            .map(|item| SlotWrite::delete(Index::Key(item.clone()), item))
            .collect();
        self.inner.hooks.notify(&SlotBatch::new(writes));
    }

    pub(crate) fn insert_untracked(&self, item: Value) {
        self.inner.items.write().insert(item);
    }

    /// Swaps `old` for `new` without notifying hooks; `Undefined` removes
    pub(crate) fn replace_untracked(&self, old: &Value, new: Value) {
        let mut items = self.inner.items.write();
        items.shift_remove(old);
        if !new.is_undefined() {
            items.insert(new);
        }
    }
}

impl Default for Set {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Set")
            .field("id", &self.inner.id)
            .field("len", &self.len())
            .finish()
    }
}
