//! Object-state manager - last known value and snapshot per watched (context, index)

use crate::services::DeepClone;
use crate::types::{ContainerId, Index, ReactiveError, ReactiveResult};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Tracked state of one slot
#[derive(Debug, Clone)]
pub struct WatchedState {
    pub context: Value,
    pub index: Index,
    /// Last value seen in the slot
    pub value: Value,
    /// Deep snapshot of `value`, compared against to detect changes
    pub value_copy: Value,
    pub watched: bool,
    pub ref_count: u32,
}

struct ContextStates {
    context: Value,
    entries: IndexMap<Index, WatchedState>,
}

pub struct ObjectStateManager {
    cloner: Arc<dyn DeepClone>,
    contexts: Mutex<HashMap<ContainerId, ContextStates>>,
}

impl ObjectStateManager {
    pub fn new(cloner: Arc<dyn DeepClone>) -> Self {
        Self {
            cloner,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    fn snapshot(&self, context: &Value, index: &Index, value: &Value) -> ReactiveResult<Value> {
        self.cloner
            .clone_value(value)
            .map_err(|err| ReactiveError::Clone {
                key: format!("{context:?}.{index}"),
                message: err.to_string(),
            })
    }

    pub fn get(&self, context: &Value, index: &Index) -> Option<WatchedState> {
        let id = context.container_id()?;
        self.contexts
            .lock()
            .get(&id)
            .and_then(|states| states.entries.get(index))
            .cloned()
    }

    pub fn contains(&self, context: &Value, index: &Index) -> bool {
        self.get(context, index).is_some()
    }

    pub fn is_watched(&self, context: &Value, index: &Index) -> bool {
        self.get(context, index).is_some_and(|state| state.watched)
    }

    /// Indexes tracked under `context`, in insertion order
    pub fn indexes(&self, context: &Value) -> Vec<Index> {
        let Some(id) = context.container_id() else {
            return Vec::new();
        };
        self.contexts
            .lock()
            .get(&id)
            .map(|states| states.entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Contexts that currently hold state
    pub fn contexts(&self) -> Vec<Value> {
        self.contexts
            .lock()
            .values()
            .map(|states| states.context.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.contexts
            .lock()
            .values()
            .map(|states| states.entries.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a reference to the state for `(context, index)`, creating it with
    /// `value` if absent. Returns `true` if the state was created.
    pub fn acquire(&self, context: &Value, index: &Index, value: &Value, watched: bool) -> ReactiveResult<bool> {
        let id = context
            .container_id()
            .ok_or(ReactiveError::NotAContainer { kind: context.kind() })?;
        if let Some(state) = self
            .contexts
            .lock()
            .get_mut(&id)
            .and_then(|states| states.entries.get_mut(index))
        {
            state.ref_count += 1;
            state.watched |= watched;
            return Ok(false);
        }

        let value_copy = self.snapshot(context, index, value)?;
        let mut contexts = self.contexts.lock();
        let states = contexts.entry(id).or_insert_with(|| ContextStates {
            context: context.clone(),
            entries: IndexMap::new(),
        });
        let state = states
            .entries
            .entry(index.clone())
            .or_insert_with(|| WatchedState {
                context: context.clone(),
                index: index.clone(),
                value: value.clone(),
                value_copy,
                watched,
                ref_count: 0,
            });
        state.ref_count += 1;
        Ok(state.ref_count == 1)
    }

    /// Updates the value and snapshot of an existing state. Returns `false`
    /// if no state exists.
    pub fn set(&self, context: &Value, index: &Index, value: &Value, watched: bool) -> ReactiveResult<bool> {
        let Some(id) = context.container_id() else {
            return Ok(false);
        };
        if !self.contains(context, index) {
            return Ok(false);
        }
        let value_copy = self.snapshot(context, index, value)?;
        let mut contexts = self.contexts.lock();
        let Some(state) = contexts
            .get_mut(&id)
            .and_then(|states| states.entries.get_mut(index))
        else {
            return Ok(false);
        };
        state.value = value.clone();
        state.value_copy = value_copy;
        state.watched = watched;
        Ok(true)
    }

    /// Drops one reference. The state is removed at zero. Returns the
    /// remaining count, `None` if no state existed.
    pub fn release(&self, context: &Value, index: &Index) -> Option<u32> {
        let id = context.container_id()?;
        let mut contexts = self.contexts.lock();
        let states = contexts.get_mut(&id)?;
        let state = states.entries.get_mut(index)?;
        state.ref_count = state.ref_count.saturating_sub(1);
        let remaining = state.ref_count;
        if remaining == 0 {
            states.entries.shift_remove(index);
            if states.entries.is_empty() {
                contexts.remove(&id);
            }
        }
        Some(remaining)
    }

    fn take(&self, context: &Value, index: &Index) -> Option<WatchedState> {
        let id = context.container_id()?;
        let mut contexts = self.contexts.lock();
        let states = contexts.get_mut(&id)?;
        let state = states.entries.shift_remove(index);
        if states.entries.is_empty() {
            contexts.remove(&id);
        }
        state
    }

    /// Moves the state for `index` from `old_context` to `new_context`.
    ///
    /// An `Undefined` new value releases the state entirely. Reference counts
    /// carry over and merge with any state already present under the new
    /// context.
    pub fn replace_state(
        &self,
        index: &Index,
        new_context: &Value,
        new_value: &Value,
        old_context: &Value,
        watched: bool,
    ) -> ReactiveResult<()> {
        if new_value.is_undefined() || !new_context.is_container() {
            self.take(old_context, index);
            return Ok(());
        }
        self.migrate(index, new_context, old_context, watched)?;
        self.set(new_context, index, new_value, watched).map(|_| ())
    }

    /// Moves the state without touching its value
    pub(crate) fn migrate(
        &self,
        index: &Index,
        new_context: &Value,
        old_context: &Value,
        watched: bool,
    ) -> ReactiveResult<()> {
        if new_context == old_context {
            return Ok(());
        }
        let new_id = new_context
            .container_id()
            .ok_or(ReactiveError::NotAContainer { kind: new_context.kind() })?;
        let Some(moved) = self.take(old_context, index) else {
            return Ok(());
        };

        let mut contexts = self.contexts.lock();
        let states = contexts.entry(new_id).or_insert_with(|| ContextStates {
            context: new_context.clone(),
            entries: IndexMap::new(),
        });
        match states.entries.get_mut(index) {
            Some(existing) => {
                existing.ref_count += moved.ref_count;
                existing.watched |= watched;
            }
            None => {
                states.entries.insert(
                    index.clone(),
                    WatchedState {
                        context: new_context.clone(),
                        watched,
                        ..moved
                    },
                );
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectStateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStateManager")
            .field("states", &self.len())
            .finish()
    }
}
