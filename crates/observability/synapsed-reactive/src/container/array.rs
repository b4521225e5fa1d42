//! Array implementation - ordered items addressed by position

use super::{Hooks, SlotBatch, SlotWrite};
use crate::types::{ContainerId, Index};
use crate::value::Value;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

struct ArrayInner {
    id: ContainerId,
    items: RwLock<Vec<Value>>,
    hooks: Hooks<SlotBatch>,
}

/// Mutable array with identity.
///
/// Structural operations report one write per index whose value actually
/// changed, so `[1, 2, 3, 4].splice(1, 1, [10, 11])` reports indices 1..=4.
#[derive(Clone)]
pub struct Array {
    inner: Arc<ArrayInner>,
}

impl Array {
    pub fn new() -> Self {
        Self::from_values(Vec::new())
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            inner: Arc::new(ArrayInner {
                id: ContainerId::next(),
                items: RwLock::new(values.into_iter().collect()),
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

    pub fn get(&self, position: usize) -> Value {
        self.inner
            .items
            .read()
            .get(position)
            .cloned()
            .unwrap_or_default()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.read().clone()
    }

    /// Assigns one position. Writing past the end pads with `Undefined`
    /// and reports only the assigned position.
    pub fn set(&self, position: usize, value: impl Into<Value>) {
        let value = value.into();
        let write = {
            let mut items = self.inner.items.write();
            if position < items.len() {
                if items[position] == value {
                    return;
                }
                let old = std::mem::replace(&mut items[position], value.clone());
                SlotWrite::assign(Index::Position(position), old, value, false)
            } else {
                items.resize(position, Value::Undefined);
                items.push(value.clone());
                SlotWrite::assign(Index::Position(position), Value::Undefined, value, true)
            }
        };
        self.inner.hooks.notify(&SlotBatch::new(vec![write]));
    }

    /// Truncates or pads. Growing reports nothing.
    pub fn set_len(&self, len: usize) {
        self.mutate(|items| items.resize(len, Value::Undefined));
    }

    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.mutate(|items| {
            items.push(value);
            items.len()
        })
    }

    pub fn pop(&self) -> Value {
        self.mutate(|items| items.pop().unwrap_or_default())
    }

    pub fn shift(&self) -> Value {
        self.mutate(|items| {
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        })
    }

    pub fn unshift(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let values: Vec<Value> = values.into_iter().collect();
        self.mutate(|items| {
            items.splice(0..0, values);
            items.len()
        })
    }

    /// Removes `delete_count` items at `start`, inserts `insert` there and
    /// returns the removed items
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        insert: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let insert: Vec<Value> = insert.into_iter().collect();
        self.mutate(|items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, insert).collect()
        })
    }

    pub fn reverse(&self) {
        self.mutate(|items| items.reverse());
    }

    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        self.mutate(|items| items.sort_by(compare));
    }

    /// Fills `start..end` (clamped) with `value`
    pub fn fill(&self, value: impl Into<Value>, start: usize, end: usize) {
        let value = value.into();
        self.mutate(|items| {
            let end = end.min(items.len());
            for item in items.iter_mut().take(end).skip(start) {
                *item = value.clone();
            }
        });
    }

    pub(crate) fn put_untracked(&self, position: usize, value: Value) {
        let mut items = self.inner.items.write();
        if position >= items.len() {
            items.resize(position + 1, Value::Undefined);
        }
        items[position] = value;
    }

    pub(crate) fn replace_untracked(&self, values: Vec<Value>) {
        *self.inner.items.write() = values;
    }

    fn mutate<R>(&self, operation: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let observed = !self.inner.hooks.is_empty();
        let (result, writes) = {
            let mut items = self.inner.items.write();
            let before = if observed { items.clone() } else { Vec::new() };
            let result = operation(&mut items);
            let writes = if observed {
                diff(&before, &items)
            } else {
                Vec::new()
            };
            (result, writes)
        };
        if !writes.is_empty() {
            self.inner.hooks.notify(&SlotBatch::new(writes));
        }
        result
    }
}

fn diff(before: &[Value], after: &[Value]) -> Vec<SlotWrite> {
    let mut writes = Vec::new();
    for position in 0..before.len().max(after.len()) {
        match (before.get(position), after.get(position)) {
            (Some(old), Some(new)) if old != new => writes.push(SlotWrite::assign(
                Index::Position(position),
                old.clone(),
                new.clone(),
                false,
            )),
            (Some(old), None) => writes.push(SlotWrite::delete(Index::Position(position), old.clone())),
            // Holes left by growing the array are not writes
            (None, Some(Value::Undefined)) => {}
            (None, Some(new)) => writes.push(SlotWrite::assign(
                Index::Position(position),
                Value::Undefined,
                new.clone(),
                true,
            )),
            _ => {}
        }
    }
    writes
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("id", &self.inner.id)
            .field("items", &*self.inner.items.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeKind;
    use parking_lot::Mutex;

    fn numbers(values: &[i32]) -> Array {
        Array::from_values(values.iter().map(|n| Value::from(*n)))
    }

    fn capture(array: &Array) -> Arc<Mutex<Vec<SlotBatch>>> {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        array.hooks().add(Arc::new(move |batch: &SlotBatch| {
            sink.lock().push(batch.clone());
        }));
        batches
    }

    #[test]
    fn test_splice_reports_shifted_positions() {
        let array = numbers(&[1, 2, 3, 4]);
        let batches = capture(&array);

        let removed = array.splice(1, 1, [Value::from(10), Value::from(11)]);
        assert_eq!(removed, vec![Value::from(2)]);

        let batches = batches.lock();
        assert_eq!(batches.len(), 1);
        let reported: Vec<(usize, Value)> = batches[0]
            .writes
            .iter()
            .map(|w| (w.index.as_position().unwrap(), w.new_value.clone()))
            .collect();
        assert_eq!(
            reported,
            vec![
                (1, Value::from(10)),
                (2, Value::from(11)),
                (3, Value::from(3)),
                (4, Value::from(4)),
            ]
        );
        assert!(batches[0].writes[3].is_new);
    }

    #[test]
    fn test_shrinking_reports_removed_positions_growing_reports_none() {
        let array = numbers(&[1, 2, 3]);
        let batches = capture(&array);

        array.set_len(1);
        array.set_len(4);

        let batches = batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].writes.len(), 2);
        assert!(batches[0]
            .writes
            .iter()
            .all(|w| w.kind == ChangeKind::Delete));
        assert_eq!(array.len(), 4);
    }

    #[test]
    fn test_set_past_end_reports_only_assigned_position() {
        let array = numbers(&[1]);
        let batches = capture(&array);

        array.set(3, 7);
        assert_eq!(array.len(), 4);
        assert_eq!(array.get(2), Value::Undefined);

        let batches = batches.lock();
        assert_eq!(batches[0].writes.len(), 1);
        assert_eq!(batches[0].writes[0].index, Index::Position(3));
    }

    #[test]
    fn test_reverse_of_palindrome_is_silent() {
        let array = numbers(&[1, 2, 1]);
        let batches = capture(&array);
        array.reverse();
        assert!(batches.lock().is_empty());
    }

    #[test]
    fn test_sort_and_fill() {
        let array = numbers(&[3, 1, 2]);
        array.sort_by(|a, b| {
            a.as_number()
                .partial_cmp(&b.as_number())
                .unwrap_or(Ordering::Equal)
        });
        assert_eq!(array.to_vec(), numbers(&[1, 2, 3]).to_vec());

        array.fill(0, 1, 10);
        assert_eq!(array.to_vec(), numbers(&[1, 0, 0]).to_vec());
    }

    #[test]
    fn test_queue_operations() {
        let array = numbers(&[1, 2]);
        assert_eq!(array.push(3), 3);
        assert_eq!(array.shift(), Value::from(1));
        assert_eq!(array.unshift([Value::from(0)]), 3);
        assert_eq!(array.pop(), Value::from(3));
        assert_eq!(array.to_vec(), numbers(&[0, 2]).to_vec());
    }
}
