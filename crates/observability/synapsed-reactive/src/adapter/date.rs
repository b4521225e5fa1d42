//! Date adapter - reports setter calls either whole or per virtual property

use crate::container::{component_at, Date, DateMutation, DateProperty, HookId};
use crate::dispatcher::SlotFilter;
use crate::observer::{Observer, ObserverCore};
use crate::types::{ChainSegment, ChangeKind, ChangeRecord, Index, ObserverId, ReactiveResult};
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;

/// Adapter for dates.
///
/// With a coarse filter each setter call produces a single record named after
/// the property that was set, carrying the whole date. Otherwise every
/// virtual property whose value changed is reported with its new number.
pub struct DateAdapter {
    core: ObserverCore,
    date: Date,
    filter: SlotFilter,
    hook: Mutex<Option<HookId>>,
}

impl DateAdapter {
    pub fn new(id: ObserverId, date: Date, filter: SlotFilter) -> Self {
        let target = Value::Date(date.clone());
        Self {
            core: ObserverCore::new(id, target.clone(), None, target),
            date,
            filter,
            hook: Mutex::new(None),
        }
    }

    fn on_mutation(&self, mutation: &DateMutation) {
        let target = Value::Date(self.date.clone());
        let record = |property: DateProperty, new_value: Value| {
            let slot = Index::name(property.name());
            ChangeRecord {
                chain: vec![ChainSegment::new(target.clone(), slot.clone())],
                slot,
                new_value,
                is_new: false,
                target: target.clone(),
                kind: ChangeKind::Assign,
                mutation: mutation.mutation,
            }
        };

        if let SlotFilter::Coarse = self.filter {
            self.core.emit(record(mutation.property, target.clone()));
            return;
        }

        for property in DateProperty::ALL {
            let before = component_at(mutation.before, mutation.offset_seconds, property);
            let after = component_at(mutation.after, mutation.offset_seconds, property);
            if before == after || (before.is_nan() && after.is_nan()) {
                continue;
            }
            if let SlotFilter::Rule(rule) = &self.filter {
                if !rule.test(&Index::name(property.name()), &target) {
                    continue;
                }
            }
            self.core.emit(record(property, Value::Number(after)));
        }
    }
}

impl Observer for DateAdapter {
    fn core(&self) -> &ObserverCore {
        &self.core
    }

    fn attach(self: Arc<Self>) -> ReactiveResult<()> {
        let weak = Arc::downgrade(&self);
        let hook = self.date.hooks().add(Arc::new(move |mutation: &DateMutation| {
            if let Some(adapter) = weak.upgrade() {
                adapter.on_mutation(mutation);
            }
        }));
        *self.hook.lock() = Some(hook);
        Ok(())
    }

    fn current_value(&self) -> Value {
        Value::Date(self.date.clone())
    }

    fn teardown(&self) {
        if !self.core.mark_disposed() {
            return;
        }
        if let Some(hook) = self.hook.lock().take() {
            self.date.hooks().remove(hook);
        }
    }
}
