//! Container adapters - turn container hooks into change records.
//!
//! One adapter exists per (container, mode). It installs a hook when it is
//! attached and removes it on teardown, after which late writes are ignored.

mod async_value;
mod date;

pub use async_value::{AsyncAdapter, DeferredKind, StreamKind};
pub use date::DateAdapter;

use crate::container::{HookId, SlotBatch, SlotContainer};
use crate::observer::{Observer, ObserverCore};
use crate::types::{ChainSegment, ChangeRecord, ObserverId, ReactiveResult};
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// How records from a slot container describe their position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainShape {
    /// One `(container, slot)` segment
    Segment,
    /// Empty chain; the slot alone identifies the change (sets)
    Flat,
}

/// Adapter for records, arrays, maps and sets
pub struct SlotAdapter<C: SlotContainer> {
    core: ObserverCore,
    container: C,
    shape: ChainShape,
    hook: Mutex<Option<HookId>>,
}

impl<C: SlotContainer> SlotAdapter<C> {
    pub fn new(id: ObserverId, container: C, shape: ChainShape) -> Self {
        let target = container.to_value();
        Self {
            core: ObserverCore::new(id, target.clone(), None, target),
            container,
            shape,
            hook: Mutex::new(None),
        }
    }

    fn on_batch(&self, batch: &SlotBatch) {
        let target = self.container.to_value();
        for write in &batch.writes {
            let chain = match self.shape {
                ChainShape::Segment => vec![ChainSegment::new(target.clone(), write.index.clone())],
                ChainShape::Flat => Vec::new(),
            };
            self.core.emit(ChangeRecord {
                chain,
                slot: write.index.clone(),
                new_value: write.new_value.clone(),
                is_new: write.is_new,
                target: target.clone(),
                kind: write.kind,
                mutation: batch.mutation,
            });
        }
    }
}

impl<C: SlotContainer> Observer for SlotAdapter<C> {
    fn core(&self) -> &ObserverCore {
        &self.core
    }

    fn attach(self: Arc<Self>) -> ReactiveResult<()> {
        let weak = Arc::downgrade(&self);
        let hook = self.container.add_hook(Arc::new(move |batch: &SlotBatch| {
            if let Some(adapter) = weak.upgrade() {
                adapter.on_batch(batch);
            }
        }));
        *self.hook.lock() = Some(hook);
        tracing::trace!(container = %self.container.id(), "Slot adapter attached");
        Ok(())
    }

    fn current_value(&self) -> Value {
        self.container.to_value()
    }

    fn teardown(&self) {
        if !self.core.mark_disposed() {
            return;
        }
        if let Some(hook) = self.hook.lock().take() {
            self.container.remove_hook(hook);
        }
        tracing::trace!(container = %self.container.id(), "Slot adapter detached");
    }
}

impl<C: SlotContainer> fmt::Debug for SlotAdapter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotAdapter")
            .field("core", &self.core)
            .field("shape", &self.shape)
            .finish()
    }
}
