//! Async adapters - surface settled deferred values and stream emissions as slot "value"

use crate::container::{AsyncSource, HookId, Settlement};
use crate::dispatcher::{ContainerKind, SlotFilter};
use crate::observer::{Observer, ObserverCore};
use crate::services::IdGenerator;
use crate::slot::SlotBinding;
use crate::types::{ChangeKind, ChangeRecord, Index, ObserverId, ReactiveError, ReactiveResult};
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;

/// Slot name async adapters report under
pub const VALUE_SLOT: &str = "value";

/// Adapter for deferred values and streams. Keeps the last record so a late
/// subscriber still sees a value that settled before it subscribed.
pub struct AsyncAdapter<S: AsyncSource> {
    core: ObserverCore,
    source: S,
    hook: Mutex<Option<HookId>>,
}

impl<S: AsyncSource> AsyncAdapter<S> {
    pub fn new(id: ObserverId, source: S) -> Self {
        let target = source.to_value();
        Self {
            core: ObserverCore::new(id, target.clone(), None, target).with_replay(),
            source,
            hook: Mutex::new(None),
        }
    }

    fn on_settle(&self, settlement: &Settlement) {
        if self.core.is_disposed() {
            tracing::trace!(source = %self.source.id(), "Settlement after teardown ignored");
            return;
        }
        self.core.emit(ChangeRecord {
            chain: Vec::new(),
            slot: Index::name(VALUE_SLOT),
            new_value: settlement.value.clone(),
            is_new: false,
            target: self.source.to_value(),
            kind: ChangeKind::Settled,
            mutation: settlement.mutation,
        });
    }
}

impl<S: AsyncSource> Observer for AsyncAdapter<S> {
    fn core(&self) -> &ObserverCore {
        &self.core
    }

    fn attach(self: Arc<Self>) -> ReactiveResult<()> {
        let weak = Arc::downgrade(&self);
        let hook = self.source.add_hook(Arc::new(move |settlement: &Settlement| {
            if let Some(adapter) = weak.upgrade() {
                adapter.on_settle(settlement);
            }
        }));
        *self.hook.lock() = Some(hook);

        if let Some(value) = self.source.latest() {
            self.on_settle(&Settlement {
                mutation: crate::types::MutationId::next(),
                value,
            });
        }
        Ok(())
    }

    /// The settled value, `Undefined` while pending
    fn current_value(&self) -> Value {
        self.source.latest().unwrap_or_default()
    }

    fn teardown(&self) {
        if !self.core.mark_disposed() {
            return;
        }
        if let Some(hook) = self.hook.lock().take() {
            self.source.remove_hook(hook);
        }
    }
}

macro_rules! async_kind {
    ($kind:ident, $ty:ident, $name:literal, $priority:literal) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $kind;

        impl ContainerKind for $kind {
            fn name(&self) -> &'static str {
                $name
            }

            fn priority(&self) -> i32 {
                $priority
            }

            fn applies(&self, value: &Value) -> bool {
                matches!(value, Value::$ty(_))
            }

            fn create_adapter(
                &self,
                value: &Value,
                _filter: SlotFilter,
                ids: &dyn IdGenerator,
            ) -> ReactiveResult<Arc<dyn Observer>> {
                match value {
                    Value::$ty(source) => Ok(Arc::new(AsyncAdapter::new(ids.next_id(), source.clone()))),
                    other => Err(ReactiveError::NoAdapter { kind: other.kind() }),
                }
            }

            fn bind_slot(&self, value: &Value, _index: &Index) -> ReactiveResult<SlotBinding> {
                Err(ReactiveError::NoAddressableSlots { kind: value.kind() })
            }
        }
    };
}

async_kind!(DeferredKind, Deferred, "deferred", 70);
async_kind!(StreamKind, Stream, "stream", 60);
