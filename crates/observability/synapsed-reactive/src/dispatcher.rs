//! Container-kind dispatcher - picks the adapter and slot binding for a value

use crate::adapter::{DeferredKind, StreamKind};
use crate::observer::Observer;
use crate::services::IdGenerator;
use crate::slot::{ArrayKind, DateKind, MapKind, RecordKind, SetKind, SlotBinding};
use crate::types::{Index, ReactiveResult};
use crate::value::Value;
use crate::watch_rule::WatchRule;
use std::fmt;
use std::sync::Arc;

/// Which slots an adapter reports individually
#[derive(Clone, Default)]
pub enum SlotFilter {
    /// One record per mutation
    #[default]
    Coarse,
    /// Every changed slot
    All,
    /// Changed slots accepted by the rule
    Rule(Arc<WatchRule>),
}

impl fmt::Debug for SlotFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotFilter::Coarse => f.write_str("Coarse"),
            SlotFilter::All => f.write_str("All"),
            SlotFilter::Rule(rule) => f.debug_tuple("Rule").field(&rule.id()).finish(),
        }
    }
}

/// Knows how to observe one kind of container
pub trait ContainerKind: Send + Sync {
    fn name(&self) -> &'static str;

    /// Higher priority kinds are consulted first
    fn priority(&self) -> i32 {
        0
    }

    fn applies(&self, value: &Value) -> bool;

    /// Whether adapters of this kind honour a `SlotFilter` other than `Coarse`
    fn filters_slots(&self) -> bool {
        false
    }

    fn create_adapter(
        &self,
        value: &Value,
        filter: SlotFilter,
        ids: &dyn IdGenerator,
    ) -> ReactiveResult<Arc<dyn Observer>>;

    fn bind_slot(&self, value: &Value, index: &Index) -> ReactiveResult<SlotBinding>;
}

/// Ordered list of container kinds
pub struct Dispatcher {
    kinds: Vec<Arc<dyn ContainerKind>>,
}

impl Dispatcher {
    pub fn empty() -> Self {
        Self { kinds: Vec::new() }
    }

    /// Adds a kind. Among equal priorities, earlier registrations win.
    pub fn register(&mut self, kind: Arc<dyn ContainerKind>) {
        let position = self
            .kinds
            .iter()
            .position(|existing| existing.priority() < kind.priority())
            .unwrap_or(self.kinds.len());
        tracing::debug!(kind = kind.name(), priority = kind.priority(), "Container kind registered");
        self.kinds.insert(position, kind);
    }

    pub fn resolve(&self, value: &Value) -> Option<Arc<dyn ContainerKind>> {
        self.kinds.iter().find(|kind| kind.applies(value)).cloned()
    }

    pub fn kind_names(&self) -> Vec<&'static str> {
        self.kinds.iter().map(|kind| kind.name()).collect()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        let mut dispatcher = Self::empty();
        dispatcher.register(Arc::new(RecordKind));
        dispatcher.register(Arc::new(DateKind));
        dispatcher.register(Arc::new(ArrayKind));
        dispatcher.register(Arc::new(DeferredKind));
        dispatcher.register(Arc::new(StreamKind));
        dispatcher.register(Arc::new(MapKind));
        dispatcher.register(Arc::new(SetKind));
        dispatcher
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kinds", &self.kind_names())
            .finish()
    }
}
