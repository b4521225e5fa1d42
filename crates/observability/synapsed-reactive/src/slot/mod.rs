//! Slot observers - watch one slot of one container.
//!
//! A slot observer listens to its container's adapter, keeps the slot's last
//! value and emits a record with chain `[(container, index)]` whenever the
//! slot changes. Under a watch rule it also follows the value held in the
//! slot and forwards nested changes with the chain prefixed.

mod date;
mod item;
mod property;
mod proxy;

pub use date::DateKind;
pub use item::{ArrayKind, MapKind, SetKind};
pub use property::RecordKind;
pub(crate) use proxy::SlotProxy;

use crate::container::{Date, DateProperty, Record};
use crate::dispatcher::SlotFilter;
use crate::factory::FactoryInner;
use crate::observer::{Observer, ObserverCore, Observation};
use crate::services::EqualityService;
use crate::types::{ChainSegment, ChangeKind, ChangeRecord, Index, ObserverId, ReactiveError, ReactiveResult};
use crate::value::Value;
use crate::watch_rule::WatchRule;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// What a record member is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Accessor,
    Method,
}

/// Resolved address of a watched slot
#[derive(Clone)]
pub enum SlotBinding {
    Member {
        record: Record,
        name: Arc<str>,
        kind: MemberKind,
    },
    Item {
        container: Value,
        index: Index,
    },
    DateProperty {
        date: Date,
        property: DateProperty,
    },
}

/// How an adapter record affects a bound slot
#[derive(Debug)]
pub(crate) enum SlotEffect {
    Ignore,
    Changed(Value),
    Reread,
}

impl SlotBinding {
    pub fn container(&self) -> Value {
        match self {
            SlotBinding::Member { record, .. } => Value::Record(record.clone()),
            SlotBinding::Item { container, .. } => container.clone(),
            SlotBinding::DateProperty { date, .. } => Value::Date(date.clone()),
        }
    }

    pub fn index(&self) -> Index {
        match self {
            SlotBinding::Member { name, .. } => Index::Name(Arc::clone(name)),
            SlotBinding::Item { index, .. } => index.clone(),
            SlotBinding::DateProperty { property, .. } => Index::name(property.name()),
        }
    }

    pub fn member_kind(&self) -> Option<MemberKind> {
        match self {
            SlotBinding::Member { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Current slot value. Methods are evaluated with no arguments.
    pub fn read(&self) -> Value {
        match self {
            SlotBinding::Member {
                record,
                name,
                kind: MemberKind::Method,
            } => record.invoke_untracked(name, &[]).unwrap_or_default(),
            SlotBinding::Member { record, name, .. } => record.get(name),
            SlotBinding::Item { container, index } => container.read_slot(index),
            SlotBinding::DateProperty { date, property } => Value::Number(date.component(*property)),
        }
    }

    /// Filter the adapter feeding this slot must use
    pub fn adapter_filter(&self) -> SlotFilter {
        match self {
            SlotBinding::DateProperty { .. } => SlotFilter::All,
            _ => SlotFilter::Coarse,
        }
    }

    pub(crate) fn classify(&self, record: &ChangeRecord) -> SlotEffect {
        match self {
            SlotBinding::Member {
                kind: MemberKind::Field,
                name,
                ..
            } => match &record.slot {
                Index::Name(slot) if slot == name => match record.kind {
                    ChangeKind::Invoke => SlotEffect::Reread,
                    _ => SlotEffect::Changed(record.new_value.clone()),
                },
                _ => SlotEffect::Ignore,
            },
            SlotBinding::Member {
                kind: MemberKind::Accessor,
                ..
            } => SlotEffect::Reread,
            SlotBinding::Member {
                kind: MemberKind::Method,
                name,
                ..
            } => match (&record.slot, record.kind) {
                (Index::Name(slot), ChangeKind::Invoke) if slot == name => {
                    SlotEffect::Changed(record.new_value.clone())
                }
                (_, ChangeKind::Invoke) => SlotEffect::Ignore,
                _ => SlotEffect::Reread,
            },
            SlotBinding::Item { index, .. } if &record.slot == index => {
                SlotEffect::Changed(record.new_value.clone())
            }
            SlotBinding::DateProperty { property, .. } => match record.slot.as_name() {
                Some(slot) if slot == property.name() => SlotEffect::Changed(record.new_value.clone()),
                _ => SlotEffect::Ignore,
            },
            SlotBinding::Item { .. } => SlotEffect::Ignore,
        }
    }

    /// Whether successive values compare with the equality service rather
    /// than by identity
    fn compares_structurally(&self) -> bool {
        matches!(
            self,
            SlotBinding::Member {
                kind: MemberKind::Accessor | MemberKind::Method,
                ..
            }
        )
    }
}

impl fmt::Debug for SlotBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotBinding")
            .field("container", &self.container())
            .field("index", &self.index())
            .field("member_kind", &self.member_kind())
            .finish()
    }
}

/// Observer of a single slot, shared per (container, index, rule)
pub struct SlotObserver {
    core: ObserverCore,
    binding: SlotBinding,
    rule: Option<Arc<WatchRule>>,
    factory: Weak<FactoryInner>,
    equality: Arc<dyn EqualityService>,
    source: Mutex<Option<Observation>>,
    proxy: Mutex<Option<Arc<SlotProxy>>>,
    last: Mutex<Value>,
}

impl SlotObserver {
    pub(crate) fn new(
        id: ObserverId,
        binding: SlotBinding,
        rule: Option<Arc<WatchRule>>,
        factory: Weak<FactoryInner>,
        equality: Arc<dyn EqualityService>,
    ) -> Self {
        let initial = binding.read();
        Self {
            core: ObserverCore::new(id, binding.container(), Some(binding.index()), initial.clone()),
            binding,
            rule,
            factory,
            equality,
            source: Mutex::new(None),
            proxy: Mutex::new(None),
            last: Mutex::new(initial),
        }
    }

    pub fn binding(&self) -> &SlotBinding {
        &self.binding
    }

    pub fn rule(&self) -> Option<&Arc<WatchRule>> {
        self.rule.as_ref()
    }

    fn on_source_record(&self, record: &ChangeRecord) {
        let value = match self.binding.classify(record) {
            SlotEffect::Ignore => return,
            SlotEffect::Changed(value) => value,
            SlotEffect::Reread => self.binding.read(),
        };

        {
            let mut last = self.last.lock();
            let unchanged = if self.binding.compares_structurally() {
                self.equality.is_equal(&last, &value)
            } else {
                *last == value
            };
            if unchanged {
                return;
            }
            *last = value.clone();
        }

        self.rebind(&value);

        let container = self.binding.container();
        let index = self.binding.index();
        self.core.emit(ChangeRecord {
            chain: vec![ChainSegment::new(container.clone(), index.clone())],
            slot: index,
            new_value: value,
            is_new: record.is_new,
            target: container,
            kind: record.kind,
            mutation: record.mutation,
        });
    }

    fn rebind(&self, value: &Value) {
        let proxy = self.proxy.lock().clone();
        if let Some(proxy) = proxy {
            if let Err(err) = proxy.bind(value) {
                if let Some(factory) = self.factory.upgrade() {
                    factory.report("Failed to follow nested value", &err);
                }
            }
        }
    }
}

impl Observer for SlotObserver {
    fn core(&self) -> &ObserverCore {
        &self.core
    }

    fn attach(self: Arc<Self>) -> ReactiveResult<()> {
        let factory = self
            .factory
            .upgrade()
            .ok_or_else(|| ReactiveError::Disposed("observer factory".to_string()))?;

        let source = factory.adapter(&self.binding.container(), self.binding.adapter_filter())?;
        let weak = Arc::downgrade(&self);
        source.subscribe_live(Arc::new(move |record: &ChangeRecord| {
            if let Some(observer) = weak.upgrade() {
                observer.on_source_record(record);
            }
        }));
        source.init();
        *self.source.lock() = Some(source);

        let weak = Arc::downgrade(&self);
        let proxy = SlotProxy::new(
            self.binding.container(),
            self.binding.index(),
            self.rule.clone(),
            true,
            Weak::clone(&self.factory),
            Arc::new(move |record: &ChangeRecord| {
                if let Some(observer) = weak.upgrade() {
                    observer.core.emit(record.clone());
                }
            }),
        );
        *self.proxy.lock() = Some(Arc::clone(&proxy));
        let current = self.last.lock().clone();
        proxy.bind(&current)
    }

    fn current_value(&self) -> Value {
        self.last.lock().clone()
    }

    fn refresh(&self, index: Option<&Index>) {
        if index.is_some_and(|index| *index != self.binding.index()) {
            return;
        }
        let value = self.binding.read();
        *self.last.lock() = value.clone();
        self.rebind(&value);
    }

    fn teardown(&self) {
        if !self.core.mark_disposed() {
            return;
        }
        if let Some(proxy) = self.proxy.lock().take() {
            proxy.release();
        }
        if let Some(source) = self.source.lock().take() {
            source.dispose();
        }
        tracing::trace!(observer = %self.core.id(), index = %self.binding.index(), "Slot observer torn down");
    }
}

impl fmt::Debug for SlotObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotObserver")
            .field("binding", &self.binding)
            .field("rule", &self.rule.as_ref().map(|rule| rule.id()))
            .field("last", &*self.last.lock())
            .finish()
    }
}

pub(crate) fn invalid_index(value: &Value, index: &Index) -> ReactiveError {
    ReactiveError::InvalidIndex {
        index: index.to_string(),
        kind: value.kind(),
    }
}
