//! Observer factory - shared registries of adapters, observer groups and slot observers.
//!
//! Every request for an observer goes through a reference-counted registry, so
//! two callers watching the same thing share one observer and the observer is
//! torn down when the last lease is disposed.

use crate::dispatcher::{ContainerKind, Dispatcher, SlotFilter};
use crate::observer::{NullObserver, Observation, Observer, ObserverGroup};
use crate::registry::{GroupKey, GroupedRegistry, RegistryPolicy};
use crate::services::{EqualityService, ErrorEntry, IdGenerator, Services};
use crate::slot::{SlotBinding, SlotObserver};
use crate::types::{ContainerId, Index, ReactiveError, ReactiveResult, WatchRuleId};
use crate::value::Value;
use crate::watch_rule::WatchRule;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

/// Adapter registry member: which slots the adapter reports
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AdapterMode {
    Coarse,
    All,
    Rule(WatchRuleId),
}

impl From<&SlotFilter> for AdapterMode {
    fn from(filter: &SlotFilter) -> Self {
        match filter {
            SlotFilter::Coarse => AdapterMode::Coarse,
            SlotFilter::All => AdapterMode::All,
            SlotFilter::Rule(rule) => AdapterMode::Rule(rule.id()),
        }
    }
}

/// Slot registry member
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotMember {
    pub index: Index,
    pub rule: Option<WatchRuleId>,
}

pub(crate) struct AdapterRequest {
    container: ContainerId,
    value: Value,
    filter: SlotFilter,
    kind: Arc<dyn ContainerKind>,
}

struct AdapterPolicy {
    ids: Arc<dyn IdGenerator>,
}

impl RegistryPolicy for AdapterPolicy {
    type Key = AdapterRequest;
    type Id = GroupKey<ContainerId, AdapterMode>;
    type Instance = Arc<dyn Observer>;

    fn instance_id(&self, key: &AdapterRequest) -> Self::Id {
        GroupKey::new(key.container, AdapterMode::from(&key.filter))
    }

    fn create_instance(&self, key: AdapterRequest, _id: &Self::Id) -> ReactiveResult<Self::Instance> {
        key.kind.create_adapter(&key.value, key.filter, self.ids.as_ref())
    }

    fn on_registered(&self, _id: &Self::Id, instance: &Self::Instance) -> ReactiveResult<()> {
        Arc::clone(instance).attach()
    }

    fn dispose_instance(&self, id: &Self::Id, instance: Self::Instance) {
        tracing::trace!(container = %id.group, mode = ?id.member, "Disposing adapter");
        instance.teardown();
    }
}

pub(crate) struct GroupRequest {
    container: ContainerId,
    value: Value,
    rule: Option<Arc<WatchRule>>,
    observable: bool,
}

struct GroupPolicy {
    ids: Arc<dyn IdGenerator>,
    factory: Weak<FactoryInner>,
}

impl RegistryPolicy for GroupPolicy {
    type Key = GroupRequest;
    type Id = GroupKey<ContainerId, Option<WatchRuleId>>;
    type Instance = Arc<dyn Observer>;

    fn instance_id(&self, key: &GroupRequest) -> Self::Id {
        GroupKey::new(key.container, key.rule.as_ref().map(|rule| rule.id()))
    }

    fn create_instance(&self, key: GroupRequest, _id: &Self::Id) -> ReactiveResult<Self::Instance> {
        if !key.observable {
            return Ok(Arc::new(NullObserver::new(self.ids.next_id(), key.value)));
        }
        Ok(Arc::new(ObserverGroup::new(
            self.ids.next_id(),
            key.value,
            key.rule,
            Weak::clone(&self.factory),
        )))
    }

    fn on_registered(&self, _id: &Self::Id, instance: &Self::Instance) -> ReactiveResult<()> {
        Arc::clone(instance).attach()
    }

    fn dispose_instance(&self, _id: &Self::Id, instance: Self::Instance) {
        instance.teardown();
    }
}

pub(crate) struct SlotRequest {
    container: ContainerId,
    binding: SlotBinding,
    rule: Option<Arc<WatchRule>>,
}

struct SlotPolicy {
    ids: Arc<dyn IdGenerator>,
    equality: Arc<dyn EqualityService>,
    factory: Weak<FactoryInner>,
}

impl RegistryPolicy for SlotPolicy {
    type Key = SlotRequest;
    type Id = GroupKey<ContainerId, SlotMember>;
    type Instance = Arc<SlotObserver>;

    fn instance_id(&self, key: &SlotRequest) -> Self::Id {
        GroupKey::new(
            key.container,
            SlotMember {
                index: key.binding.index(),
                rule: key.rule.as_ref().map(|rule| rule.id()),
            },
        )
    }

    fn create_instance(&self, key: SlotRequest, _id: &Self::Id) -> ReactiveResult<Self::Instance> {
        Ok(Arc::new(SlotObserver::new(
            self.ids.next_id(),
            key.binding,
            key.rule,
            Weak::clone(&self.factory),
            Arc::clone(&self.equality),
        )))
    }

    fn on_registered(&self, _id: &Self::Id, instance: &Self::Instance) -> ReactiveResult<()> {
        Arc::clone(instance).attach()
    }

    fn dispose_instance(&self, _id: &Self::Id, instance: Self::Instance) {
        instance.teardown();
    }
}

pub(crate) struct FactoryInner {
    services: Services,
    dispatcher: RwLock<Dispatcher>,
    adapters: GroupedRegistry<AdapterPolicy, ContainerId, AdapterMode>,
    groups: GroupedRegistry<GroupPolicy, ContainerId, Option<WatchRuleId>>,
    slots: GroupedRegistry<SlotPolicy, ContainerId, SlotMember>,
    weak_self: Weak<FactoryInner>,
}

impl FactoryInner {
    fn resolve(&self, value: &Value) -> Option<Arc<dyn ContainerKind>> {
        self.dispatcher.read().resolve(value)
    }

    pub(crate) fn report(&self, message: &str, err: &ReactiveError) {
        self.services
            .errors
            .add(ErrorEntry::new(message).with_exception(err));
    }

    pub(crate) fn adapter(&self, value: &Value, filter: SlotFilter) -> ReactiveResult<Observation> {
        let container = value
            .container_id()
            .ok_or(ReactiveError::NotAContainer { kind: value.kind() })?;
        let kind = self
            .resolve(value)
            .ok_or(ReactiveError::NoAdapter { kind: value.kind() })?;
        let filter = if kind.filters_slots() {
            filter
        } else {
            SlotFilter::Coarse
        };

        let registered = self.adapters.create(AdapterRequest {
            container,
            value: value.clone(),
            filter,
            kind,
        })?;
        let weak = Weak::clone(&self.weak_self);
        let id = registered.id;
        Ok(Observation::new(
            registered.instance,
            Box::new(move || {
                if let Some(factory) = weak.upgrade() {
                    factory.adapters.release(&id);
                }
            }),
        ))
    }

    pub(crate) fn group(&self, value: &Value, rule: Option<Arc<WatchRule>>) -> ReactiveResult<Observation> {
        let Some(container) = value.container_id() else {
            let null = NullObserver::new(self.services.ids.next_id(), value.clone());
            return Ok(Observation::new(Arc::new(null), Box::new(|| {})));
        };
        let observable = self.resolve(value).is_some();

        let registered = self.groups.create(GroupRequest {
            container,
            value: value.clone(),
            rule,
            observable,
        })?;
        let weak = Weak::clone(&self.weak_self);
        let id = registered.id;
        Ok(Observation::new(
            registered.instance,
            Box::new(move || {
                if let Some(factory) = weak.upgrade() {
                    factory.groups.release(&id);
                }
            }),
        ))
    }

    pub(crate) fn slot(
        &self,
        container: &Value,
        index: &Index,
        rule: Option<Arc<WatchRule>>,
    ) -> ReactiveResult<Observation> {
        let id = container
            .container_id()
            .ok_or(ReactiveError::NotAContainer { kind: container.kind() })?;
        let kind = self
            .resolve(container)
            .ok_or(ReactiveError::NoAdapter { kind: container.kind() })?;
        let binding = kind.bind_slot(container, index)?;

        let registered = self.slots.create(SlotRequest {
            container: id,
            binding,
            rule,
        })?;
        let weak = Weak::clone(&self.weak_self);
        let id = registered.id;
        Ok(Observation::new(
            registered.instance,
            Box::new(move || {
                if let Some(factory) = weak.upgrade() {
                    factory.slots.release(&id);
                }
            }),
        ))
    }

    fn refresh_slot(&self, container: &Value, index: &Index) {
        let Some(id) = container.container_id() else {
            return;
        };
        for (member, observer) in self.slots.members_of(&id) {
            if member.index == *index {
                observer.refresh(Some(index));
            }
        }
        for (_, group) in self.groups.members_of(&id) {
            group.refresh(Some(index));
        }
    }
}

/// Creates and shares observers
#[derive(Clone)]
pub struct ObserverFactory {
    inner: Arc<FactoryInner>,
}

impl ObserverFactory {
    pub fn new(services: Services) -> Self {
        Self::with_dispatcher(services, Dispatcher::default())
    }

    pub fn with_dispatcher(services: Services, dispatcher: Dispatcher) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<FactoryInner>| FactoryInner {
            adapters: GroupedRegistry::new(AdapterPolicy {
                ids: Arc::clone(&services.ids),
            }),
            groups: GroupedRegistry::new(GroupPolicy {
                ids: Arc::clone(&services.ids),
                factory: Weak::clone(weak),
            }),
            slots: GroupedRegistry::new(SlotPolicy {
                ids: Arc::clone(&services.ids),
                equality: Arc::clone(&services.equality),
                factory: Weak::clone(weak),
            }),
            dispatcher: RwLock::new(dispatcher),
            services,
            weak_self: Weak::clone(weak),
        });
        Self { inner }
    }

    pub fn services(&self) -> &Services {
        &self.inner.services
    }

    /// Adds a container kind ahead of any registered kind with lower priority
    pub fn register_kind(&self, kind: Arc<dyn ContainerKind>) {
        self.inner.dispatcher.write().register(kind);
    }

    /// Coarse adapter for a container
    pub fn observe(&self, value: &Value) -> ReactiveResult<Observation> {
        self.inner.adapter(value, SlotFilter::Coarse)
    }

    pub fn observe_filtered(&self, value: &Value, filter: SlotFilter) -> ReactiveResult<Observation> {
        self.inner.adapter(value, filter)
    }

    /// Group for a container and every nested container `rule` follows
    pub fn observe_group(&self, value: &Value, rule: Option<Arc<WatchRule>>) -> ReactiveResult<Observation> {
        self.inner.group(value, rule)
    }

    /// Observer for one slot
    pub fn observe_slot(
        &self,
        container: &Value,
        index: impl Into<Index>,
        rule: Option<Arc<WatchRule>>,
    ) -> ReactiveResult<Observation> {
        self.inner.slot(container, &index.into(), rule)
    }

    /// Re-reads a slot in every observer that watches it, after an untracked write
    pub fn refresh_slot(&self, container: &Value, index: &Index) {
        self.inner.refresh_slot(container, index);
    }

    pub fn adapter_count(&self) -> usize {
        self.inner.adapters.len()
    }

    pub fn group_count(&self) -> usize {
        self.inner.groups.len()
    }

    pub fn slot_observer_count(&self) -> usize {
        self.inner.slots.len()
    }

    /// Outstanding leases on the slot observer for `(container, index, rule)`
    pub fn slot_ref_count(&self, container: &Value, index: &Index, rule: Option<&WatchRule>) -> u32 {
        let Some(id) = container.container_id() else {
            return 0;
        };
        self.inner.slots.ref_count(&GroupKey::new(
            id,
            SlotMember {
                index: index.clone(),
                rule: rule.map(|rule| rule.id()),
            },
        ))
    }
}

impl Default for ObserverFactory {
    fn default() -> Self {
        Self::new(Services::default())
    }
}

impl fmt::Debug for ObserverFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverFactory")
            .field("adapters", &self.adapter_count())
            .field("groups", &self.group_count())
            .field("slots", &self.slot_observer_count())
            .finish()
    }
}
