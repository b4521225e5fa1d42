//! State manager - watched slot state, change cycles and rebinding.
//!
//! The manager watches `(context, index)` pairs through slot observers. Each
//! record an observer delivers is reduced to the segments of its chain that
//! are watched; those segments get fresh snapshots and one `Changed` event
//! each, bracketed by cycle markers. When a watched slot is replaced by
//! another container, every state and watch registered under the old
//! container moves to the new one.

use crate::config::ReactiveConfig;
use crate::container;
use crate::factory::ObserverFactory;
use crate::object_state::{ObjectStateManager, WatchedState};
use crate::observer::Observation;
use crate::services::{ErrorEntry, Services, TracingErrorLog};
use crate::types::{
    ChainSegment, ChangeRecord, ContainerId, Index, ListenerId, MutationId, ReactiveError,
    ReactiveResult, WatchRuleId,
};
use crate::value::Value;
use crate::watch_rule::WatchRule;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

/// Mutations whose handled segments are remembered for de-duplication
const HANDLED_MUTATIONS: usize = 32;

/// A watched slot whose value changed
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub context: Value,
    pub index: Index,
    pub old_value: Value,
    pub new_value: Value,
    /// Path from the outermost container that reported the change down to
    /// this slot
    pub chain: Vec<ChainSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    CycleStarted,
    Changed(StateChange),
    CycleEnded,
}

impl StateEvent {
    pub fn as_change(&self) -> Option<&StateChange> {
        match self {
            StateEvent::Changed(change) => Some(change),
            _ => None,
        }
    }
}

/// Callback receiving state events. Errors and panics are logged as fatal and
/// do not interrupt delivery to other listeners.
pub type StateListener = Arc<dyn Fn(&StateEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RegistrationKey {
    context: ContainerId,
    index: Index,
    rule: Option<WatchRuleId>,
}

struct Registration {
    rule: Option<Arc<WatchRule>>,
    observation: Observation,
    count: u32,
}

/// A state moving from a replaced container to its replacement
#[derive(Debug)]
struct Rebind {
    old_context: Value,
    new_context: Value,
    index: Index,
    old_value: Value,
    new_value: Value,
    changed: bool,
    watched: bool,
}

type EmittedSet = HashSet<(ContainerId, Index)>;

struct StateInner {
    config: ReactiveConfig,
    factory: ObserverFactory,
    states: ObjectStateManager,
    registrations: Mutex<IndexMap<RegistrationKey, Registration>>,
    /// Value a slot held before a still pending deferred or stream replaced it
    pending: Mutex<HashMap<ContainerId, Value>>,
    handled: Mutex<VecDeque<(MutationId, EmittedSet)>>,
    listeners: Mutex<Vec<(ListenerId, StateListener)>>,
    next_listener: AtomicU64,
    events: broadcast::Sender<StateEvent>,
    cycle_depth: AtomicUsize,
    /// Cycle kept open until the running hook delivery returns
    delivery_cycle: AtomicBool,
    weak_self: Weak<StateInner>,
}

/// Effective value of a slot: what a deferred or stream produced, or the
/// source itself while nothing has been produced yet
fn effective(value: Value) -> Value {
    if value.is_async() {
        value.settled().unwrap_or(value)
    } else {
        value
    }
}

fn is_pending(value: &Value) -> bool {
    value.is_async() && value.settled().is_none()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "listener panicked".to_string()
    }
}

struct CycleGuard<'a> {
    inner: &'a StateInner,
}

impl<'a> CycleGuard<'a> {
    fn open(inner: &'a StateInner) -> Self {
        inner.open_cycle();
        Self { inner }
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.inner.close_cycle();
    }
}

impl StateInner {
    fn services(&self) -> &Services {
        self.factory.services()
    }

    fn is_equal(&self, a: &Value, b: &Value) -> bool {
        self.services().equality.is_equal(a, b)
    }

    fn report(&self, message: &str, err: &ReactiveError) {
        self.services()
            .errors
            .add(ErrorEntry::new(message).with_exception(err));
    }

    fn listen(&self, observation: &Observation) {
        let weak = Weak::clone(&self.weak_self);
        observation.subscribe_live(Arc::new(move |record: &ChangeRecord| {
            if let Some(inner) = weak.upgrade() {
                inner.on_change(record);
            }
        }));
        observation.init();
    }

    fn watch(&self, context: &Value, index: Index, rule: Option<Arc<WatchRule>>) -> ReactiveResult<Value> {
        let container = context
            .container_id()
            .ok_or(ReactiveError::NotAContainer { kind: context.kind() })?;
        let key = RegistrationKey {
            context: container,
            index: index.clone(),
            rule: rule.as_ref().map(|rule| rule.id()),
        };

        if self.registrations.lock().contains_key(&key) {
            let current = effective(context.read_slot(&index));
            self.states.acquire(context, &index, &current, true)?;
            if let Some(registration) = self.registrations.lock().get_mut(&key) {
                registration.count += 1;
            }
            return Ok(self
                .states
                .get(context, &index)
                .map(|state| state.value)
                .unwrap_or(current));
        }

        let observation = self.factory.observe_slot(context, index.clone(), rule.clone())?;
        let value = effective(observation.current_value());
        let created = match self.states.acquire(context, &index, &value, true) {
            Ok(created) => created,
            Err(err) => {
                observation.dispose();
                return Err(err);
            }
        };
        self.listen(&observation);
        self.registrations.lock().insert(
            key,
            Registration {
                rule,
                observation,
                count: 1,
            },
        );
        tracing::debug!(context = %container, index = %index, created, "Watching state");

        if created && self.config.emit_initial_value {
            self.emit_cycle(vec![StateChange {
                context: context.clone(),
                index: index.clone(),
                old_value: Value::Undefined,
                new_value: value.clone(),
                chain: vec![ChainSegment::new(context.clone(), index.clone())],
            }]);
        }

        Ok(self
            .states
            .get(context, &index)
            .map(|state| state.value)
            .unwrap_or(value))
    }

    fn release(&self, context: &Value, index: &Index, rule: Option<WatchRuleId>) -> bool {
        let Some(container) = context.container_id() else {
            return false;
        };
        let key = RegistrationKey {
            context: container,
            index: index.clone(),
            rule,
        };
        let removed = {
            let mut registrations = self.registrations.lock();
            let Some(registration) = registrations.get_mut(&key) else {
                return false;
            };
            registration.count = registration.count.saturating_sub(1);
            if registration.count > 0 {
                None
            } else {
                registrations.shift_remove(&key)
            }
        };
        let parked = self
            .states
            .get(context, index)
            .and_then(|state| state.value.container_id().filter(|_| state.value.is_async()));
        if self.states.release(context, index) == Some(0) {
            if let Some(source) = parked {
                self.pending.lock().remove(&source);
            }
        }
        if let Some(registration) = removed {
            registration.observation.dispose();
            tracing::debug!(context = %container, index = %index, "Released state");
        }
        true
    }

    fn set(&self, context: &Value, index: Index, value: Value) -> ReactiveResult<()> {
        let container = context
            .container_id()
            .ok_or(ReactiveError::NotAContainer { kind: context.kind() })?;
        let previous = self.states.get(context, &index);
        let (old_value, old_copy) = match &previous {
            Some(state) => (state.value.clone(), state.value_copy.clone()),
            None => {
                let current = effective(context.read_slot(&index));
                (current.clone(), current)
            }
        };

        context.put_untracked(&index, value.clone())?;
        self.factory.refresh_slot(context, &index);

        let new_value = effective(value);
        let base = self.rebind_base(&old_value);
        let mut changes = Vec::new();
        let mut emitted = EmittedSet::new();
        let rebound = self.rebind(&base, &new_value, &mut changes, &mut emitted);
        if previous.is_some() {
            self.states.set(context, &index, &new_value, true)?;
        }
        if !self.is_equal(&old_copy, &new_value) && emitted.insert((container, index.clone())) {
            changes.push(StateChange {
                context: context.clone(),
                index: index.clone(),
                old_value,
                new_value,
                chain: vec![ChainSegment::new(context.clone(), index)],
            });
        }
        self.emit_cycle(changes);
        rebound
    }

    /// Container whose nested states a slot replacement moves: the value the
    /// slot held before a still pending deferred or stream took its place,
    /// otherwise `value` itself
    fn rebind_base(&self, value: &Value) -> Value {
        value
            .container_id()
            .filter(|_| value.is_async())
            .and_then(|source| self.pending.lock().remove(&source))
            .unwrap_or_else(|| value.clone())
    }

    /// Moves every state and watch nested under `old` onto `new`, queueing a
    /// change for each moved state whose value differs
    fn rebind(
        &self,
        old: &Value,
        new: &Value,
        changes: &mut Vec<StateChange>,
        emitted: &mut EmittedSet,
    ) -> ReactiveResult<()> {
        let mut rebinds = Vec::new();
        let mut visited = HashSet::new();
        self.collect_rebinds(old, new, &mut rebinds, &mut visited);
        if rebinds.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = rebinds.len(), "Rebinding nested states");
        let applied = self.apply_rebinds(&rebinds);

        for rebind in rebinds {
            let Some(container) = rebind.new_context.container_id() else {
                continue;
            };
            if rebind.changed && rebind.watched && emitted.insert((container, rebind.index.clone())) {
                changes.push(StateChange {
                    chain: vec![ChainSegment::new(rebind.new_context.clone(), rebind.index.clone())],
                    context: rebind.new_context,
                    index: rebind.index,
                    old_value: rebind.old_value,
                    new_value: rebind.new_value,
                });
            }
        }
        applied
    }

    /// Pairs each state under `old` with the matching slot of `new`,
    /// children before parents
    fn collect_rebinds(
        &self,
        old: &Value,
        new: &Value,
        out: &mut Vec<Rebind>,
        visited: &mut HashSet<ContainerId>,
    ) {
        let Some(old_id) = old.container_id() else {
            return;
        };
        if is_pending(new) {
            if let Some(source) = new.container_id() {
                self.pending.lock().insert(source, old.clone());
            }
            return;
        }
        if old == new || !visited.insert(old_id) {
            return;
        }

        for index in self.states.indexes(old) {
            let Some(state) = self.states.get(old, &index) else {
                continue;
            };
            let new_value = effective(new.read_slot(&index));
            let changed = !self.is_equal(&state.value_copy, &new_value);
            self.collect_rebinds(&state.value, &new_value, out, visited);
            out.push(Rebind {
                old_context: old.clone(),
                new_context: new.clone(),
                index,
                old_value: state.value,
                new_value,
                changed,
                watched: state.watched,
            });
        }
    }

    fn apply_rebinds(&self, rebinds: &[Rebind]) -> ReactiveResult<()> {
        let mut result = Ok(());
        for rebind in rebinds {
            assert!(
                rebind.old_context != rebind.new_context,
                "slot {} rebound onto its own context {:?}",
                rebind.index,
                rebind.new_context
            );
            if let Err(err) = self.states.replace_state(
                &rebind.index,
                &rebind.new_context,
                &rebind.new_value,
                &rebind.old_context,
                rebind.watched,
            ) {
                self.report("Failed to move nested state", &err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
            self.move_registrations(rebind);
        }
        result
    }

    fn move_registrations(&self, rebind: &Rebind) {
        let Some(old_id) = rebind.old_context.container_id() else {
            return;
        };
        let moved: Vec<(RegistrationKey, Registration)> = {
            let mut registrations = self.registrations.lock();
            let keys: Vec<RegistrationKey> = registrations
                .keys()
                .filter(|key| key.context == old_id && key.index == rebind.index)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| registrations.shift_remove(&key).map(|registration| (key, registration)))
                .collect()
        };

        for (key, registration) in moved {
            registration.observation.dispose();
            let target = rebind
                .new_context
                .container_id()
                .filter(|_| !rebind.new_value.is_undefined());
            let Some(new_id) = target else {
                tracing::debug!(index = %key.index, "Dropping watch on removed slot");
                continue;
            };
            if let Some(rule) = &registration.rule {
                rule.rebind(&rebind.new_context);
            }

            let observation = match self.factory.observe_slot(
                &rebind.new_context,
                key.index.clone(),
                registration.rule.clone(),
            ) {
                Ok(observation) => observation,
                Err(err) => {
                    self.report("Failed to rebind watch", &err);
                    continue;
                }
            };
            self.listen(&observation);

            let key = RegistrationKey {
                context: new_id,
                ..key
            };
            let duplicate = {
                let mut registrations = self.registrations.lock();
                match registrations.get_mut(&key) {
                    Some(existing) => {
                        existing.count += registration.count;
                        Some(observation)
                    }
                    None => {
                        registrations.insert(
                            key,
                            Registration {
                                rule: registration.rule,
                                observation,
                                count: registration.count,
                            },
                        );
                        None
                    }
                }
            };
            if let Some(observation) = duplicate {
                observation.dispose();
            }
        }
    }

    /// Marks the watched segments of a record as handled for its mutation,
    /// returning those no earlier record of the same mutation covered
    fn claim(
        &self,
        mutation: MutationId,
        watched: Vec<(usize, WatchedState)>,
        chain: &[ChainSegment],
    ) -> Vec<(usize, WatchedState)> {
        let mut handled = self.handled.lock();
        let slot = match handled.iter().position(|(id, _)| *id == mutation) {
            Some(slot) => slot,
            None => {
                if handled.len() == HANDLED_MUTATIONS {
                    handled.pop_front();
                }
                handled.push_back((mutation, EmittedSet::new()));
                handled.len() - 1
            }
        };
        let seen = &mut handled[slot].1;
        watched
            .into_iter()
            .filter(|(position, _)| {
                let segment = &chain[*position];
                segment
                    .container
                    .container_id()
                    .is_some_and(|id| seen.insert((id, segment.index.clone())))
            })
            .collect()
    }

    fn mark_handled(&self, mutation: MutationId, emitted: EmittedSet) {
        let mut handled = self.handled.lock();
        if let Some((_, seen)) = handled.iter_mut().find(|(id, _)| *id == mutation) {
            seen.extend(emitted);
        }
    }

    fn on_change(&self, record: &ChangeRecord) {
        let Some(leaf) = record.chain.len().checked_sub(1) else {
            return;
        };
        let watched: Vec<(usize, WatchedState)> = record
            .chain
            .iter()
            .enumerate()
            .filter_map(|(position, segment)| {
                self.states
                    .get(&segment.container, &segment.index)
                    .filter(|state| state.watched)
                    .map(|state| (position, state))
            })
            .collect();
        let fresh = self.claim(record.mutation, watched, &record.chain);
        if fresh.is_empty() {
            tracing::trace!(mutation = ?record.mutation, "Change dropped, no unhandled watched segment");
            return;
        }

        let mut changes = Vec::new();
        let mut emitted = EmittedSet::new();
        for (position, state) in fresh.into_iter().rev() {
            let outcome = if position == leaf {
                self.leaf_changed(record, state, &mut changes, &mut emitted)
            } else {
                self.ancestor_changed(&record.chain[..=position], state, &mut changes, &mut emitted)
            };
            if let Err(err) = outcome {
                self.report("Failed to apply change", &err);
            }
        }
        self.mark_handled(record.mutation, emitted);
        if !changes.is_empty() {
            self.hold_cycle_for_delivery();
        }
        self.emit_cycle(changes);
    }

    /// Keeps a cycle open until the hook delivery running on this thread
    /// returns, so records reaching the manager along several observer paths
    /// for one write share a single cycle
    fn hold_cycle_for_delivery(&self) {
        if !container::in_delivery() || self.delivery_cycle.swap(true, Ordering::AcqRel) {
            return;
        }
        self.open_cycle();
        let weak = Weak::clone(&self.weak_self);
        container::after_delivery(move || {
            if let Some(inner) = weak.upgrade() {
                inner.delivery_cycle.store(false, Ordering::Release);
                inner.close_cycle();
            }
        });
    }

    fn open_cycle(&self) {
        if self.cycle_depth.fetch_add(1, Ordering::AcqRel) == 0 {
            self.deliver(&StateEvent::CycleStarted);
        }
    }

    fn close_cycle(&self) {
        if self.cycle_depth.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.deliver(&StateEvent::CycleEnded);
        }
    }

    fn leaf_changed(
        &self,
        record: &ChangeRecord,
        state: WatchedState,
        changes: &mut Vec<StateChange>,
        emitted: &mut EmittedSet,
    ) -> ReactiveResult<()> {
        let new_value = effective(record.new_value.clone());
        let base = self.rebind_base(&state.value);

        let rebound = self.rebind(&base, &new_value, changes, emitted);
        self.states.set(&state.context, &state.index, &new_value, true)?;
        let key = state
            .context
            .container_id()
            .map(|id| (id, state.index.clone()));
        if !self.is_equal(&state.value_copy, &new_value) && key.is_some_and(|key| emitted.insert(key)) {
            changes.push(StateChange {
                context: state.context,
                index: state.index,
                old_value: state.value,
                new_value,
                chain: record.chain.clone(),
            });
        }
        rebound
    }

    fn ancestor_changed(
        &self,
        chain: &[ChainSegment],
        state: WatchedState,
        changes: &mut Vec<StateChange>,
        emitted: &mut EmittedSet,
    ) -> ReactiveResult<()> {
        let current = effective(state.context.read_slot(&state.index));
        if self.is_equal(&state.value_copy, &current) {
            return Ok(());
        }
        self.states.set(&state.context, &state.index, &current, true)?;
        let key = state
            .context
            .container_id()
            .map(|id| (id, state.index.clone()));
        if key.is_some_and(|key| emitted.insert(key)) {
            changes.push(StateChange {
                context: state.context,
                index: state.index,
                old_value: state.value_copy,
                new_value: current,
                chain: chain.to_vec(),
            });
        }
        Ok(())
    }

    fn emit_cycle(&self, changes: Vec<StateChange>) {
        if changes.is_empty() {
            return;
        }
        let _cycle = CycleGuard::open(self);
        for change in changes {
            self.deliver(&StateEvent::Changed(change));
        }
    }

    fn deliver(&self, event: &StateEvent) {
        // No receiver is not an error
        let _ = self.events.send(event.clone());

        let listeners: Vec<StateListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            let failure = match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{err:#}"),
                Err(payload) => panic_message(payload),
            };
            let context = match event {
                StateEvent::Changed(change) => format!("{:?}.{}", change.context, change.index),
                StateEvent::CycleStarted => "cycle start".to_string(),
                StateEvent::CycleEnded => "cycle end".to_string(),
            };
            self.services().errors.add(
                ErrorEntry::new("State change listener failed")
                    .with_exception(failure)
                    .with_context(context)
                    .fatal(),
            );
        }
    }
}

/// Watches slots and publishes their changes
#[derive(Clone)]
pub struct StateManager {
    inner: Arc<StateInner>,
}

impl StateManager {
    /// Manager with default services and an error log sized by `config`
    pub fn new(config: ReactiveConfig) -> ReactiveResult<Self> {
        let services = default_services(&config);
        Self::with_services(config, services)
    }

    pub fn with_services(config: ReactiveConfig, services: Services) -> ReactiveResult<Self> {
        Self::with_factory(config, ObserverFactory::new(services))
    }

    pub fn with_factory(config: ReactiveConfig, factory: ObserverFactory) -> ReactiveResult<Self> {
        config.validate()?;
        Ok(Self::build(config, factory))
    }

    fn build(config: ReactiveConfig, factory: ObserverFactory) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer);
        let inner = Arc::new_cyclic(|weak: &Weak<StateInner>| StateInner {
            states: ObjectStateManager::new(Arc::clone(&factory.services().cloner)),
            config,
            factory,
            registrations: Mutex::new(IndexMap::new()),
            pending: Mutex::new(HashMap::new()),
            handled: Mutex::new(VecDeque::with_capacity(HANDLED_MUTATIONS)),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            events,
            cycle_depth: AtomicUsize::new(0),
            delivery_cycle: AtomicBool::new(false),
            weak_self: Weak::clone(weak),
        });
        Self { inner }
    }

    pub fn config(&self) -> &ReactiveConfig {
        &self.inner.config
    }

    pub fn factory(&self) -> &ObserverFactory {
        &self.inner.factory
    }

    pub fn services(&self) -> &Services {
        self.inner.services()
    }

    /// Starts watching a slot and returns its current value.
    ///
    /// Watching the same `(context, index, rule)` again only adds a
    /// reference. Different rules on one slot are independent watches that
    /// share the slot's state.
    pub fn watch_state(
        &self,
        context: &Value,
        index: impl Into<Index>,
        rule: Option<Arc<WatchRule>>,
    ) -> ReactiveResult<Value> {
        self.inner.watch(context, index.into(), rule)
    }

    /// Drops one reference taken by `watch_state`. Returns `false` if there
    /// was nothing to release.
    pub fn release_state(&self, context: &Value, index: impl Into<Index>, rule: Option<&WatchRule>) -> bool {
        self.inner
            .release(context, &index.into(), rule.map(|rule| rule.id()))
    }

    /// Last known value of a watched slot
    pub fn get_state(&self, context: &Value, index: impl Into<Index>) -> Option<Value> {
        self.inner
            .states
            .get(context, &index.into())
            .map(|state| state.value)
    }

    /// Full tracked state of a slot
    pub fn state(&self, context: &Value, index: impl Into<Index>) -> Option<WatchedState> {
        self.inner.states.get(context, &index.into())
    }

    /// Writes a slot directly, moves nested watches onto the new value and
    /// emits the resulting changes
    pub fn set_state(&self, context: &Value, index: impl Into<Index>, value: impl Into<Value>) -> ReactiveResult<()> {
        self.inner.set(context, index.into(), value.into())
    }

    pub fn is_watched(&self, context: &Value, index: impl Into<Index>) -> bool {
        self.inner.states.is_watched(context, &index.into())
    }

    /// References held by `watch_state` calls for one `(context, index, rule)`
    pub fn watch_count(&self, context: &Value, index: impl Into<Index>, rule: Option<&WatchRule>) -> u32 {
        let Some(container) = context.container_id() else {
            return 0;
        };
        let key = RegistrationKey {
            context: container,
            index: index.into(),
            rule: rule.map(|rule| rule.id()),
        };
        self.inner
            .registrations
            .lock()
            .get(&key)
            .map(|registration| registration.count)
            .unwrap_or(0)
    }

    /// Number of distinct `(context, index, rule)` watches
    pub fn registration_count(&self) -> usize {
        self.inner.registrations.lock().len()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StateEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Stream of every event delivered from now on
    pub fn events(&self) -> broadcast::Receiver<StateEvent> {
        self.inner.events.subscribe()
    }
}

impl Default for StateManager {
    fn default() -> Self {
        let config = ReactiveConfig::default();
        let factory = ObserverFactory::new(default_services(&config));
        Self::build(config, factory)
    }
}

fn error_log(config: &ReactiveConfig) -> Arc<TracingErrorLog> {
    Arc::new(TracingErrorLog::new(config.error_log_capacity))
}

fn default_services(config: &ReactiveConfig) -> Services {
    Services::default().with_error_log(error_log(config))
}

impl fmt::Debug for StateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateManager")
            .field("config", &self.inner.config)
            .field("states", &self.inner.states)
            .field("registrations", &self.registration_count())
            .field("factory", &self.inner.factory)
            .finish()
    }
}
