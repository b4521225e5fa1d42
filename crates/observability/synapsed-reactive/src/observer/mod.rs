//! Observer model - shared observers, their change listeners and the leases handed to callers.
//!
//! An observer is shared by every caller that asked for the same thing and
//! lives in a registry. Callers never own it directly: each gets an
//! [`Observation`] lease whose `dispose` drops exactly one registry reference.

mod group;

pub use group::{ObserverGroup, Ownership};

use crate::types::{ChangeRecord, Index, ListenerId, ObserverId, ReactiveResult};
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Receives change records
pub type RecordListener = Arc<dyn Fn(&ChangeRecord) + Send + Sync>;

/// State every observer carries
pub struct ObserverCore {
    id: ObserverId,
    target: Value,
    index: Option<Index>,
    initial_value: Value,
    listeners: Mutex<Vec<(ListenerId, RecordListener)>>,
    next_listener: AtomicU64,
    replay: Option<Mutex<Option<ChangeRecord>>>,
    initialized: AtomicBool,
    disposed: AtomicBool,
}

impl ObserverCore {
    pub fn new(id: ObserverId, target: Value, index: Option<Index>, initial_value: Value) -> Self {
        Self {
            id,
            target,
            index,
            initial_value,
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            replay: None,
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Keeps the last emitted record for subscribers that arrive late
    pub fn with_replay(mut self) -> Self {
        self.replay = Some(Mutex::new(None));
        self
    }

    pub fn id(&self) -> &ObserverId {
        &self.id
    }

    pub fn target(&self) -> &Value {
        &self.target
    }

    pub fn index(&self) -> Option<&Index> {
        self.index.as_ref()
    }

    pub fn initial_value(&self) -> &Value {
        &self.initial_value
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Returns `true` the first time only
    pub fn mark_initialized(&self) -> bool {
        !self.initialized.swap(true, Ordering::AcqRel)
    }

    /// Returns `true` the first time only
    pub fn mark_disposed(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    pub fn subscribe(&self, listener: RecordListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn replayed(&self) -> Option<ChangeRecord> {
        self.replay.as_ref().and_then(|slot| slot.lock().clone())
    }

    /// Delivers a record to every listener. Nothing is delivered before
    /// initialization or after disposal; replay is still recorded.
    pub fn emit(&self, record: ChangeRecord) {
        if self.is_disposed() {
            return;
        }
        if let Some(slot) = &self.replay {
            *slot.lock() = Some(record.clone());
        }
        if !self.is_initialized() {
            return;
        }
        let listeners: Vec<RecordListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&record);
        }
    }
}

impl fmt::Debug for ObserverCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverCore")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("index", &self.index)
            .field("listeners", &self.listener_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A shared observer
pub trait Observer: Send + Sync {
    fn core(&self) -> &ObserverCore;

    /// Wires the observer to its sources once it is registered
    fn attach(self: Arc<Self>) -> ReactiveResult<()> {
        Ok(())
    }

    /// Current value of the observed slot
    fn current_value(&self) -> Value {
        self.core().initial_value().clone()
    }

    /// Re-reads the observed slot after an untracked write
    fn refresh(&self, _index: Option<&Index>) {}

    /// Releases sources. Called exactly once, by the owning registry.
    fn teardown(&self);
}

/// Caller-owned lease on a shared observer
pub struct Observation {
    observer: Arc<dyn Observer>,
    release: Box<dyn Fn() + Send + Sync>,
    listeners: Mutex<Vec<ListenerId>>,
    disposed: AtomicBool,
}

impl Observation {
    pub(crate) fn new(observer: Arc<dyn Observer>, release: Box<dyn Fn() + Send + Sync>) -> Self {
        Self {
            observer,
            release,
            listeners: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &ObserverId {
        self.observer.core().id()
    }

    pub fn target(&self) -> &Value {
        self.observer.core().target()
    }

    pub fn index(&self) -> Option<&Index> {
        self.observer.core().index()
    }

    pub fn initial_value(&self) -> &Value {
        self.observer.core().initial_value()
    }

    pub fn current_value(&self) -> Value {
        self.observer.current_value()
    }

    /// Starts delivery. Idempotent.
    pub fn init(&self) {
        self.observer.core().mark_initialized();
    }

    /// Subscribes to change records. A late subscriber to an observer with a
    /// replay buffer first receives the last emitted record.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeRecord) + Send + Sync + 'static,
    {
        let listener: RecordListener = Arc::new(listener);
        let replay = self.observer.core().replayed();
        let id = self.subscribe_live(Arc::clone(&listener));
        if let Some(record) = replay {
            listener(&record);
        }
        id
    }

    /// Subscribes to records emitted from now on
    pub(crate) fn subscribe_live(&self, listener: RecordListener) -> ListenerId {
        let id = self.observer.core().subscribe(listener);
        self.listeners.lock().push(id);
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.lock().retain(|own| *own != id);
        self.observer.core().unsubscribe(id)
    }

    pub fn refresh(&self, index: Option<&Index>) {
        self.observer.refresh(index);
    }

    /// Whether this lease has been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Whether the shared observer behind this lease has been torn down
    pub fn is_observer_disposed(&self) -> bool {
        self.observer.core().is_disposed()
    }

    /// Whether both leases point at the same shared observer
    pub fn shares_observer_with(&self, other: &Observation) -> bool {
        Arc::ptr_eq(&self.observer, &other.observer)
    }

    /// Unsubscribes this lease's listeners and drops its reference.
    /// Disposing twice is a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let listeners = std::mem::take(&mut *self.listeners.lock());
        for id in listeners {
            self.observer.core().unsubscribe(id);
        }
        (self.release)();
    }
}

impl fmt::Debug for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observation")
            .field("observer", self.observer.core())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Observer for values with nothing to observe
pub struct NullObserver {
    core: ObserverCore,
}

impl NullObserver {
    pub fn new(id: ObserverId, target: Value) -> Self {
        Self {
            core: ObserverCore::new(id, target.clone(), None, target),
        }
    }
}

impl Observer for NullObserver {
    fn core(&self) -> &ObserverCore {
        &self.core
    }

    fn teardown(&self) {
        self.core.mark_disposed();
    }
}
