//! Observable containers.
//!
//! Every container is a cheap `Arc` handle with identity. Mutating calls apply
//! the write under the container's lock, release it, then hand one batch of
//! slot writes to every installed hook. Hooks are how adapters learn about
//! writes; nothing here knows about observers.

mod array;
mod date;
mod deferred;
mod map;
mod record;
mod set;
mod stream;

pub use array::Array;
pub use date::{Date, DateMutation, DateProperty};
pub(crate) use date::component_at;
pub use deferred::Deferred;
pub use map::Map;
pub use record::{Getter, Member, MethodFn, Record, Setter};
pub use set::Set;
pub use stream::Stream;

use crate::types::{ChangeKind, ContainerId, Index, MutationId};
use crate::value::Value;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback installed on a container
pub type Hook<M> = Arc<dyn Fn(&M) + Send + Sync>;

/// Handle for removing an installed hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

pub(crate) struct Hooks<M> {
    next: AtomicU64,
    entries: Mutex<Vec<(HookId, Hook<M>)>>,
}

impl<M> Hooks<M> {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, hook: Hook<M>) -> HookId {
        let id = HookId(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, hook));
        id
    }

    pub(crate) fn remove(&self, id: HookId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(hook_id, _)| *hook_id != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Runs every hook with no lock held
    pub(crate) fn notify(&self, payload: &M) {
        let hooks: Vec<Hook<M>> = self
            .entries
            .lock()
            .iter()
            .map(|(_, hook)| Arc::clone(hook))
            .collect();
        let _scope = DeliveryScope::enter();
        for hook in hooks {
            hook(payload);
        }
    }
}

#[derive(Default)]
struct Delivery {
    depth: usize,
    finally: Vec<Box<dyn FnOnce()>>,
}

thread_local! {
    static DELIVERY: RefCell<Delivery> = RefCell::new(Delivery::default());
}

/// Marks the current thread as running hooks. Work queued with
/// `after_delivery` runs when the outermost scope closes.
struct DeliveryScope;

impl DeliveryScope {
    fn enter() -> Self {
        DELIVERY.with(|delivery| delivery.borrow_mut().depth += 1);
        Self
    }
}

impl Drop for DeliveryScope {
    fn drop(&mut self) {
        let finally = DELIVERY.with(|delivery| {
            let mut delivery = delivery.borrow_mut();
            delivery.depth = delivery.depth.saturating_sub(1);
            if delivery.depth == 0 {
                std::mem::take(&mut delivery.finally)
            } else {
                Vec::new()
            }
        });
        for task in finally {
            task();
        }
    }
}

/// True while this thread is inside a hook delivery
pub(crate) fn in_delivery() -> bool {
    DELIVERY.with(|delivery| delivery.borrow().depth > 0)
}

/// Runs `task` once the outermost hook delivery on this thread returns, or
/// right away when no delivery is running
pub(crate) fn after_delivery(task: impl FnOnce() + 'static) {
    let mut task = Some(task);
    DELIVERY.with(|delivery| {
        let mut delivery = delivery.borrow_mut();
        if delivery.depth > 0 {
            if let Some(task) = task.take() {
                delivery.finally.push(Box::new(task));
            }
        }
    });
    if let Some(task) = task {
        task();
    }
}

/// A single slot write inside a batch
#[derive(Debug, Clone)]
pub struct SlotWrite {
    pub index: Index,
    pub old_value: Value,
    pub new_value: Value,
    pub is_new: bool,
    pub kind: ChangeKind,
}

impl SlotWrite {
    pub(crate) fn assign(index: Index, old_value: Value, new_value: Value, is_new: bool) -> Self {
        Self {
            index,
            old_value,
            new_value,
            is_new,
            kind: ChangeKind::Assign,
        }
    }

    pub(crate) fn delete(index: Index, old_value: Value) -> Self {
        Self {
            index,
            old_value,
            new_value: Value::Undefined,
            is_new: false,
            kind: ChangeKind::Delete,
        }
    }
}

/// All slot writes made by one mutating call
#[derive(Debug, Clone)]
pub struct SlotBatch {
    pub mutation: MutationId,
    pub writes: Vec<SlotWrite>,
}

impl SlotBatch {
    pub(crate) fn new(writes: Vec<SlotWrite>) -> Self {
        Self {
            mutation: MutationId::next(),
            writes,
        }
    }
}

/// Payload delivered when a deferred value settles or a stream emits
#[derive(Debug, Clone)]
pub struct Settlement {
    pub mutation: MutationId,
    pub value: Value,
}

/// Containers whose writes are reported as slot batches
pub trait SlotContainer: Clone + Send + Sync + 'static {
    fn id(&self) -> ContainerId;
    fn to_value(&self) -> Value;
    fn add_hook(&self, hook: Hook<SlotBatch>) -> HookId;
    fn remove_hook(&self, id: HookId) -> bool;
    fn hook_count(&self) -> usize;
}

/// Containers that produce values over time
pub trait AsyncSource: Clone + Send + Sync + 'static {
    fn id(&self) -> ContainerId;
    fn to_value(&self) -> Value;
    /// Latest settled value, if any
    fn latest(&self) -> Option<Value>;
    fn add_hook(&self, hook: Hook<Settlement>) -> HookId;
    fn remove_hook(&self, id: HookId) -> bool;
}

macro_rules! slot_container {
    ($ty:ident) => {
        impl SlotContainer for $ty {
            fn id(&self) -> ContainerId {
                $ty::id(self)
            }

            fn to_value(&self) -> Value {
                Value::$ty(self.clone())
            }

            fn add_hook(&self, hook: Hook<SlotBatch>) -> HookId {
                self.hooks().add(hook)
            }

            fn remove_hook(&self, id: HookId) -> bool {
                self.hooks().remove(id)
            }

            fn hook_count(&self) -> usize {
                self.hooks().len()
            }
        }
    };
}

slot_container!(Record);
slot_container!(Array);
slot_container!(Map);
slot_container!(Set);

macro_rules! async_source {
    ($ty:ident, $latest:ident) => {
        impl AsyncSource for $ty {
            fn id(&self) -> ContainerId {
                $ty::id(self)
            }

            fn to_value(&self) -> Value {
                Value::$ty(self.clone())
            }

            fn latest(&self) -> Option<Value> {
                $ty::$latest(self)
            }

            fn add_hook(&self, hook: Hook<Settlement>) -> HookId {
                self.hooks().add(hook)
            }

            fn remove_hook(&self, id: HookId) -> bool {
                self.hooks().remove(id)
            }
        }
    };
}

async_source!(Deferred, value);
async_source!(Stream, latest);
