//! Observer group implementation - one container plus every nested container its rule follows

use super::{Observation, Observer, ObserverCore};
use crate::dispatcher::SlotFilter;
use crate::factory::FactoryInner;
use crate::slot::SlotProxy;
use crate::types::{ChangeKind, ChangeRecord, Index, ListenerId, ObserverId, ReactiveError, ReactiveResult};
use crate::value::Value;
use crate::watch_rule::WatchRule;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Whether a group disposes a child when the child is removed or the group
/// is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Borrowed,
}

struct Child {
    observation: Arc<Observation>,
    listener: ListenerId,
    ownership: Ownership,
}

/// Composite observer for one container under one rule.
///
/// The root is the container's adapter. Every slot accepted by the rule that
/// holds another container gets a nested group, whose records are forwarded
/// with `(container, slot)` prepended to their chain. Replacing a slot's
/// value swaps its nested group.
pub struct ObserverGroup {
    core: ObserverCore,
    rule: Option<Arc<WatchRule>>,
    factory: Weak<FactoryInner>,
    root: Mutex<Option<Observation>>,
    proxies: Mutex<HashMap<Index, Arc<SlotProxy>>>,
    children: Mutex<Vec<Child>>,
}

impl ObserverGroup {
    pub(crate) fn new(
        id: ObserverId,
        target: Value,
        rule: Option<Arc<WatchRule>>,
        factory: Weak<FactoryInner>,
    ) -> Self {
        Self {
            core: ObserverCore::new(id, target.clone(), None, target),
            rule,
            factory,
            root: Mutex::new(None),
            proxies: Mutex::new(HashMap::new()),
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn target(&self) -> &Value {
        self.core.target()
    }

    pub fn rule(&self) -> Option<&Arc<WatchRule>> {
        self.rule.as_ref()
    }

    /// Number of slots currently followed into a nested container
    pub fn nested_count(&self) -> usize {
        self.proxies
            .lock()
            .values()
            .filter(|proxy| proxy.is_following())
            .count()
    }

    /// Adds externally created observers whose records this group forwards
    pub fn add_observers<I>(self: &Arc<Self>, observations: I)
    where
        I: IntoIterator<Item = (Arc<Observation>, Ownership)>,
    {
        for (observation, ownership) in observations {
            let weak = Arc::downgrade(self);
            let listener = observation.subscribe_live(Arc::new(move |record: &ChangeRecord| {
                if let Some(group) = weak.upgrade() {
                    group.core.emit(record.clone());
                }
            }));
            self.children.lock().push(Child {
                observation,
                listener,
                ownership,
            });
        }
    }

    /// Detaches a child. Owned children are disposed.
    pub fn remove_observer(&self, id: &ObserverId) -> Option<Arc<Observation>> {
        let child = {
            let mut children = self.children.lock();
            let position = children.iter().position(|child| child.observation.id() == id)?;
            children.remove(position)
        };
        child.observation.unsubscribe(child.listener);
        if child.ownership == Ownership::Owned {
            child.observation.dispose();
        }
        Some(child.observation)
    }

    pub fn child_count(&self) -> usize {
        self.children.lock().len()
    }

    fn accepts(&self, index: &Index) -> bool {
        self.rule
            .as_ref()
            .is_some_and(|rule| rule.test(index, self.core.target()))
    }

    fn filter(&self) -> SlotFilter {
        match &self.rule {
            Some(rule) => SlotFilter::Rule(Arc::clone(rule)),
            None => SlotFilter::Coarse,
        }
    }

    fn proxy(self: &Arc<Self>, index: &Index) -> Arc<SlotProxy> {
        let mut proxies = self.proxies.lock();
        if let Some(proxy) = proxies.get(index) {
            return Arc::clone(proxy);
        }
        let weak = Arc::downgrade(self);
        let proxy = SlotProxy::new(
            self.core.target().clone(),
            index.clone(),
            self.rule.clone(),
            false,
            Weak::clone(&self.factory),
            Arc::new(move |record: &ChangeRecord| {
                if let Some(group) = weak.upgrade() {
                    group.core.emit(record.clone());
                }
            }),
        );
        proxies.insert(index.clone(), Arc::clone(&proxy));
        proxy
    }

    fn follow(self: &Arc<Self>, index: &Index) -> ReactiveResult<()> {
        if !self.accepts(index) {
            return Ok(());
        }
        let value = self.core.target().read_slot(index);
        if !value.is_container() {
            if let Some(proxy) = self.proxies.lock().remove(index) {
                proxy.release();
            }
            return Ok(());
        }
        self.proxy(index).bind(&value)
    }

    fn on_root_record(self: &Arc<Self>, record: &ChangeRecord) {
        if record.kind != ChangeKind::Invoke {
            if let Err(err) = self.follow(&record.slot) {
                if let Some(factory) = self.factory.upgrade() {
                    factory.report("Failed to follow replaced slot", &err);
                }
            }
        }
        self.core.emit(record.clone());
    }
}

impl Observer for ObserverGroup {
    fn core(&self) -> &ObserverCore {
        &self.core
    }

    fn attach(self: Arc<Self>) -> ReactiveResult<()> {
        let factory = self
            .factory
            .upgrade()
            .ok_or_else(|| ReactiveError::Disposed("observer factory".to_string()))?;

        let root = factory.adapter(self.core.target(), self.filter())?;
        let weak = Arc::downgrade(&self);
        root.subscribe_live(Arc::new(move |record: &ChangeRecord| {
            if let Some(group) = weak.upgrade() {
                group.on_root_record(record);
            }
        }));
        root.init();
        *self.root.lock() = Some(root);

        for index in self.core.target().slots() {
            self.follow(&index)?;
        }
        Ok(())
    }

    fn current_value(&self) -> Value {
        self.core.target().clone()
    }

    fn refresh(&self, index: Option<&Index>) {
        let indexes = match index {
            Some(index) => vec![index.clone()],
            None => self.core.target().slots(),
        };
        let proxies: Vec<(Index, Arc<SlotProxy>)> = {
            let proxies = self.proxies.lock();
            indexes
                .into_iter()
                .filter_map(|index| proxies.get(&index).map(|proxy| (index, Arc::clone(proxy))))
                .collect()
        };
        for (index, proxy) in proxies {
            if let Err(err) = proxy.bind(&self.core.target().read_slot(&index)) {
                if let Some(factory) = self.factory.upgrade() {
                    factory.report("Failed to refresh nested slot", &err);
                }
            }
        }
    }

    fn teardown(&self) {
        if !self.core.mark_disposed() {
            return;
        }
        let proxies: Vec<Arc<SlotProxy>> = self.proxies.lock().drain().map(|(_, proxy)| proxy).collect();
        for proxy in proxies {
            proxy.release();
        }
        let children = std::mem::take(&mut *self.children.lock());
        for child in children {
            child.observation.unsubscribe(child.listener);
            if child.ownership == Ownership::Owned {
                child.observation.dispose();
            }
        }
        // Root last
        if let Some(root) = self.root.lock().take() {
            root.dispose();
        }
    }
}

impl fmt::Debug for ObserverGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverGroup")
            .field("target", self.core.target())
            .field("rule", &self.rule.as_ref().map(|rule| rule.id()))
            .field("proxies", &self.proxies.lock().len())
            .field("children", &self.children.lock().len())
            .finish()
    }
}
