//! Follows the value held in one slot: nested containers under a watch rule,
//! and deferred values or streams until they settle.

use crate::dispatcher::SlotFilter;
use crate::factory::FactoryInner;
use crate::observer::{Observation, RecordListener};
use crate::types::{ChainSegment, ChangeKind, ChangeRecord, ContainerId, Index, ReactiveError, ReactiveResult};
use crate::value::Value;
use crate::watch_rule::WatchRule;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

#[derive(Default)]
struct Leases {
    source: Option<(ContainerId, Observation)>,
    nested: Option<(ContainerId, Observation)>,
}

pub(crate) struct SlotProxy {
    container: Value,
    index: Index,
    rule: Option<Arc<WatchRule>>,
    always_follow_async: bool,
    factory: Weak<FactoryInner>,
    forward: RecordListener,
    leases: Mutex<Leases>,
}

impl SlotProxy {
    pub(crate) fn new(
        container: Value,
        index: Index,
        rule: Option<Arc<WatchRule>>,
        always_follow_async: bool,
        factory: Weak<FactoryInner>,
        forward: RecordListener,
    ) -> Arc<Self> {
        Arc::new(Self {
            container,
            index,
            rule,
            always_follow_async,
            factory,
            forward,
            leases: Mutex::new(Leases::default()),
        })
    }

    fn rule_accepts(&self) -> bool {
        self.rule
            .as_ref()
            .is_some_and(|rule| rule.test(&self.index, &self.container))
    }

    fn factory(&self) -> ReactiveResult<Arc<FactoryInner>> {
        self.factory
            .upgrade()
            .ok_or_else(|| ReactiveError::Disposed("observer factory".to_string()))
    }

    /// Points the proxy at the slot's current value
    pub(crate) fn bind(self: &Arc<Self>, value: &Value) -> ReactiveResult<()> {
        let wanted = value
            .container_id()
            .filter(|_| value.is_async() && (self.always_follow_async || self.rule_accepts()));
        let current = self.leases.lock().source.as_ref().map(|(id, _)| *id);

        if wanted != current {
            let previous = self.leases.lock().source.take();
            if let Some((_, lease)) = previous {
                lease.dispose();
            }
            if let Some(id) = wanted {
                let lease = self.factory()?.adapter(value, SlotFilter::Coarse)?;
                let weak = Arc::downgrade(self);
                lease.subscribe_live(Arc::new(move |record: &ChangeRecord| {
                    if let Some(proxy) = weak.upgrade() {
                        proxy.on_settled(record);
                    }
                }));
                lease.init();
                self.leases.lock().source = Some((id, lease));
            }
        }

        let inner = if value.is_async() {
            value.settled().unwrap_or_default()
        } else {
            value.clone()
        };
        self.bind_nested(&inner)
    }

    fn bind_nested(self: &Arc<Self>, value: &Value) -> ReactiveResult<()> {
        let wanted = value
            .container_id()
            .filter(|_| !value.is_async() && *value != self.container && self.rule_accepts());
        let current = self.leases.lock().nested.as_ref().map(|(id, _)| *id);
        if wanted == current {
            return Ok(());
        }

        let previous = self.leases.lock().nested.take();
        if let Some((_, lease)) = previous {
            lease.dispose();
        }
        let Some(id) = wanted else {
            return Ok(());
        };

        let lease = self.factory()?.group(value, self.rule.clone())?;
        let weak = Arc::downgrade(self);
        lease.subscribe_live(Arc::new(move |record: &ChangeRecord| {
            if let Some(proxy) = weak.upgrade() {
                (proxy.forward)(&record.prefixed(&proxy.container, &proxy.index));
            }
        }));
        lease.init();
        self.leases.lock().nested = Some((id, lease));
        Ok(())
    }

    fn on_settled(self: &Arc<Self>, record: &ChangeRecord) {
        if let Err(err) = self.bind_nested(&record.new_value) {
            if let Ok(factory) = self.factory() {
                factory.report("Failed to follow settled value", &err);
            }
        }
        (self.forward)(&ChangeRecord {
            chain: vec![ChainSegment::new(self.container.clone(), self.index.clone())],
            slot: self.index.clone(),
            new_value: record.new_value.clone(),
            is_new: false,
            target: self.container.clone(),
            kind: ChangeKind::Settled,
            mutation: record.mutation,
        });
    }

    /// Whether a nested group is currently held
    pub(crate) fn is_following(&self) -> bool {
        let leases = self.leases.lock();
        leases.nested.is_some() || leases.source.is_some()
    }

    pub(crate) fn release(&self) {
        let leases = std::mem::take(&mut *self.leases.lock());
        if let Some((_, lease)) = leases.source {
            lease.dispose();
        }
        if let Some((_, lease)) = leases.nested {
            lease.dispose();
        }
    }
}
