//! Deferred implementation - a value that settles at most once

use super::{Hooks, Settlement};
use crate::types::{ContainerId, MutationId};
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

struct DeferredInner {
    id: ContainerId,
    value: Mutex<Option<Value>>,
    hooks: Hooks<Settlement>,
}

#[derive(Clone)]
pub struct Deferred {
    inner: Arc<DeferredInner>,
}

impl Deferred {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DeferredInner {
                id: ContainerId::next(),
                value: Mutex::new(None),
                hooks: Hooks::new(),
            }),
        }
    }

    pub fn resolved(value: impl Into<Value>) -> Self {
        let deferred = Self::new();
        *deferred.inner.value.lock() = Some(value.into());
        deferred
    }

    /// Settles with the output of `future`. Must be called inside a Tokio runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Value> + Send + 'static,
    {
        let deferred = Self::new();
        let handle = deferred.clone();
        tokio::spawn(async move {
            let value = future.await;
            handle.resolve(value);
        });
        deferred
    }

    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    pub(crate) fn hooks(&self) -> &Hooks<Settlement> {
        &self.inner.hooks
    }

    /// Settles the value. Returns `false` if it had already settled.
    pub fn resolve(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        {
            let mut slot = self.inner.value.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(value.clone());
        }
        tracing::trace!(deferred = %self.inner.id, "Deferred value settled");
        self.inner.hooks.notify(&Settlement {
            mutation: MutationId::next(),
            value,
        });
        true
    }

    pub fn value(&self) -> Option<Value> {
        self.inner.value.lock().clone()
    }

    pub fn is_settled(&self) -> bool {
        self.inner.value.lock().is_some()
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("id", &self.inner.id)
            .field("settled", &self.is_settled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_once() {
        let deferred = Deferred::new();
        assert!(!deferred.is_settled());
        assert!(deferred.resolve(1));
        assert!(!deferred.resolve(2));
        assert_eq!(deferred.value(), Some(Value::from(1)));
    }

    #[tokio::test]
    async fn test_spawn_settles_from_future() {
        let (tx, rx) = tokio::sync::oneshot::channel::<i32>();
        let deferred = Deferred::spawn(async move { Value::from(rx.await.unwrap_or_default()) });

        tx.send(42).unwrap();
        for _ in 0..100 {
            if deferred.is_settled() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(deferred.value(), Some(Value::from(42)));
    }
}
