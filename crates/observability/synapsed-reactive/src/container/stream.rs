//! Stream implementation - a source that emits any number of values

use super::{Hooks, Settlement};
use crate::types::{ContainerId, MutationId};
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

struct StreamInner {
    id: ContainerId,
    latest: Mutex<Option<Value>>,
    hooks: Hooks<Settlement>,
}

#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl Stream {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: ContainerId::next(),
                latest: Mutex::new(None),
                hooks: Hooks::new(),
            }),
        }
    }

    /// Emits every value received on `rx`. Must be called inside a Tokio runtime.
    pub fn forward(mut rx: mpsc::UnboundedReceiver<Value>) -> Self {
        let stream = Self::new();
        let handle = stream.clone();
        tokio::spawn(async move {
            while let Some(value) = rx.recv().await {
                handle.emit(value);
            }
            tracing::trace!(stream = %handle.id(), "Stream source closed");
        });
        stream
    }

    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    pub(crate) fn hooks(&self) -> &Hooks<Settlement> {
        &self.inner.hooks
    }

    pub fn emit(&self, value: impl Into<Value>) {
        let value = value.into();
        *self.inner.latest.lock() = Some(value.clone());
        self.inner.hooks.notify(&Settlement {
            mutation: MutationId::next(),
            value,
        });
    }

    /// Most recently emitted value
    pub fn latest(&self) -> Option<Value> {
        self.inner.latest.lock().clone()
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.inner.id)
            .field("latest", &self.latest())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_replaces_latest() {
        let stream = Stream::new();
        assert_eq!(stream.latest(), None);
        stream.emit(1);
        stream.emit(2);
        assert_eq!(stream.latest(), Some(Value::from(2)));
    }

    #[tokio::test]
    async fn test_forward_drains_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = Stream::forward(rx);

        tx.send(Value::from("a")).unwrap();
        tx.send(Value::from("b")).unwrap();
        for _ in 0..100 {
            if stream.latest() == Some(Value::from("b")) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(stream.latest(), Some(Value::from("b")));
    }
}
