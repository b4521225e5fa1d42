//! Watch rules - which nested slots a recursive watch follows

use crate::types::{Index, WatchRuleId};
use crate::value::Value;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Decides whether `index` of `container` is followed
pub type IndexPredicate = Arc<dyn Fn(&Index, &Value) -> bool + Send + Sync>;

/// Rule attached to a watched slot. The same rule instance is shared by every
/// observer created on its behalf; its context is repointed when the watched
/// container is replaced.
pub struct WatchRule {
    id: WatchRuleId,
    context: RwLock<Value>,
    index: Index,
    predicate: IndexPredicate,
}

impl WatchRule {
    pub fn new<F>(context: &Value, index: impl Into<Index>, predicate: F) -> Arc<Self>
    where
        F: Fn(&Index, &Value) -> bool + Send + Sync + 'static,
    {
        Arc::new(Self {
            id: WatchRuleId::new(),
            context: RwLock::new(context.clone()),
            index: index.into(),
            predicate: Arc::new(predicate),
        })
    }

    /// Follows every nested slot
    pub fn recursive(context: &Value, index: impl Into<Index>) -> Arc<Self> {
        Self::new(context, index, |_, _| true)
    }

    pub fn id(&self) -> WatchRuleId {
        self.id
    }

    pub fn context(&self) -> Value {
        self.context.read().clone()
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn test(&self, index: &Index, container: &Value) -> bool {
        (self.predicate)(index, container)
    }

    pub(crate) fn rebind(&self, context: &Value) {
        *self.context.write() = context.clone();
    }
}

impl fmt::Debug for WatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRule")
            .field("id", &self.id)
            .field("context", &*self.context.read())
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Record;

    #[test]
    fn test_predicate_and_rebind() {
        let first = Value::from(Record::new());
        let rule = WatchRule::new(&first, "nested", |index, _| index.as_name() != Some("skip"));

        assert!(rule.test(&Index::from("value"), &first));
        assert!(!rule.test(&Index::from("skip"), &first));

        let second = Value::from(Record::new());
        rule.rebind(&second);
        assert_eq!(rule.context(), second);
        assert_eq!(rule.index(), &Index::from("nested"));
    }

    #[test]
    fn test_rules_have_distinct_ids() {
        let context = Value::from(Record::new());
        assert_ne!(
            WatchRule::recursive(&context, "a").id(),
            WatchRule::recursive(&context, "a").id()
        );
    }
}
