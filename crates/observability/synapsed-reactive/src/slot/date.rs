//! Date kind - virtual property slots

use super::{invalid_index, SlotBinding};
use crate::adapter::DateAdapter;
use crate::container::DateProperty;
use crate::dispatcher::{ContainerKind, SlotFilter};
use crate::observer::Observer;
use crate::services::IdGenerator;
use crate::types::{Index, ReactiveError, ReactiveResult};
use crate::value::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct DateKind;

impl ContainerKind for DateKind {
    fn name(&self) -> &'static str {
        "date"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn applies(&self, value: &Value) -> bool {
        matches!(value, Value::Date(_))
    }

    fn filters_slots(&self) -> bool {
        true
    }

    fn create_adapter(
        &self,
        value: &Value,
        filter: SlotFilter,
        ids: &dyn IdGenerator,
    ) -> ReactiveResult<Arc<dyn Observer>> {
        match value {
            Value::Date(date) => Ok(Arc::new(DateAdapter::new(ids.next_id(), date.clone(), filter))),
            other => Err(ReactiveError::NoAdapter { kind: other.kind() }),
        }
    }

    fn bind_slot(&self, value: &Value, index: &Index) -> ReactiveResult<SlotBinding> {
        match (value, index.as_name().and_then(DateProperty::from_name)) {
            (Value::Date(date), Some(property)) => Ok(SlotBinding::DateProperty {
                date: date.clone(),
                property,
            }),
            _ => Err(invalid_index(value, index)),
        }
    }
}
