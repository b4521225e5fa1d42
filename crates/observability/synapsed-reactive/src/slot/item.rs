//! Array, map and set kinds. Missing items are legal slots that read as undefined.

use super::{invalid_index, SlotBinding};
use crate::adapter::{ChainShape, SlotAdapter};
use crate::dispatcher::{ContainerKind, SlotFilter};
use crate::observer::Observer;
use crate::services::IdGenerator;
use crate::types::{Index, ReactiveError, ReactiveResult};
use crate::value::Value;
use std::sync::Arc;

macro_rules! item_kind {
    ($kind:ident, $variant:ident, $index:ident, $shape:expr, $name:literal, $priority:literal) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $kind;

        impl ContainerKind for $kind {
            fn name(&self) -> &'static str {
                $name
            }

            fn priority(&self) -> i32 {
                $priority
            }

            fn applies(&self, value: &Value) -> bool {
                matches!(value, Value::$variant(_))
            }

            fn create_adapter(
                &self,
                value: &Value,
                _filter: SlotFilter,
                ids: &dyn IdGenerator,
            ) -> ReactiveResult<Arc<dyn Observer>> {
                match value {
                    Value::$variant(container) => Ok(Arc::new(SlotAdapter::new(
                        ids.next_id(),
                        container.clone(),
                        $shape,
                    ))),
                    other => Err(ReactiveError::NoAdapter { kind: other.kind() }),
                }
            }

            fn bind_slot(&self, value: &Value, index: &Index) -> ReactiveResult<SlotBinding> {
                match (value, index) {
                    (Value::$variant(_), Index::$index(..)) => Ok(SlotBinding::Item {
                        container: value.clone(),
                        index: index.clone(),
                    }),
                    _ => Err(invalid_index(value, index)),
                }
            }
        }
    };
}

item_kind!(ArrayKind, Array, Position, ChainShape::Segment, "array", 80);
item_kind!(MapKind, Map, Key, ChainShape::Segment, "map", 50);
item_kind!(SetKind, Set, Key, ChainShape::Flat, "set", 40);
