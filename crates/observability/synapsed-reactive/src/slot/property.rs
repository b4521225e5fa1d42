//! Record kind - record adapter and member slot bindings

use super::{invalid_index, MemberKind, SlotBinding};
use crate::adapter::{ChainShape, SlotAdapter};
use crate::container::Member;
use crate::dispatcher::{ContainerKind, SlotFilter};
use crate::observer::Observer;
use crate::services::IdGenerator;
use crate::types::{Index, ReactiveError, ReactiveResult};
use crate::value::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordKind;

impl ContainerKind for RecordKind {
    fn name(&self) -> &'static str {
        "record"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn applies(&self, value: &Value) -> bool {
        matches!(value, Value::Record(_))
    }

    fn create_adapter(
        &self,
        value: &Value,
        _filter: SlotFilter,
        ids: &dyn IdGenerator,
    ) -> ReactiveResult<Arc<dyn Observer>> {
        match value {
            Value::Record(record) => Ok(Arc::new(SlotAdapter::new(
                ids.next_id(),
                record.clone(),
                ChainShape::Segment,
            ))),
            other => Err(ReactiveError::NoAdapter { kind: other.kind() }),
        }
    }

    /// Fields, readable accessors and methods can be watched. Unknown names
    /// and write-only accessors are rejected.
    fn bind_slot(&self, value: &Value, index: &Index) -> ReactiveResult<SlotBinding> {
        let (Value::Record(record), Index::Name(name)) = (value, index) else {
            return Err(invalid_index(value, index));
        };
        let kind = match record.member(name) {
            Some(Member::Field(_)) => MemberKind::Field,
            Some(Member::Accessor { get: Some(_), .. }) => MemberKind::Accessor,
            Some(Member::Accessor { get: None, .. }) => {
                return Err(ReactiveError::WriteOnlyAccessor {
                    member: name.to_string(),
                })
            }
            Some(Member::Method(_)) => MemberKind::Method,
            None => {
                return Err(ReactiveError::UnknownMember {
                    member: name.to_string(),
                })
            }
        };
        Ok(SlotBinding::Member {
            record: record.clone(),
            name: Arc::clone(name),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Record;

    #[test]
    fn test_member_kinds() {
        let record = Value::from(
            Record::new()
                .with_field("f", 1)
                .with_accessor("a", Some(Arc::new(|_: &Record| Value::from(2))), None)
                .with_accessor("w", None, Some(Arc::new(|_: &Record, _: Value| {})))
                .with_method("m", |_, _| Value::Null),
        );

        let kind = |name: &str| RecordKind.bind_slot(&record, &Index::from(name)).map(|b| b.member_kind());
        assert_eq!(kind("f"), Ok(Some(MemberKind::Field)));
        assert_eq!(kind("a"), Ok(Some(MemberKind::Accessor)));
        assert_eq!(kind("m"), Ok(Some(MemberKind::Method)));
        assert_eq!(
            kind("w"),
            Err(ReactiveError::WriteOnlyAccessor { member: "w".into() })
        );
        assert_eq!(
            kind("nope"),
            Err(ReactiveError::UnknownMember { member: "nope".into() })
        );
    }

    #[test]
    fn test_positional_index_is_rejected() {
        let record = Value::from(Record::new());
        assert!(matches!(
            RecordKind.bind_slot(&record, &Index::from(0usize)),
            Err(ReactiveError::InvalidIndex { .. })
        ));
    }
}
