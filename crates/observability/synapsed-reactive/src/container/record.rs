//! Record implementation - named members that are plain fields, accessors or methods

use super::{Hooks, SlotBatch, SlotWrite};
use crate::types::{ChangeKind, ContainerId, Index, ReactiveError, ReactiveResult};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

pub type Getter = Arc<dyn Fn(&Record) -> Value + Send + Sync>;
pub type Setter = Arc<dyn Fn(&Record, Value) + Send + Sync>;
pub type MethodFn = Arc<dyn Fn(&Record, &[Value]) -> Value + Send + Sync>;

/// A named member of a record
#[derive(Clone)]
pub enum Member {
    Field(Value),
    Accessor {
        get: Option<Getter>,
        set: Option<Setter>,
    },
    Method(MethodFn),
}

impl Member {
    pub fn is_readable(&self) -> bool {
        match self {
            Member::Field(_) => true,
            Member::Accessor { get, .. } => get.is_some(),
            Member::Method(_) => false,
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Field(value) => f.debug_tuple("Field").field(value).finish(),
            Member::Accessor { get, set } => f
                .debug_struct("Accessor")
                .field("readable", &get.is_some())
                .field("writable", &set.is_some())
                .finish(),
            Member::Method(_) => f.write_str("Method"),
        }
    }
}

struct RecordInner {
    id: ContainerId,
    members: RwLock<IndexMap<Arc<str>, Member>>,
    hooks: Hooks<SlotBatch>,
}

/// Mutable record with identity
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

impl Record {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RecordInner {
                id: ContainerId::next(),
                members: RwLock::new(IndexMap::new()),
                hooks: Hooks::new(),
            }),
        }
    }

    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Arc<str>>,
        V: Into<Value>,
    {
        let record = Self::new();
        {
            let mut members = record.inner.members.write();
            for (name, value) in fields {
                members.insert(name.into(), Member::Field(value.into()));
            }
        }
        record
    }

    /// Builder-style field definition; no hook runs
    pub fn with_field(self, name: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.define(name, Member::Field(value.into()));
        self
    }

    pub fn with_accessor(
        self,
        name: impl Into<Arc<str>>,
        get: Option<Getter>,
        set: Option<Setter>,
    ) -> Self {
        self.define(name, Member::Accessor { get, set });
        self
    }

    pub fn with_method<F>(self, name: impl Into<Arc<str>>, method: F) -> Self
    where
        F: Fn(&Record, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.define(name, Member::Method(Arc::new(method)));
        self
    }

    /// Defines or replaces a member without notifying hooks
    pub fn define(&self, name: impl Into<Arc<str>>, member: Member) {
        self.inner.members.write().insert(name.into(), member);
    }

    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    pub(crate) fn hooks(&self) -> &Hooks<SlotBatch> {
        &self.inner.hooks
    }

    pub fn member(&self, name: &str) -> Option<Member> {
        self.inner.members.read().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.members.read().contains_key(name)
    }

    pub fn member_names(&self) -> Vec<Arc<str>> {
        self.inner.members.read().keys().cloned().collect()
    }

    /// Fields and accessors with a getter
    pub fn readable_names(&self) -> Vec<Arc<str>> {
        self.inner
            .members
            .read()
            .iter()
            .filter(|(_, member)| member.is_readable())
            .map(|(name, _)| Arc::clone(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.members.read().is_empty()
    }

    /// Reads a member. Accessors run their getter; methods and missing
    /// members read as `Undefined`.
    pub fn get(&self, name: &str) -> Value {
        match self.member(name) {
            Some(Member::Field(value)) => value,
            Some(Member::Accessor { get: Some(get), .. }) => get(self),
            _ => Value::Undefined,
        }
    }

    /// Assigns a member and notifies hooks if the slot changed
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        if let Some(write) = self.write(name, value) {
            self.inner.hooks.notify(&SlotBatch::new(vec![write]));
        }
    }

    /// Removes a member. Returns `false` if it did not exist.
    pub fn delete(&self, name: &str) -> bool {
        let removed = self.inner.members.write().shift_remove(name);
        match removed {
            Some(member) => {
                let old_value = match member {
                    Member::Field(value) => value,
                    _ => Value::Undefined,
                };
                self.inner.hooks.notify(&SlotBatch::new(vec![SlotWrite::delete(
                    Index::name(name),
                    old_value,
                )]));
                true
            }
            None => false,
        }
    }

    /// Invokes a method member and reports its return value
    pub fn call(&self, name: &str, args: &[Value]) -> ReactiveResult<Value> {
        let result = self.invoke_untracked(name, args)?;
        self.inner.hooks.notify(&SlotBatch::new(vec![SlotWrite {
            index: Index::name(name),
            old_value: Value::Undefined,
            new_value: result.clone(),
            is_new: false,
            kind: ChangeKind::Invoke,
        }]));
        Ok(result)
    }

    /// Invokes a method member without notifying hooks
    pub fn invoke_untracked(&self, name: &str, args: &[Value]) -> ReactiveResult<Value> {
        match self.member(name) {
            Some(Member::Method(method)) => Ok(method(self, args)),
            Some(_) => Err(ReactiveError::NotCallable {
                member: name.to_string(),
            }),
            None => Err(ReactiveError::UnknownMember {
                member: name.to_string(),
            }),
        }
    }

    /// Assigns a member without notifying hooks. Methods and accessors
    /// without a setter are left untouched.
    pub fn put_untracked(&self, name: &str, value: Value) -> ReactiveResult<()> {
        match self.member(name) {
            Some(Member::Accessor { set: Some(set), .. }) => set(self, value),
            Some(Member::Accessor { set: None, .. }) | Some(Member::Method(_)) => {
                return Err(ReactiveError::NotWritable {
                    member: name.to_string(),
                });
            }
            Some(Member::Field(_)) | None => {
                self.inner
                    .members
                    .write()
                    .insert(Arc::from(name), Member::Field(value));
            }
        }
        Ok(())
    }

    fn write(&self, name: &str, value: Value) -> Option<SlotWrite> {
        let accessor = match self.member(name) {
            Some(Member::Accessor { get, set }) => Some((get, set)),
            _ => None,
        };

        if let Some((get, set)) = accessor {
            let before = get.as_ref().map(|get| get(self));
            if let Some(set) = set {
                set(self, value.clone());
            }
            let after = get.as_ref().map(|get| get(self)).unwrap_or(value);
            return match before {
                Some(before) if before == after => None,
                before => Some(SlotWrite::assign(
                    Index::name(name),
                    before.unwrap_or_default(),
                    after,
                    false,
                )),
            };
        }

        let mut members = self.inner.members.write();
        let previous = members.insert(Arc::from(name), Member::Field(value.clone()));
        drop(members);

        match previous {
            Some(Member::Field(old)) if old == value => None,
            Some(Member::Field(old)) => Some(SlotWrite::assign(Index::name(name), old, value, false)),
            Some(_) => Some(SlotWrite::assign(Index::name(name), Value::Undefined, value, false)),
            None => Some(SlotWrite::assign(Index::name(name), Value::Undefined, value, true)),
        }
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.inner.id)
            .field("members", &self.member_names())
            .finish()
    }
}
