//! Core types for the reactivity runtime

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Result type for reactive operations
pub type ReactiveResult<T> = Result<T, ReactiveError>;

/// Errors that can occur while observing containers
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReactiveError {
    /// The watched name is neither a field, an accessor nor a method
    #[error("Member '{member}' is neither a field, an accessor nor a method")]
    UnknownMember { member: String },
    /// The watched accessor cannot be read
    #[error("Accessor '{member}' has no getter and cannot be watched")]
    WriteOnlyAccessor { member: String },
    /// The member exists but is not a method
    #[error("Member '{member}' is not callable")]
    NotCallable { member: String },
    /// The member is a method or an accessor without a setter
    #[error("Member '{member}' cannot be assigned")]
    NotWritable { member: String },
    #[error("Value of kind '{kind}' is not a container")]
    NotAContainer { kind: &'static str },
    #[error("Container of kind '{kind}' has no addressable slots")]
    NoAddressableSlots { kind: &'static str },
    #[error("No adapter registered for value of kind '{kind}'")]
    NoAdapter { kind: &'static str },
    #[error("Invalid index {index} for container of kind '{kind}'")]
    InvalidIndex { index: String, kind: &'static str },
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    /// The injected clone strategy rejected a value
    #[error("Failed to clone state '{key}': {message}. Supply a custom DeepClone strategy that supports this value")]
    Clone { key: String, message: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Resource disposed: {0}")]
    Disposed(String),
}

impl From<config::ConfigError> for ReactiveError {
    fn from(err: config::ConfigError) -> Self {
        ReactiveError::Config(err.to_string())
    }
}

/// Process-unique identity of a mutable container
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerId(u64);

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

impl ContainerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies the mutating call that produced a batch of change records.
///
/// Every record emitted for one call (e.g. all indices touched by a
/// `splice`) carries the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(u64);

static NEXT_MUTATION_ID: AtomicU64 = AtomicU64::new(1);

impl MutationId {
    pub(crate) fn next() -> Self {
        Self(NEXT_MUTATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Stable external identifier of an observer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObserverId(Arc<str>);

impl ObserverId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a watch rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WatchRuleId(Uuid);

impl WatchRuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WatchRuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WatchRuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned when registering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Addressable member of a container
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Index {
    /// Record member or date virtual property
    Name(Arc<str>),
    /// Array position
    Position(usize),
    /// Map key, or a set item doubling as its own key
    Key(Value),
}

impl Index {
    pub fn name(name: impl Into<Arc<str>>) -> Self {
        Index::Name(name.into())
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Index::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_position(&self) -> Option<usize> {
        match self {
            Index::Position(position) => Some(*position),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&Value> {
        match self {
            Index::Key(key) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::Name(name) => write!(f, "{name:?}"),
            Index::Position(position) => write!(f, "[{position}]"),
            Index::Key(key) => write!(f, "<{key:?}>"),
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::Name(name) => f.write_str(name),
            Index::Position(position) => write!(f, "{position}"),
            Index::Key(key) => write!(f, "{key:?}"),
        }
    }
}

impl From<&str> for Index {
    fn from(name: &str) -> Self {
        Index::Name(name.into())
    }
}

impl From<String> for Index {
    fn from(name: String) -> Self {
        Index::Name(name.into())
    }
}

impl From<usize> for Index {
    fn from(position: usize) -> Self {
        Index::Position(position)
    }
}

impl From<Value> for Index {
    fn from(key: Value) -> Self {
        Index::Key(key)
    }
}

/// What kind of write produced a change record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Slot created or overwritten
    Assign,
    /// Slot removed
    Delete,
    /// Method invoked; the new value is its return value
    Invoke,
    /// Deferred value settled or stream emitted
    Settled,
}

/// One (container, slot) step of a change chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSegment {
    pub container: Value,
    pub index: Index,
}

impl ChainSegment {
    pub fn new(container: Value, index: Index) -> Self {
        Self { container, index }
    }
}

/// A single observed mutation
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    /// Ordered root → leaf
    pub chain: Vec<ChainSegment>,
    pub slot: Index,
    pub new_value: Value,
    /// Slot did not exist before the write
    pub is_new: bool,
    /// Container owning `slot`
    pub target: Value,
    pub kind: ChangeKind,
    pub mutation: MutationId,
}

impl ChangeRecord {
    /// Returns a copy of this record seen from one level up
    pub fn prefixed(&self, container: &Value, index: &Index) -> Self {
        let mut chain = Vec::with_capacity(self.chain.len() + 1);
        chain.push(ChainSegment::new(container.clone(), index.clone()));
        chain.extend(self.chain.iter().cloned());
        Self {
            chain,
            ..self.clone()
        }
    }

    pub fn leaf(&self) -> Option<&ChainSegment> {
        self.chain.last()
    }

    pub fn root(&self) -> Option<&ChainSegment> {
        self.chain.first()
    }
}
