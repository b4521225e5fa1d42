//! # Synapsed Reactive
//!
//! Fine-grained reactivity runtime: watch one slot of a mutable container and
//! get notified exactly when its effective value changes, optionally
//! following nested containers held in the slot.
//!
//! ## Key Components
//!
//! - **Containers**: `Record`, `Array`, `Map`, `Set`, `Date`, `Deferred` and
//!   `Stream` handles whose mutating methods report per-slot writes
//! - **Adapters**: turn container writes into `ChangeRecord`s, one adapter per
//!   container and slot filter
//! - **Dispatcher**: picks the container kind for a value, first match by
//!   priority, extensible with custom kinds
//! - **Observers**: shared slot observers and observer groups handed out as
//!   reference-counted `Observation` leases
//! - **StateManager**: tracks watched state, emits de-duplicated change
//!   events in cycles and rebinds watches when a container is replaced
//!
//! ```no_run
//! use synapsed_reactive::{Record, StateManager, Value};
//!
//! let manager = StateManager::default();
//! let user = Record::new().with_field("name", "Ada");
//! let context = Value::from(user.clone());
//!
//! manager.watch_state(&context, "name", None)?;
//! manager.subscribe(|event| {
//!     if let Some(change) = event.as_change() {
//!         println!("{} -> {:?}", change.index, change.new_value);
//!     }
//!     Ok(())
//! });
//! user.set("name", "Grace");
//! # Ok::<(), synapsed_reactive::ReactiveError>(())
//! ```

pub mod adapter;
pub mod config;
pub mod container;
pub mod dispatcher;
pub mod factory;
pub mod object_state;
pub mod observer;
pub mod registry;
pub mod services;
pub mod slot;
pub mod state_manager;
pub mod types;
pub mod value;
pub mod watch_rule;

pub use adapter::{AsyncAdapter, ChainShape, DateAdapter, DeferredKind, SlotAdapter, StreamKind};
pub use config::ReactiveConfig;
pub use container::{
    Array, AsyncSource, Date, DateMutation, DateProperty, Deferred, Map, Member, Record, Set,
    SlotBatch, SlotContainer, SlotWrite, Stream,
};
pub use dispatcher::{ContainerKind, Dispatcher, SlotFilter};
pub use factory::{AdapterMode, ObserverFactory, SlotMember};
pub use object_state::{ObjectStateManager, WatchedState};
pub use observer::{NullObserver, Observation, Observer, ObserverCore, ObserverGroup, Ownership};
pub use registry::{GroupKey, GroupedRegistry, Registered, ReferenceCountedRegistry, RegistryPolicy};
pub use services::{
    DeepClone, DeepCloner, EqualityService, ErrorEntry, ErrorLog, IdGenerator, Services,
    StructuralEquality, TracingErrorLog, UuidGenerator,
};
pub use slot::{ArrayKind, DateKind, MapKind, MemberKind, RecordKind, SetKind, SlotBinding, SlotObserver};
pub use state_manager::{StateChange, StateEvent, StateListener, StateManager};
pub use types::{
    ChainSegment, ChangeKind, ChangeRecord, ContainerId, Index, ListenerId, MutationId,
    ObserverId, ReactiveError, ReactiveResult, WatchRuleId,
};
pub use value::Value;
pub use watch_rule::WatchRule;
