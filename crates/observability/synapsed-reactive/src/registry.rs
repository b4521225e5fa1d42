//! Reference-counted registry implementation - shared get-or-create with dispose on last release

use crate::types::ReactiveResult;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Describes how a registry derives ids, builds instances and tears them down
pub trait RegistryPolicy: Send + Sync {
    /// Request data needed to build an instance
    type Key;
    type Id: Clone + Eq + Hash + fmt::Debug + Send + Sync;
    type Instance: Clone + Send + Sync;

    fn instance_id(&self, key: &Self::Key) -> Self::Id;

    fn create_instance(&self, key: Self::Key, id: &Self::Id) -> ReactiveResult<Self::Instance>;

    /// Runs once the instance is visible in the registry. Requests for the
    /// same id made from here share the instance instead of recursing.
    fn on_registered(&self, _id: &Self::Id, _instance: &Self::Instance) -> ReactiveResult<()> {
        Ok(())
    }

    /// Runs exactly once, when the reference count reaches zero
    fn dispose_instance(&self, _id: &Self::Id, _instance: Self::Instance) {}
}

/// Result of a `create` call
#[derive(Debug, Clone)]
pub struct Registered<I, V> {
    pub id: I,
    pub instance: V,
    pub ref_count: u32,
    /// Whether this call built the instance
    pub is_new: bool,
}

struct Slot<V> {
    instance: V,
    ref_count: u32,
}

/// Hands out one shared instance per id and counts references to it
pub struct ReferenceCountedRegistry<P: RegistryPolicy> {
    policy: P,
    entries: Mutex<HashMap<P::Id, Slot<P::Instance>>>,
}

impl<P: RegistryPolicy> ReferenceCountedRegistry<P> {
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Returns the instance for `key`, building it on first request.
    ///
    /// Instances are built without the registry lock held, so a policy may
    /// request other instances while building.
    pub fn create(&self, key: P::Key) -> ReactiveResult<Registered<P::Id, P::Instance>> {
        let id = self.policy.instance_id(&key);
        if let Some(registered) = self.acquire_existing(&id) {
            return Ok(registered);
        }

        let instance = self.policy.create_instance(key, &id)?;
        let raced = {
            let mut entries = self.entries.lock();
            match entries.entry(id.clone()) {
                Entry::Occupied(mut occupied) => {
                    let slot = occupied.get_mut();
                    slot.ref_count += 1;
                    Some(Registered {
                        id: id.clone(),
                        instance: slot.instance.clone(),
                        ref_count: slot.ref_count,
                        is_new: false,
                    })
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(Slot {
                        instance: instance.clone(),
                        ref_count: 1,
                    });
                    None
                }
            }
        };
        if let Some(registered) = raced {
            self.policy.dispose_instance(&id, instance);
            return Ok(registered);
        }

        if let Err(err) = self.policy.on_registered(&id, &instance) {
            tracing::debug!(id = ?id, error = %err, "Registration rolled back");
            self.release(&id);
            return Err(err);
        }

        let ref_count = self.ref_count(&id);
        Ok(Registered {
            id,
            instance,
            ref_count,
            is_new: true,
        })
    }

    fn acquire_existing(&self, id: &P::Id) -> Option<Registered<P::Id, P::Instance>> {
        let mut entries = self.entries.lock();
        let slot = entries.get_mut(id)?;
        slot.ref_count += 1;
        Some(Registered {
            id: id.clone(),
            instance: slot.instance.clone(),
            ref_count: slot.ref_count,
            is_new: false,
        })
    }

    /// Drops one reference. Returns the remaining count, or `None` if the id
    /// is unknown (releasing an already disposed instance is a no-op).
    pub fn release(&self, id: &P::Id) -> Option<u32> {
        let disposed = {
            let mut entries = self.entries.lock();
            let slot = entries.get_mut(id)?;
            slot.ref_count = slot.ref_count.saturating_sub(1);
            if slot.ref_count > 0 {
                return Some(slot.ref_count);
            }
            entries.remove(id)
        };
        if let Some(slot) = disposed {
            self.policy.dispose_instance(id, slot.instance);
        }
        Some(0)
    }

    pub fn get(&self, id: &P::Id) -> Option<P::Instance> {
        self.entries.lock().get(id).map(|slot| slot.instance.clone())
    }

    pub fn ref_count(&self, id: &P::Id) -> u32 {
        self.entries
            .lock()
            .get(id)
            .map(|slot| slot.ref_count)
            .unwrap_or(0)
    }

    pub fn contains(&self, id: &P::Id) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<P::Id> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Instances whose id matches `filter`
    pub fn find<F>(&self, filter: F) -> Vec<(P::Id, P::Instance)>
    where
        F: Fn(&P::Id) -> bool,
    {
        self.entries
            .lock()
            .iter()
            .filter(|(id, _)| filter(id))
            .map(|(id, slot)| (id.clone(), slot.instance.clone()))
            .collect()
    }
}

impl<P: RegistryPolicy> fmt::Debug for ReferenceCountedRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceCountedRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

/// Two-level id: a group (usually a container) and a member within it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey<G, M> {
    pub group: G,
    pub member: M,
}

impl<G, M> GroupKey<G, M> {
    pub fn new(group: G, member: M) -> Self {
        Self { group, member }
    }
}

/// Registry whose ids are grouped, with lookup of every member of a group
pub struct GroupedRegistry<P, G, M>
where
    P: RegistryPolicy<Id = GroupKey<G, M>>,
{
    registry: ReferenceCountedRegistry<P>,
    _ids: PhantomData<fn() -> (G, M)>,
}

impl<P, G, M> GroupedRegistry<P, G, M>
where
    P: RegistryPolicy<Id = GroupKey<G, M>>,
    G: Clone + Eq + Hash + fmt::Debug + Send + Sync,
    M: Clone + Eq + Hash + fmt::Debug + Send + Sync,
{
    pub fn new(policy: P) -> Self {
        Self {
            registry: ReferenceCountedRegistry::new(policy),
            _ids: PhantomData,
        }
    }

    pub fn create(&self, key: P::Key) -> ReactiveResult<Registered<GroupKey<G, M>, P::Instance>> {
        self.registry.create(key)
    }

    pub fn release(&self, id: &GroupKey<G, M>) -> Option<u32> {
        self.registry.release(id)
    }

    pub fn get(&self, id: &GroupKey<G, M>) -> Option<P::Instance> {
        self.registry.get(id)
    }

    pub fn ref_count(&self, id: &GroupKey<G, M>) -> u32 {
        self.registry.ref_count(id)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Every (member, instance) currently registered under `group`
    pub fn members_of(&self, group: &G) -> Vec<(M, P::Instance)> {
        self.registry
            .find(|id| &id.group == group)
            .into_iter()
            .map(|(id, instance)| (id.member, instance))
            .collect()
    }
}

impl<P, G, M> fmt::Debug for GroupedRegistry<P, G, M>
where
    P: RegistryPolicy<Id = GroupKey<G, M>>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupedRegistry")
            .field("entries", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReactiveError;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Counting {
        created: Mutex<Vec<String>>,
        disposed: Mutex<Vec<String>>,
    }

    impl RegistryPolicy for Arc<Counting> {
        type Key = String;
        type Id = String;
        type Instance = Arc<String>;

        fn instance_id(&self, key: &String) -> String {
            key.to_lowercase()
        }

        fn create_instance(&self, key: String, id: &String) -> ReactiveResult<Arc<String>> {
            if key.is_empty() {
                return Err(ReactiveError::Config("empty key".into()));
            }
            self.created.lock().push(id.clone());
            Ok(Arc::new(key))
        }

        fn dispose_instance(&self, id: &String, _instance: Arc<String>) {
            self.disposed.lock().push(id.clone());
        }
    }

    #[test]
    fn test_same_id_shares_instance() {
        let policy = Arc::new(Counting::default());
        let registry = ReferenceCountedRegistry::new(Arc::clone(&policy));

        let first = registry.create("Alpha".to_string()).unwrap();
        let second = registry.create("ALPHA".to_string()).unwrap();

        assert!(first.is_new);
        assert!(!second.is_new);
        assert!(Arc::ptr_eq(&first.instance, &second.instance));
        assert_eq!(second.ref_count, 2);
        assert_eq!(policy.created.lock().len(), 1);
    }

    #[test]
    fn test_dispose_runs_once_at_zero() {
        let policy = Arc::new(Counting::default());
        let registry = ReferenceCountedRegistry::new(Arc::clone(&policy));

        registry.create("a".to_string()).unwrap();
        registry.create("a".to_string()).unwrap();

        assert_eq!(registry.release(&"a".to_string()), Some(1));
        assert!(policy.disposed.lock().is_empty());
        assert_eq!(registry.release(&"a".to_string()), Some(0));
        assert_eq!(registry.release(&"a".to_string()), None);
        assert_eq!(*policy.disposed.lock(), vec!["a".to_string()]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failed_creation_registers_nothing() {
        let policy = Arc::new(Counting::default());
        let registry = ReferenceCountedRegistry::new(Arc::clone(&policy));

        assert!(registry.create(String::new()).is_err());
        assert!(registry.is_empty());
    }

    struct Grouped;

    impl RegistryPolicy for Grouped {
        type Key = (u32, &'static str);
        type Id = GroupKey<u32, &'static str>;
        type Instance = u32;

        fn instance_id(&self, key: &Self::Key) -> Self::Id {
            GroupKey::new(key.0, key.1)
        }

        fn create_instance(&self, key: Self::Key, _id: &Self::Id) -> ReactiveResult<u32> {
            Ok(key.0 * 10)
        }
    }

    #[test]
    fn test_members_of_group() {
        let registry = GroupedRegistry::new(Grouped);
        registry.create((1, "a")).unwrap();
        registry.create((1, "b")).unwrap();
        registry.create((2, "a")).unwrap();

        let mut members: Vec<_> = registry.members_of(&1).into_iter().map(|(m, _)| m).collect();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);
        assert_eq!(registry.members_of(&3).len(), 0);
    }
}
