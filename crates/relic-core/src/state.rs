// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! World state: the id → object map, its copy-on-write children, and the
//! optimistic transactional commit protocol.
//!
//! A root state owns its objects. [`State::atomic`] forks an ephemeral child
//! that resolves reads by cloning parent objects on demand, runs the user
//! function against it, then validates and merges the child back under both
//! mutexes — retrying the whole function on conflict. The shared next-id and
//! next-version counters live beside the root and are only ever touched with
//! atomic fetch-add, never under a mutex.
//!
//! # Lock order
//!
//! Child state before parent state, always; object component locks are
//! leaves. Commit validation reads object versions and modified flags from
//! atomics so it never takes an object lock while holding state locks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::ident::{IdSet, ObjectId};
use crate::object::Object;
use crate::registry::{self, ComponentType, Factory};

/// Shared monotonic counters owned by a root state and referenced by every
/// descendant.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    next_id: AtomicU64,
    next_version: AtomicU64,
}

impl Counters {
    /// Allocates the next object identifier. Identifiers are never reused.
    fn alloc_id(&self) -> ObjectId {
        ObjectId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Allocates the next version witness.
    pub(crate) fn alloc_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last allocated identifier (the serialized counter value).
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Restores the identifier counter from a decoded stream.
    pub(crate) fn restore_next_id(&self, value: u64) {
        self.next_id.store(value, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct StateInner {
    /// `None` is a tombstone: deleted relative to the ancestors.
    pub(crate) objects: FxHashMap<ObjectId, Option<Object>>,
    /// Component type → ids at *this* level that carry it directly.
    pub(crate) by_component: FxHashMap<ComponentType, IdSet>,
    /// id → object version observed at deletion time.
    pub(crate) deleted: FxHashMap<ObjectId, u64>,
    /// Bumped on every deletion; children snapshot it at fork.
    pub(crate) delete_gen: u64,
    /// The parent generation this state observed when it was forked.
    pub(crate) base_gen: u64,
}

/// Errors surfaced by in-memory state operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    /// Two factories produced the same component type for one object.
    #[error("duplicate component {name} on one object")]
    DuplicateComponent {
        /// Wire type name of the duplicated component.
        name: &'static str,
    },
    /// A factory produced a component whose type was never registered.
    #[error("component {name} is not registered")]
    UnregisteredComponent {
        /// Wire type name of the unregistered component.
        name: &'static str,
    },
    /// The object's owning state has been dropped.
    #[error("object {id} is no longer attached to a state")]
    ObjectDetached {
        /// Identifier of the detached object.
        id: ObjectId,
    },
}

/// A world: a coherent set of objects identified by id, optionally forked
/// from a parent state.
///
/// Roots are built with [`State::new`]; transactional children exist only
/// inside [`State::atomic`]. All map access takes the state's mutex; the
/// mutex is never held across user code.
pub struct State {
    pub(crate) parent: Option<Arc<State>>,
    pub(crate) counters: Arc<Counters>,
    pub(crate) inner: Mutex<StateInner>,
}

impl State {
    /// Creates an empty root state with fresh shared counters.
    ///
    /// The built-in component factories are registered here, so they are
    /// available before the first object exists.
    #[must_use]
    pub fn new() -> Arc<Self> {
        crate::components::register_builtins();
        Arc::new(Self {
            parent: None,
            counters: Arc::new(Counters::default()),
            inner: Mutex::new(StateInner::default()),
        })
    }

    /// Creates a parentless object from `factories`, in argument order.
    ///
    /// The new object is born modified and indexed under every component
    /// type it carries.
    ///
    /// # Errors
    /// [`StateError::UnregisteredComponent`] if a factory builds a component
    /// whose type name is unknown to the registry;
    /// [`StateError::DuplicateComponent`] if two factories produce the same
    /// component type.
    pub fn create(self: &Arc<Self>, factories: &[Factory]) -> Result<(ObjectId, Object), StateError> {
        self.create_child(ObjectId::NONE, factories)
    }

    pub(crate) fn create_child(
        self: &Arc<Self>,
        parent: ObjectId,
        factories: &[Factory],
    ) -> Result<(ObjectId, Object), StateError> {
        let id = self.counters.alloc_id();
        let object = Object::bare(id, parent, self, self.counters.alloc_version(), true);
        let owner = object.owner();
        let mut types = Vec::with_capacity(factories.len());
        for factory in factories {
            let component = factory.as_ref()(owner.clone());
            let name = component.type_name();
            let Some(ty) = registry::lookup(name) else {
                return Err(StateError::UnregisteredComponent { name });
            };
            if !object.install_component(ty, component) {
                return Err(StateError::DuplicateComponent { name });
            }
            types.push(ty);
        }
        let mut inner = self.inner.lock();
        inner.objects.insert(id, Some(object.clone()));
        for ty in types {
            inner.by_component.entry(ty).or_default().add(id);
        }
        Ok((id, object))
    }

    /// Resolves `id` in this state.
    ///
    /// A local tombstone reports `None`. A miss asks the parent chain and
    /// installs a local clone (clone-on-read), so the caller owns what it
    /// observes for the rest of the transaction.
    #[must_use]
    pub fn get(self: &Arc<Self>, id: ObjectId) -> Option<Object> {
        if id.is_none() {
            return None;
        }
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.objects.get(&id) {
            return slot.clone();
        }
        let parent = self.parent.as_ref()?;
        let found = parent.get(id)?;
        let clone = found.clone_into(self);
        inner.objects.insert(id, Some(clone.clone()));
        for ty in clone.component_types() {
            inner.by_component.entry(ty).or_default().add(id);
        }
        Some(clone)
    }

    /// Deletes `id` from this state.
    ///
    /// The local slot becomes a tombstone, the pre-deletion version is
    /// recorded for commit-time conflict detection, and the deletion
    /// generation advances. Deleting an id that does not resolve is a no-op.
    pub fn delete(self: &Arc<Self>, id: ObjectId) {
        let Some(object) = self.get(id) else {
            return;
        };
        let mut inner = self.inner.lock();
        inner.deleted.insert(id, object.version());
        inner.objects.insert(id, None);
        inner.delete_gen += 1;
    }

    /// All live ids visible from this state, ascending.
    ///
    /// The occurrence nearest to this state decides: a local tombstone hides
    /// every ancestor occurrence.
    #[must_use]
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut seen = FxHashSet::default();
        let mut live = IdSet::new();
        self.collect_ids(&mut seen, &mut live);
        live.as_slice().to_vec()
    }

    fn collect_ids(&self, seen: &mut FxHashSet<ObjectId>, live: &mut IdSet) {
        let inner = self.inner.lock();
        for (id, slot) in &inner.objects {
            if seen.insert(*id) && slot.is_some() {
                live.add(*id);
            }
        }
        if let Some(parent) = &self.parent {
            parent.collect_ids(seen, live);
        }
    }

    /// Live ids carrying component type `ty`, unioned over this state and
    /// its ancestors, ascending.
    #[must_use]
    pub fn by_component(&self, ty: ComponentType) -> Vec<ObjectId> {
        let mut nearest_live: FxHashMap<ObjectId, bool> = FxHashMap::default();
        let mut union = IdSet::new();
        self.collect_by_component(ty, &mut nearest_live, &mut union);
        union
            .iter()
            .filter(|id| nearest_live.get(id).copied().unwrap_or(false))
            .collect()
    }

    fn collect_by_component(
        &self,
        ty: ComponentType,
        nearest_live: &mut FxHashMap<ObjectId, bool>,
        union: &mut IdSet,
    ) {
        let inner = self.inner.lock();
        for (id, slot) in &inner.objects {
            nearest_live.entry(*id).or_insert_with(|| slot.is_some());
        }
        if let Some(ids) = inner.by_component.get(&ty) {
            for id in ids {
                union.add(id);
            }
        }
        if let Some(parent) = &self.parent {
            parent.collect_by_component(ty, nearest_live, union);
        }
    }

    /// Runs `f` against a freshly forked child state and commits the child
    /// under optimistic concurrency, retrying `f` on conflict.
    ///
    /// `f` returning `false` drops the child and aborts without retrying.
    /// Retries are unbounded, so `f` must be free of non-idempotent side
    /// effects. Calling `atomic` again from inside `f` (on any state of the
    /// same hierarchy) is not supported and its behavior is undefined.
    pub fn atomic<F>(self: &Arc<Self>, mut f: F) -> bool
    where
        F: FnMut(&Arc<State>) -> bool,
    {
        #[cfg(feature = "telemetry")]
        let mut attempts: u64 = 0;
        loop {
            #[cfg(feature = "telemetry")]
            {
                attempts += 1;
            }
            let child = self.fork();
            if !f(&child) {
                return false;
            }
            if self.try_commit(&child) {
                #[cfg(feature = "telemetry")]
                crate::telemetry::commit(attempts);
                return true;
            }
            #[cfg(feature = "telemetry")]
            crate::telemetry::conflict(attempts);
        }
    }

    /// Forks an ephemeral child pointing at `self`, snapshotting the
    /// deletion map and the observed deletion generation.
    fn fork(self: &Arc<Self>) -> Arc<State> {
        let inner = self.inner.lock();
        Arc::new(State {
            parent: Some(Arc::clone(self)),
            counters: Arc::clone(&self.counters),
            inner: Mutex::new(StateInner {
                objects: FxHashMap::default(),
                by_component: FxHashMap::default(),
                deleted: inner.deleted.clone(),
                delete_gen: inner.delete_gen,
                base_gen: inner.delete_gen,
            }),
        })
    }

    /// Validates `child` against `self` and applies it. Returns `false` on
    /// conflict (caller retries).
    fn try_commit(self: &Arc<Self>, child: &Arc<State>) -> bool {
        let mut child_inner = child.inner.lock();
        let mut inner = self.inner.lock();

        // Validate: deletions that happened here after the fork must agree
        // with what the child observed.
        if inner.delete_gen > child_inner.base_gen {
            for (id, version) in &inner.deleted {
                if let Some(observed) = child_inner.deleted.get(id) {
                    if observed != version {
                        return false;
                    }
                }
            }
        }
        // Validate: the child's tombstones and modified objects must have
        // been derived from the versions currently installed here.
        for (id, slot) in &child_inner.objects {
            match slot {
                None => {
                    if let Some(Some(current)) = inner.objects.get(id) {
                        if child_inner.deleted.get(id).copied() != Some(current.version()) {
                            return false;
                        }
                    }
                }
                Some(object) if object.is_modified() => {
                    if let Some(Some(current)) = inner.objects.get(id) {
                        if current.version() != object.version() {
                            return false;
                        }
                    }
                }
                Some(_) => {}
            }
        }

        // Apply.
        let tombstoned: Vec<ObjectId> = child_inner
            .objects
            .iter()
            .filter(|(_, slot)| slot.is_none())
            .map(|(id, _)| *id)
            .collect();
        for (id, slot) in child_inner.objects.drain() {
            match slot {
                None => {
                    inner.objects.insert(id, None);
                }
                Some(object) => {
                    if object.is_modified() {
                        object.set_version(self.counters.alloc_version());
                        object.retarget(self);
                        inner.objects.insert(id, Some(object));
                    }
                }
            }
        }
        for (ty, ids) in child_inner.by_component.drain() {
            let entry = inner.by_component.entry(ty).or_default();
            for id in &ids {
                entry.add(id);
            }
        }
        for id in &tombstoned {
            for ids in inner.by_component.values_mut() {
                ids.remove(*id);
            }
        }
        inner.deleted = std::mem::take(&mut child_inner.deleted);
        inner.delete_gen = child_inner.delete_gen;
        true
    }
}

impl core::fmt::Debug for State {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("State")
            .field("root", &self.parent.is_none())
            .field("objects", &inner.objects.len())
            .field("deleted", &inner.deleted.len())
            .finish_non_exhaustive()
    }
}
