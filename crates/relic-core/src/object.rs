// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Objects: identified aggregates of components.
//!
//! An [`Object`] is a cheap-to-clone handle onto shared object storage. The
//! storage carries the identifier, the optional parent identifier, a weak
//! back-pointer to the owning state (retargeted when a transaction commits
//! the object into its parent state), the monotonic version used as the
//! optimistic-commit witness, the transient modified flag, and the component
//! map.
//!
//! # Lock discipline
//!
//! The component map sits behind one mutex per object; [`ComponentRef`] and
//! [`ComponentMut`] are projections of that lock. Version and modified flag
//! are atomics *outside* the mutex so commit validation never touches object
//! locks while holding state locks. Parent walks only ever lock objects with
//! strictly smaller identifiers (a parent always predates its children), so
//! chained guards cannot deadlock.

use std::any::Any;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};

use crate::component::Component;
use crate::ident::ObjectId;
use crate::registry::{ComponentType, Factory};
use crate::state::{State, StateError};

pub(crate) type ComponentMap = BTreeMap<ComponentType, Box<dyn Component>>;

struct ObjectCore {
    id: ObjectId,
    /// Identifier of the creating object, [`ObjectId::NONE`] for roots.
    /// Fixed at construction; never serialized.
    parent: ObjectId,
    state: RwLock<Weak<State>>,
    version: AtomicU64,
    modified: AtomicBool,
    components: Arc<Mutex<ComponentMap>>,
}

/// Handle onto one object in a state hierarchy.
///
/// Clones of the handle refer to the same underlying object. Objects are
/// created through [`State::create`] or [`Object::create`] and reach game
/// code again via [`State::get`].
#[derive(Clone)]
pub struct Object {
    core: Arc<ObjectCore>,
}

impl Object {
    pub(crate) fn bare(
        id: ObjectId,
        parent: ObjectId,
        state: &Arc<State>,
        version: u64,
        modified: bool,
    ) -> Self {
        Self {
            core: Arc::new(ObjectCore {
                id,
                parent,
                state: RwLock::new(Arc::downgrade(state)),
                version: AtomicU64::new(version),
                modified: AtomicBool::new(modified),
                components: Arc::new(Mutex::new(BTreeMap::new())),
            }),
        }
    }

    /// An id-only skeleton used by the decoder before components exist.
    pub(crate) fn skeleton(id: ObjectId, state: &Arc<State>) -> Self {
        Self::bare(id, ObjectId::NONE, state, 0, false)
    }

    /// This object's identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.core.id
    }

    /// The state this object currently lives in, if it is still alive.
    #[must_use]
    pub fn state(&self) -> Option<Arc<State>> {
        self.core.state.read().upgrade()
    }

    /// The object this one was created from, resolved through the owning
    /// state, or `None` for parentless objects.
    #[must_use]
    pub fn parent(&self) -> Option<Object> {
        if self.core.parent.is_none() {
            return None;
        }
        self.state()?.get(self.core.parent)
    }

    /// Idempotently flags this object as modified in the current state.
    ///
    /// Component mutators call this through their [`Owner`] back-pointer;
    /// only modified objects participate in commit validation and receive a
    /// fresh version on apply.
    pub fn mark_modified(&self) {
        self.core.modified.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if a component is present under `ty` on this object
    /// (own components only, no parent fallback).
    #[must_use]
    pub fn has_component(&self, ty: ComponentType) -> bool {
        self.core.components.lock().contains_key(&ty)
    }

    /// Borrows the component under `ty`, own components only.
    ///
    /// Returns `None` when the slot is empty or holds a different concrete
    /// type. The guard keeps the object's component lock for its lifetime.
    #[must_use]
    pub fn component<T: Component>(&self, ty: ComponentType) -> Option<ComponentRef<T>> {
        let guard = self.core.components.lock_arc();
        let present = guard.get(&ty).is_some_and(|c| {
            let any: &dyn Any = &**c;
            any.is::<T>()
        });
        if present {
            Some(ComponentRef {
                guard,
                ty,
                _marker: PhantomData,
            })
        } else {
            None
        }
    }

    /// Mutably borrows the component under `ty`, own components only.
    ///
    /// There is deliberately no mutable parent fallback: mutating an
    /// ancestor's component through a child handle is undefined by contract,
    /// so the type system simply does not offer it.
    #[must_use]
    pub fn component_mut<T: Component>(&self, ty: ComponentType) -> Option<ComponentMut<T>> {
        let guard = self.core.components.lock_arc();
        let present = guard.get(&ty).is_some_and(|c| {
            let any: &dyn Any = &**c;
            any.is::<T>()
        });
        if present {
            Some(ComponentMut {
                guard,
                ty,
                _marker: PhantomData,
            })
        } else {
            None
        }
    }

    /// Borrows the component under `ty`, falling back to the nearest
    /// ancestor object that carries it.
    ///
    /// The fallback order is: own components first, then the parent's
    /// `component_any` transitively. The returned guard is read-only.
    #[must_use]
    pub fn component_any<T: Component>(&self, ty: ComponentType) -> Option<ComponentRef<T>> {
        if let Some(found) = self.component::<T>(ty) {
            return Some(found);
        }
        self.parent()?.component_any::<T>(ty)
    }

    /// Creates a child object whose parent is this object.
    ///
    /// Components are constructed from `factories` in argument order;
    /// allocation and installation happen in the owning state.
    ///
    /// # Errors
    /// [`StateError::ObjectDetached`] if the owning state is gone, plus
    /// every error [`State::create`] can produce.
    pub fn create(&self, factories: &[Factory]) -> Result<(ObjectId, Object), StateError> {
        let Some(state) = self.state() else {
            return Err(StateError::ObjectDetached { id: self.id() });
        };
        state.create_child(self.id(), factories)
    }

    /// The back-pointer handed to components constructed on this object.
    pub(crate) fn owner(&self) -> Owner {
        Owner {
            core: Arc::downgrade(&self.core),
        }
    }

    pub(crate) fn version(&self) -> u64 {
        self.core.version.load(Ordering::SeqCst)
    }

    pub(crate) fn set_version(&self, version: u64) {
        self.core.version.store(version, Ordering::SeqCst);
    }

    pub(crate) fn is_modified(&self) -> bool {
        self.core.modified.load(Ordering::SeqCst)
    }

    /// Points the object at `state`; used when a commit transfers ownership
    /// from a child state to its parent.
    pub(crate) fn retarget(&self, state: &Arc<State>) {
        *self.core.state.write() = Arc::downgrade(state);
    }

    /// Clones this object into `state`: same id, version, and parent id;
    /// fresh component clones bound to the new object; modified cleared.
    pub(crate) fn clone_into(&self, state: &Arc<State>) -> Object {
        let clone = Object::bare(self.core.id, self.core.parent, state, self.version(), false);
        let owner = clone.owner();
        {
            let src = self.core.components.lock();
            let mut dst = clone.core.components.lock();
            for (ty, component) in src.iter() {
                dst.insert(*ty, component.clone_onto(owner.clone()));
            }
        }
        clone
    }

    /// Inserts a freshly built component. Returns `false` if the slot is
    /// already taken.
    pub(crate) fn install_component(
        &self,
        ty: ComponentType,
        component: Box<dyn Component>,
    ) -> bool {
        let mut map = self.core.components.lock();
        if map.contains_key(&ty) {
            return false;
        }
        map.insert(ty, component);
        true
    }

    /// Component types currently present on this object, ascending by
    /// handle.
    pub(crate) fn component_types(&self) -> Vec<ComponentType> {
        self.core.components.lock().keys().copied().collect()
    }

    /// Runs `f` against the locked component map (encoder path).
    pub(crate) fn with_components<R>(&self, f: impl FnOnce(&ComponentMap) -> R) -> R {
        f(&self.core.components.lock())
    }
}

impl core::fmt::Debug for Object {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.core.id)
            .field("parent", &self.core.parent)
            .finish_non_exhaustive()
    }
}

/// Component back-pointer to the owning object.
///
/// Every component instance carries one so that mutators can mark the owner
/// modified without taking any lock. The registry probes factories with the
/// no-owner sentinel, on which every accessor reports absence and
/// [`Owner::mark_modified`] is a no-op.
#[derive(Clone)]
pub struct Owner {
    core: Weak<ObjectCore>,
}

impl Owner {
    /// The no-owner sentinel used for type discovery at registration.
    pub(crate) fn none() -> Self {
        Self { core: Weak::new() }
    }

    /// Returns `true` when there is no live owning object behind this
    /// back-pointer (the sentinel, or an object that has been dropped).
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.core.strong_count() == 0
    }

    /// Identifier of the owning object, [`ObjectId::NONE`] if gone.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.core.upgrade().map_or(ObjectId::NONE, |core| core.id)
    }

    /// Handle onto the owning object, if it is still alive.
    #[must_use]
    pub fn object(&self) -> Option<Object> {
        self.core.upgrade().map(|core| Object { core })
    }

    /// The state the owning object currently lives in.
    #[must_use]
    pub fn state(&self) -> Option<Arc<State>> {
        self.core.upgrade().and_then(|core| core.state.read().upgrade())
    }

    /// The owning object's parent object, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Object> {
        self.object()?.parent()
    }

    /// Idempotently marks the owning object modified. Lock-free.
    pub fn mark_modified(&self) {
        if let Some(core) = self.core.upgrade() {
            core.modified.store(true, Ordering::SeqCst);
        }
    }
}

impl core::fmt::Debug for Owner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Owner").field(&self.id()).finish()
    }
}

/// Shared borrow of one component, holding the owner's component lock.
///
/// Obtained from [`Object::component`] or [`Object::component_any`]. Drop
/// the guard before calling back into the same object's mutating API.
pub struct ComponentRef<T: Component> {
    guard: ArcMutexGuard<RawMutex, ComponentMap>,
    ty: ComponentType,
    _marker: PhantomData<T>,
}

impl<T: Component> Deref for ComponentRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        let Some(component) = self.guard.get(&self.ty) else {
            // SAFETY: presence was checked at construction and the map stays
            // locked for the guard's whole lifetime.
            unreachable!("component vanished under its lock")
        };
        let any: &dyn Any = &**component;
        let Some(concrete) = any.downcast_ref::<T>() else {
            // SAFETY: the concrete type was checked at construction.
            unreachable!("component changed type under its lock")
        };
        concrete
    }
}

/// Exclusive borrow of one component, holding the owner's component lock.
///
/// Obtained from [`Object::component_mut`]; never falls back to ancestors.
pub struct ComponentMut<T: Component> {
    guard: ArcMutexGuard<RawMutex, ComponentMap>,
    ty: ComponentType,
    _marker: PhantomData<T>,
}

impl<T: Component> Deref for ComponentMut<T> {
    type Target = T;

    fn deref(&self) -> &T {
        let Some(component) = self.guard.get(&self.ty) else {
            // SAFETY: presence was checked at construction and the map stays
            // locked for the guard's whole lifetime.
            unreachable!("component vanished under its lock")
        };
        let any: &dyn Any = &**component;
        let Some(concrete) = any.downcast_ref::<T>() else {
            // SAFETY: the concrete type was checked at construction.
            unreachable!("component changed type under its lock")
        };
        concrete
    }
}

impl<T: Component> DerefMut for ComponentMut<T> {
    fn deref_mut(&mut self) -> &mut T {
        let Some(component) = self.guard.get_mut(&self.ty) else {
            // SAFETY: presence was checked at construction and the map stays
            // locked for the guard's whole lifetime.
            unreachable!("component vanished under its lock")
        };
        let any: &mut dyn Any = &mut **component;
        let Some(concrete) = any.downcast_mut::<T>() else {
            // SAFETY: the concrete type was checked at construction.
            unreachable!("component changed type under its lock")
        };
        concrete
    }
}
