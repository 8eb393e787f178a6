// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Container: an ordered set of member object ids.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use crate::codec::CodecError;
use crate::component::Component;
use crate::constants::CONTAINER_VERSION;
use crate::ident::{IdSet, ObjectId};
use crate::object::{Object, Owner};
use crate::registry::{register_component, ComponentType, Factory};
use crate::wire::{Reader, WireError, Writer};

/// Handle for the Container component type.
///
/// The factory is registered by the time any root state exists.
pub static CONTAINER_TYPE: LazyLock<ComponentType> =
    LazyLock::new(|| register_component(Container::factory()));

/// Holds other objects by id, in ascending order.
///
/// Membership is by identifier only; the member objects live in the owning
/// state and are resolved through it on demand. A per-component-type view of
/// the contents is kept as a pure cache: invalidated by every mutation,
/// never cloned or serialized, rebuilt lazily on first query.
///
/// A container must not hold its own owner, directly or transitively:
/// resolving the contents while the owner's component lock is held would
/// self-deadlock.
pub struct Container {
    members: IdSet,
    index: Option<BTreeMap<ComponentType, IdSet>>,
    owner: Owner,
}

impl Container {
    /// Factory constructing an empty container.
    #[must_use]
    pub fn factory() -> Factory {
        Arc::new(|owner| {
            Box::new(Container {
                members: IdSet::new(),
                index: None,
                owner,
            })
        })
    }

    /// Adds `object` to the contents. Returns `false` if already present.
    pub fn add(&mut self, object: &Object) -> bool {
        if self.members.add(object.id()) {
            self.index = None;
            self.owner.mark_modified();
            true
        } else {
            false
        }
    }

    /// Removes `object` from the contents. Returns `false` if absent.
    pub fn remove(&mut self, object: &Object) -> bool {
        if self.members.remove(object.id()) {
            self.index = None;
            self.owner.mark_modified();
            true
        } else {
            false
        }
    }

    /// Returns `true` if `id` is a member.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.members.contains(id)
    }

    /// Member ids, ascending.
    #[must_use]
    pub fn ids(&self) -> &[ObjectId] {
        self.members.as_slice()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if the container is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Resolves the member objects through the owning state, ascending by
    /// id. Members that no longer resolve are skipped.
    #[must_use]
    pub fn contents(&self) -> Vec<Object> {
        let Some(state) = self.owner.state() else {
            return Vec::new();
        };
        self.members.iter().filter_map(|id| state.get(id)).collect()
    }

    /// Resolves the members that directly carry component type `ty`.
    ///
    /// Served from the lazily built per-type cache; the first query after a
    /// mutation or a decode pays for the rebuild.
    #[must_use]
    pub fn contents_by_type(&mut self, ty: ComponentType) -> Vec<Object> {
        let Some(state) = self.owner.state() else {
            return Vec::new();
        };
        let members = &self.members;
        let index = self.index.get_or_insert_with(|| {
            let mut index: BTreeMap<ComponentType, IdSet> = BTreeMap::new();
            for id in members {
                if let Some(object) = state.get(id) {
                    for present in object.component_types() {
                        index.entry(present).or_default().add(id);
                    }
                }
            }
            index
        });
        index.get(&ty).map_or_else(Vec::new, |ids| {
            ids.iter().filter_map(|id| state.get(id)).collect()
        })
    }
}

impl Component for Container {
    fn type_name(&self) -> &'static str {
        "*\"relic\".Container"
    }

    fn clone_onto(&self, owner: Owner) -> Box<dyn Component> {
        Box::new(Container {
            members: self.members.clone(),
            index: None,
            owner,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.put_uvarint(CONTAINER_VERSION);
        w.put_uvarint(self.members.len() as u64);
        for id in &self.members {
            w.put_uvarint(id.0);
        }
    }

    fn decode(&mut self, r: &mut Reader<'_>) -> Result<(), CodecError> {
        let version = r.uvarint()?;
        if version != CONTAINER_VERSION {
            return Err(CodecError::ContainerVersionUnknown { found: version });
        }
        let count = usize::try_from(r.uvarint()?).map_err(|_| WireError::Truncated)?;
        if count > r.remaining() {
            return Err(WireError::Truncated.into());
        }
        let mut members = IdSet::new();
        let mut prev: Option<u64> = None;
        for _ in 0..count {
            let id = r.uvarint()?;
            if prev.is_some_and(|p| p >= id) {
                return Err(CodecError::ContainerOutOfOrder);
            }
            prev = Some(id);
            members.add(ObjectId(id));
        }
        self.members = members;
        self.index = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn bare_container() -> Container {
        Container {
            members: IdSet::new(),
            index: None,
            owner: Owner::none(),
        }
    }

    #[test]
    fn wire_format_is_version_count_ids() {
        let mut c = bare_container();
        c.members.add(ObjectId(3));
        c.members.add(ObjectId(1));
        let mut w = Writer::new();
        c.encode(&mut w);
        assert_eq!(w.into_bytes(), vec![0, 2, 1, 3]);
    }

    #[test]
    fn decode_round_trips() {
        let mut decoded = bare_container();
        let mut r = Reader::new(&[0, 3, 1, 5, 9]);
        decoded.decode(&mut r).unwrap();
        assert!(r.is_empty());
        assert_eq!(
            decoded.ids(),
            &[ObjectId(1), ObjectId(5), ObjectId(9)]
        );
    }

    #[test]
    fn decode_rejects_out_of_order_ids() {
        let mut c = bare_container();
        let mut r = Reader::new(&[0, 2, 5, 3]);
        assert_eq!(c.decode(&mut r).unwrap_err(), CodecError::ContainerOutOfOrder);
    }

    #[test]
    fn decode_rejects_duplicate_ids() {
        let mut c = bare_container();
        let mut r = Reader::new(&[0, 2, 4, 4]);
        assert_eq!(c.decode(&mut r).unwrap_err(), CodecError::ContainerOutOfOrder);
    }

    #[test]
    fn decode_rejects_unknown_version() {
        let mut c = bare_container();
        let mut r = Reader::new(&[7]);
        assert_eq!(
            c.decode(&mut r).unwrap_err(),
            CodecError::ContainerVersionUnknown { found: 7 }
        );
    }
}
