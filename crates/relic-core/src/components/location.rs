// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Location: signed 3D tile coordinates, with container-aware movement.
//!
//! Cross-component behaviors are module-level functions rather than methods
//! on the component: the component map sits behind one mutex per object, so
//! a component cannot reach its siblings while it is itself borrowed.
//! [`place`] and [`relocate`] keep those lock scopes explicit.

use std::sync::{Arc, LazyLock};

use rustc_hash::FxHashSet;

use crate::codec::CodecError;
use crate::component::Component;
use crate::components::container::{Container, CONTAINER_TYPE};
use crate::constants::LOCATION_VERSION;
use crate::ident::ObjectId;
use crate::object::{Object, Owner};
use crate::registry::{register_component, ComponentType, Factory};
use crate::wire::{Reader, Writer};

/// Handle for the Location component type.
///
/// The factory is registered by the time any root state exists.
pub static LOCATION_TYPE: LazyLock<ComponentType> =
    LazyLock::new(|| register_component(Location::factory()));

/// A position on the tile grid.
pub struct Location {
    x: i64,
    y: i64,
    z: i64,
    owner: Owner,
}

impl Location {
    /// Factory constructing a location at the origin.
    #[must_use]
    pub fn factory() -> Factory {
        Arc::new(|owner| {
            Box::new(Location {
                x: 0,
                y: 0,
                z: 0,
                owner,
            })
        })
    }

    /// Current coordinates.
    #[must_use]
    pub fn get(&self) -> (i64, i64, i64) {
        (self.x, self.y, self.z)
    }

    /// Sets the coordinates of this object only.
    ///
    /// Use [`relocate`] to also carry contained objects along.
    pub fn set(&mut self, x: i64, y: i64, z: i64) {
        self.x = x;
        self.y = y;
        self.z = z;
        self.owner.mark_modified();
    }
}

impl Component for Location {
    fn type_name(&self) -> &'static str {
        "*\"relic\".Location"
    }

    fn clone_onto(&self, owner: Owner) -> Box<dyn Component> {
        Box::new(Location {
            x: self.x,
            y: self.y,
            z: self.z,
            owner,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.put_uvarint(LOCATION_VERSION);
        w.put_varint(self.x);
        w.put_varint(self.y);
        w.put_varint(self.z);
    }

    fn decode(&mut self, r: &mut Reader<'_>) -> Result<(), CodecError> {
        let version = r.uvarint()?;
        if version != LOCATION_VERSION {
            return Err(CodecError::LocationVersionUnknown { found: version });
        }
        self.x = r.varint()?;
        self.y = r.varint()?;
        self.z = r.varint()?;
        Ok(())
    }
}

/// Adds `item` to `container`'s Container and stamps the item (and its own
/// contents, recursively) with the container's location.
///
/// Returns `false` without moving anything if the container has no Container
/// component or the item was already a member. A container without a
/// Location admits the item but leaves its coordinates alone.
pub fn place(container: &Object, item: &Object) -> bool {
    let added = container
        .component_mut::<Container>(*CONTAINER_TYPE)
        .is_some_and(|mut c| c.add(item));
    if !added {
        return false;
    }
    let coords = container
        .component::<Location>(*LOCATION_TYPE)
        .map(|location| location.get());
    if let Some((x, y, z)) = coords {
        relocate(item, x, y, z);
    }
    true
}

/// Moves `object` to `(x, y, z)` and propagates the coordinates recursively
/// to every contained object that carries a Location.
///
/// Containment cycles are tolerated: each object moves at most once.
pub fn relocate(object: &Object, x: i64, y: i64, z: i64) {
    let mut visited = FxHashSet::default();
    relocate_inner(object, x, y, z, &mut visited);
}

fn relocate_inner(object: &Object, x: i64, y: i64, z: i64, visited: &mut FxHashSet<ObjectId>) {
    if !visited.insert(object.id()) {
        return;
    }
    if let Some(mut location) = object.component_mut::<Location>(*LOCATION_TYPE) {
        location.set(x, y, z);
    }
    let members: Vec<ObjectId> = object
        .component::<Container>(*CONTAINER_TYPE)
        .map(|c| c.ids().to_vec())
        .unwrap_or_default();
    if members.is_empty() {
        return;
    }
    let Some(state) = object.state() else {
        return;
    };
    for id in members {
        if let Some(member) = state.get(id) {
            relocate_inner(&member, x, y, z, visited);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn bare_location(x: i64, y: i64, z: i64) -> Location {
        Location {
            x,
            y,
            z,
            owner: Owner::none(),
        }
    }

    #[test]
    fn wire_round_trip_preserves_negative_coordinates() {
        let src = bare_location(-3, 0, 12);
        let mut w = Writer::new();
        src.encode(&mut w);
        let bytes = w.into_bytes();

        let mut decoded = bare_location(0, 0, 0);
        let mut r = Reader::new(&bytes);
        decoded.decode(&mut r).unwrap();
        assert!(r.is_empty());
        assert_eq!(decoded.get(), (-3, 0, 12));
    }

    #[test]
    fn decode_rejects_unknown_version() {
        let mut decoded = bare_location(0, 0, 0);
        let mut r = Reader::new(&[4]);
        assert_eq!(
            decoded.decode(&mut r).unwrap_err(),
            CodecError::LocationVersionUnknown { found: 4 }
        );
    }
}
