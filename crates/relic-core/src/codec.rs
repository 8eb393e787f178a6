// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical serialization of root states.
//!
//! Determinism contract
//! - Objects are emitted in ascending id order; each object's components in
//!   ascending type-name order. Equal states produce byte-equal streams,
//!   which is what keeps history patches small.
//! - Every entity leads with a uvarint format version that decoders check
//!   before reading content; unknown tags are typed errors.
//! - Tombstones are dropped at this boundary: the wire format has no
//!   deletion marker and an empty component list is a legitimate live
//!   object, so a decoded state reports deleted ids as absent. Deleted ids
//!   stay unreused because the next-id counter is part of the stream.
//! - Decoding allocates id-only skeleton objects bound to the new root
//!   before any component record is read, so component decoders can resolve
//!   intra-state object references.

use std::sync::Arc;

use thiserror::Error;

use crate::constants::{OBJECT_VERSION, STATE_VERSION};
use crate::ident::{IdSet, ObjectId};
use crate::object::Object;
use crate::registry;
use crate::state::State;
use crate::wire::{Reader, WireError, Writer};

/// Errors produced while encoding or decoding canonical streams.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Child states are ephemeral scratch spaces and refuse to encode.
    #[error("cannot encode a child state")]
    StateHasParent,
    /// The state stream led with an unknown format version.
    #[error("unrecognized state version {found}")]
    StateVersionUnknown {
        /// The version tag found in the stream.
        found: u64,
    },
    /// An object record was decoded without an owning state context.
    #[error("cannot decode an object without an owning state")]
    ObjectRequiresState,
    /// An object record led with an unknown format version.
    #[error("unrecognized object version {found}")]
    ObjectVersionUnknown {
        /// The version tag found in the stream.
        found: u64,
    },
    /// One object record named the same component type twice.
    #[error("duplicate component {name} in object record")]
    ObjectDuplicateComponent {
        /// Wire type name of the duplicated component.
        name: String,
    },
    /// A Container record led with an unknown format version.
    #[error("unrecognized container version {found}")]
    ContainerVersionUnknown {
        /// The version tag found in the stream.
        found: u64,
    },
    /// A Container record held ids that were not strictly ascending.
    #[error("container contents are out of order")]
    ContainerOutOfOrder,
    /// A Resources record led with an unknown format version.
    #[error("unrecognized resources version {found}")]
    ResourcesVersionUnknown {
        /// The version tag found in the stream.
        found: u64,
    },
    /// A Resources record repeated a key.
    #[error("duplicate key {key:?} in resources record")]
    ResourcesDuplicateKey {
        /// The repeated key.
        key: String,
    },
    /// A Location record led with an unknown format version.
    #[error("unrecognized location version {found}")]
    LocationVersionUnknown {
        /// The version tag found in the stream.
        found: u64,
    },
    /// A Name record led with an unknown format version.
    #[error("unrecognized name version {found}")]
    NameVersionUnknown {
        /// The version tag found in the stream.
        found: u64,
    },
    /// A Messages record led with an unknown format version.
    #[error("unrecognized messages version {found}")]
    MessagesVersionUnknown {
        /// The version tag found in the stream.
        found: u64,
    },
    /// An object record named a component type with no registered factory.
    #[error("unregistered component {name}")]
    UnregisteredComponentName {
        /// The unknown wire type name.
        name: String,
    },
    /// A wire primitive was truncated or malformed.
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl State {
    /// Serializes this root state to its canonical bytes.
    ///
    /// # Errors
    /// [`CodecError::StateHasParent`] if called on a transactional child.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.parent.is_some() {
            return Err(CodecError::StateHasParent);
        }
        let inner = self.inner.lock();
        let mut w = Writer::new();
        w.put_uvarint(STATE_VERSION);
        w.put_uvarint(self.counters.next_id());
        let mut ids = IdSet::new();
        for (id, slot) in &inner.objects {
            if slot.is_some() {
                ids.add(*id);
            }
        }
        w.put_uvarint(ids.len() as u64);
        for id in &ids {
            w.put_uvarint(id.0);
        }
        for id in &ids {
            let Some(Some(object)) = inner.objects.get(&id) else {
                // SAFETY: `ids` was gathered from the live entries of the
                // same locked map two loops above.
                unreachable!("live id disappeared under the state lock")
            };
            encode_object(object, &mut w);
        }
        Ok(w.into_bytes())
    }

    /// Decodes canonical bytes into a fresh root state.
    ///
    /// The next-id counter is restored from the stream; the version counter
    /// starts fresh, which is sound because versions only order commits
    /// within one live hierarchy and are never serialized.
    ///
    /// # Errors
    /// Any [`CodecError`]; the partially decoded state is discarded.
    pub fn decode(data: &[u8]) -> Result<Arc<Self>, CodecError> {
        let mut r = Reader::new(data);
        let version = r.uvarint()?;
        if version != STATE_VERSION {
            return Err(CodecError::StateVersionUnknown { found: version });
        }
        let next_id = r.uvarint()?;
        let count = usize::try_from(r.uvarint()?).map_err(|_| WireError::Truncated)?;
        if count > r.remaining() {
            // Every id costs at least one byte; a larger count is corrupt.
            return Err(WireError::Truncated.into());
        }
        let state = State::new();
        state.counters.restore_next_id(next_id);
        let mut objects = Vec::with_capacity(count);
        for _ in 0..count {
            let id = ObjectId(r.uvarint()?);
            objects.push(Object::skeleton(id, &state));
        }
        {
            let mut inner = state.inner.lock();
            for object in &objects {
                inner.objects.insert(object.id(), Some(object.clone()));
            }
        }
        for object in &objects {
            decode_object(object, &mut r)?;
        }
        let mut inner = state.inner.lock();
        for object in &objects {
            for ty in object.component_types() {
                inner.by_component.entry(ty).or_default().add(object.id());
            }
        }
        drop(inner);
        Ok(state)
    }
}

/// Appends one object record: version tag, component count, type names in
/// ascending string order, then the component records in the same order.
fn encode_object(object: &Object, w: &mut Writer) {
    object.with_components(|map| {
        w.put_uvarint(OBJECT_VERSION);
        w.put_uvarint(map.len() as u64);
        let mut entries: Vec<_> = map.values().map(|c| (c.type_name(), c)).collect();
        entries.sort_by_key(|(name, _)| *name);
        for (name, _) in &entries {
            w.put_str(name);
        }
        for (_, component) in &entries {
            component.encode(w);
        }
    });
}

/// Fills a skeleton object from one object record.
///
/// Components are constructed through their registered factories first (in
/// record order), then filled from the concatenated component records, so
/// the record stream stays contiguous.
fn decode_object(object: &Object, r: &mut Reader<'_>) -> Result<(), CodecError> {
    if object.state().is_none() {
        return Err(CodecError::ObjectRequiresState);
    }
    let version = r.uvarint()?;
    if version != OBJECT_VERSION {
        return Err(CodecError::ObjectVersionUnknown { found: version });
    }
    let count = usize::try_from(r.uvarint()?).map_err(|_| WireError::Truncated)?;
    if count > r.remaining() {
        return Err(WireError::Truncated.into());
    }
    let owner = object.owner();
    let mut components = Vec::with_capacity(count);
    for _ in 0..count {
        let name = r.str()?;
        let Some(factory) = registry::factory(name) else {
            return Err(CodecError::UnregisteredComponentName {
                name: name.to_owned(),
            });
        };
        components.push(factory.as_ref()(owner.clone()));
    }
    for mut component in components {
        component.decode(r)?;
        let name = component.type_name();
        let Some(ty) = registry::lookup(name) else {
            return Err(CodecError::UnregisteredComponentName {
                name: name.to_owned(),
            });
        };
        if !object.install_component(ty, component) {
            return Err(CodecError::ObjectDuplicateComponent {
                name: name.to_owned(),
            });
        }
    }
    Ok(())
}
