// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The component contract consumed from game code.

use std::any::Any;

use crate::codec::CodecError;
use crate::object::Owner;
use crate::wire::{Reader, Writer};

/// A named, typed value attached to an object.
///
/// Components are independently cloneable and serializable, and carry a
/// back-pointer ([`Owner`]) to the object they live on so that mutators can
/// mark that object modified for the optimistic commit protocol.
///
/// # Type names
///
/// [`Component::type_name`] returns the stable wire identity of the concrete
/// type: an optional leading `*` (pointer-like identity, which is every
/// boxed component here), the quoted package path, a dot, and the type name
/// — e.g. `*"relic".Container`. The string appears verbatim in serialized
/// objects; changing it is a breaking wire change.
///
/// # Concurrency
///
/// A component is only ever accessed through its owning object's component
/// guards, so implementations need `Send` but no interior synchronization.
pub trait Component: Any + Send {
    /// Stable wire identity of the concrete component type.
    fn type_name(&self) -> &'static str;

    /// Produces a deep copy bound to `owner`.
    ///
    /// Transient caches must not be carried over; persistent state must be.
    fn clone_onto(&self, owner: Owner) -> Box<dyn Component>;

    /// Appends the canonical record for this component.
    ///
    /// Every record leads with the component's format version tag.
    fn encode(&self, w: &mut Writer);

    /// Replaces this component's state with the decoded record.
    ///
    /// Called on a freshly constructed instance during object decoding. The
    /// version tag is checked first; unknown tags are an error.
    ///
    /// # Errors
    /// A typed [`CodecError`] on unknown version tags, malformed content, or
    /// truncated input.
    fn decode(&mut self, r: &mut Reader<'_>) -> Result<(), CodecError>;
}
