// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Built-in components.
//!
//! Every built-in factory is registered by [`register_builtins`] when a root
//! state is created, before any state activity — game code never has to
//! touch the `*_TYPE` handles first. Game-defined components still register
//! themselves through [`register_component`](crate::register_component)
//! before concurrent state activity begins.

mod container;
mod location;
mod messages;
mod name;
mod resources;

pub use container::{Container, CONTAINER_TYPE};
pub use location::{place, relocate, Location, LOCATION_TYPE};
pub use messages::{Message, Messages, MESSAGES_TYPE};
pub use name::{Name, NAME_TYPE};
pub use resources::{Resources, RESOURCES_TYPE};

/// Registers every built-in component factory.
///
/// Invoked from [`State::new`](crate::State::new) so the built-ins are
/// always registered before the first object exists, matching the guarantee
/// that registration completes before concurrent state activity.
pub(crate) fn register_builtins() {
    let _ = (
        *CONTAINER_TYPE,
        *LOCATION_TYPE,
        *MESSAGES_TYPE,
        *NAME_TYPE,
        *RESOURCES_TYPE,
    );
}
