// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! relic-core: transactional, versioned entity-component world store.
//!
//! A world is a [`State`]: a set of identified [`Object`]s, each an aggregate
//! of independently registered [`Component`]s. Mutation goes through
//! [`State::atomic`], which runs game logic against a copy-on-write child
//! state and merges it back under optimistic concurrency control, so every
//! committed change is all-or-nothing. Committed roots serialize to a
//! canonical, deterministic byte stream ([`State::encode`]) that the
//! `relic-history` crate chains into a seekable bidirectional log.
//!
//! # Determinism contract
//!
//! - Canonical encoding emits objects in ascending id order and each object's
//!   components in ascending type-name order; all integers are varints
//!   (unsigned LEB128, zigzag for signed). Equal states always produce equal
//!   bytes.
//! - Interior maps are hash maps for the hot path; ordering is produced
//!   explicitly at the serialization boundary, never assumed from a map.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self
)]

/// Built-in components (Container, Resources, Location, Name, Messages).
pub mod components;

mod codec;
mod component;
mod constants;
mod ident;
mod object;
mod registry;
mod state;
mod telemetry;
mod wire;

// Re-exports for stable public API
/// Canonical serialization error taxonomy.
pub use codec::CodecError;
/// Component contract consumed from game code.
pub use component::Component;
/// Wire-format version tags and engine tunables.
pub use constants::{
    CONTAINER_VERSION, DEFAULT_MESSAGE_CAP, LOCATION_VERSION, MESSAGES_VERSION, NAME_VERSION,
    OBJECT_VERSION, RESOURCES_VERSION, STATE_VERSION,
};
/// Object identifier and the ordered identifier set.
pub use ident::{IdSet, ObjectId};
/// Object handle, component back-pointer, and borrowed component guards.
pub use object::{ComponentMut, ComponentRef, Object, Owner};
/// Process-wide component registry and the opaque type handle.
pub use registry::{register_component, ComponentType, Factory};
/// World state, copy-on-write children, and the optimistic commit protocol.
pub use state::{State, StateError};
/// Varint primitives shared by every canonical wire format.
pub use wire::{Reader, WireError, Writer};
