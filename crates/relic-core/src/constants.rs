// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire-format version tags and engine tunables.
//!
//! Every serialized entity leads with a version tag that decoders check
//! before reading anything else; bumping one of these is a breaking wire
//! change and requires a migration note.

/// Format version of the canonical state stream.
pub const STATE_VERSION: u64 = 0;

/// Format version of an object record inside the state stream.
pub const OBJECT_VERSION: u64 = 0;

/// Format version of a Container component record.
pub const CONTAINER_VERSION: u64 = 0;

/// Format version of a Resources component record.
pub const RESOURCES_VERSION: u64 = 0;

/// Format version of a Location component record.
pub const LOCATION_VERSION: u64 = 0;

/// Format version of a Name component record.
pub const NAME_VERSION: u64 = 0;

/// Format version of a Messages component record.
pub const MESSAGES_VERSION: u64 = 0;

/// Default retention cap for the Messages component.
///
/// Factories may override it per instance; the cap is configuration, not
/// wire data.
pub const DEFAULT_MESSAGE_CAP: usize = 200;
