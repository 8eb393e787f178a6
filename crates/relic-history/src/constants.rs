// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! History tunables and frame geometry.

/// Default block granularity for patch resynchronization.
pub const DEFAULT_BLOCK_SIZE: usize = 10;

/// Width of the frame size prefix and suffix fields.
pub(crate) const SIZE_FIELD: i64 = 8;
