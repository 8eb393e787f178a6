// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! relic-history: a seekable, bidirectional log of world snapshots.
//!
//! Every committed world is appended as a size-framed, reversible binary
//! patch against the previous snapshot's canonical bytes. Because frames
//! carry their size on both ends, a cursor can walk the chain in either
//! direction, rebuilding any snapshot by folding forward or reverse patches
//! over an in-memory buffer and decoding it on demand.
//!
//! # Frame layout
//!
//! | field       | width                  | content                          |
//! |-------------|------------------------|----------------------------------|
//! | size prefix | 8 bytes, LE signed 64  | patch byte length                |
//! | patch       | size prefix bytes      | forward patch, previous → next   |
//! | size suffix | 8 bytes, LE signed 64  | same value as the prefix         |
//!
//! A history file is the concatenation of frames with no outer header; an
//! empty file is an empty history.
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

mod constants;
mod history;
mod patch;

/// Default patch granularity and frame field widths.
pub use constants::DEFAULT_BLOCK_SIZE;
/// The seekable log and its cursor algebra.
pub use history::{History, HistoryError, Whence};
/// The reversible patch codec seam and its default implementation.
pub use patch::{BlockDiff, PatchCodec, PatchError};
