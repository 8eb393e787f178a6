// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reversible binary patches between adjacent snapshots.
//!
//! The history stores one patch per snapshot; the same patch must replay
//! forward (previous → next) and backward (next → previous). [`PatchCodec`]
//! is the seam; [`BlockDiff`] is the default implementation: a sequential
//! stream of `Equal` and `Replace` operations in which replaced runs carry
//! both the old and the new bytes, which is exactly what makes one patch
//! replayable in either direction. Both cursors advance monotonically and
//! must land on their buffer ends for a patch to be accepted.
//!
//! Patch size is best-effort; correctness and determinism are the contract.
//! Adjacent canonical snapshots share most bytes, so resynchronizing on
//! block-sized runs after an edit keeps patches near the size of the change.

use rustc_hash::FxHashMap;
use thiserror::Error;

use relic_core::{Reader, WireError, Writer};

const OP_EQUAL: u64 = 0;
const OP_REPLACE: u64 = 1;

/// Errors produced while applying a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The patch held an operation tag this codec does not know.
    #[error("unknown patch op {0}")]
    UnknownOp(u64),
    /// An operation ran past the end of the source buffer.
    #[error("patch op overruns the source buffer")]
    Overrun,
    /// The patch ended before consuming the whole source buffer.
    #[error("patch did not consume the whole source buffer")]
    Underrun,
    /// The bytes recorded in the patch disagree with the source buffer.
    #[error("patch bytes disagree with the source buffer")]
    Mismatch,
    /// A varint or length-prefixed field was malformed.
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// A self-contained, bidirectional binary patch codec.
///
/// `forward(prev, diff(prev, next, b)) == next` and
/// `reverse(next, diff(prev, next, b)) == prev` must hold for every input
/// pair and block size.
pub trait PatchCodec {
    /// Computes a patch turning `prev` into `next`, resynchronizing on runs
    /// of `block_size` bytes.
    fn diff(prev: &[u8], next: &[u8], block_size: usize) -> Vec<u8>;

    /// Applies `patch` to `prev`, producing the next buffer.
    ///
    /// # Errors
    /// A [`PatchError`] if the patch is malformed or does not match `prev`.
    fn forward(prev: &[u8], patch: &[u8]) -> Result<Vec<u8>, PatchError>;

    /// Applies `patch` to `next`, producing the previous buffer.
    ///
    /// # Errors
    /// A [`PatchError`] if the patch is malformed or does not match `next`.
    fn reverse(next: &[u8], patch: &[u8]) -> Result<Vec<u8>, PatchError>;
}

/// Default [`PatchCodec`]: bytewise common runs with block-granular
/// resynchronization.
#[derive(Debug, Clone, Copy)]
pub struct BlockDiff;

impl PatchCodec for BlockDiff {
    fn diff(prev: &[u8], next: &[u8], block_size: usize) -> Vec<u8> {
        let block = block_size.max(1);
        let mut w = Writer::new();
        let mut i = 0;
        let mut j = 0;
        while i < prev.len() || j < next.len() {
            let mut run = 0;
            while i + run < prev.len() && j + run < next.len() && prev[i + run] == next[j + run] {
                run += 1;
            }
            if run > 0 {
                w.put_uvarint(OP_EQUAL);
                w.put_uvarint(run as u64);
                i += run;
                j += run;
                continue;
            }
            let (pi, nj) = resync(prev, i, next, j, block);
            w.put_uvarint(OP_REPLACE);
            w.put_uvarint((pi - i) as u64);
            w.put_uvarint((nj - j) as u64);
            w.put_raw(&prev[i..pi]);
            w.put_raw(&next[j..nj]);
            i = pi;
            j = nj;
        }
        w.into_bytes()
    }

    fn forward(prev: &[u8], patch: &[u8]) -> Result<Vec<u8>, PatchError> {
        apply(prev, patch, Direction::Forward)
    }

    fn reverse(next: &[u8], patch: &[u8]) -> Result<Vec<u8>, PatchError> {
        apply(next, patch, Direction::Reverse)
    }
}

/// Finds the earliest realignment at or after `(i, j)`: the first block of
/// `next` (scanning byte-by-byte from `j`) whose content also occurs as an
/// aligned block of `prev` at or after `i`. Falls back to the buffer ends
/// when no common block remains.
fn resync(prev: &[u8], i: usize, next: &[u8], j: usize, block: usize) -> (usize, usize) {
    let mut blocks: FxHashMap<&[u8], usize> = FxHashMap::default();
    let mut p = i;
    while p + block <= prev.len() {
        blocks.entry(&prev[p..p + block]).or_insert(p);
        p += block;
    }
    let mut q = j;
    while q + block <= next.len() {
        if let Some(&pi) = blocks.get(&next[q..q + block]) {
            if pi > i || q > j {
                return (pi, q);
            }
        }
        q += 1;
    }
    (prev.len(), next.len())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

/// Replays a patch over `source`. Forward reads the old bytes of a replace
/// from the source and emits the new; reverse swaps the roles.
fn apply(source: &[u8], patch: &[u8], direction: Direction) -> Result<Vec<u8>, PatchError> {
    let mut r = Reader::new(patch);
    let mut out = Vec::with_capacity(source.len());
    let mut at: usize = 0;
    while !r.is_empty() {
        match r.uvarint()? {
            OP_EQUAL => {
                let run = usize::try_from(r.uvarint()?).map_err(|_| PatchError::Overrun)?;
                let end = at.checked_add(run).ok_or(PatchError::Overrun)?;
                if end > source.len() {
                    return Err(PatchError::Overrun);
                }
                out.extend_from_slice(&source[at..end]);
                at = end;
            }
            OP_REPLACE => {
                let old_len = usize::try_from(r.uvarint()?).map_err(|_| PatchError::Overrun)?;
                let new_len = usize::try_from(r.uvarint()?).map_err(|_| PatchError::Overrun)?;
                let old = r.take(old_len)?;
                let new = r.take(new_len)?;
                let (expect, emit) = match direction {
                    Direction::Forward => (old, new),
                    Direction::Reverse => (new, old),
                };
                let end = at.checked_add(expect.len()).ok_or(PatchError::Overrun)?;
                if end > source.len() {
                    return Err(PatchError::Overrun);
                }
                if &source[at..end] != expect {
                    return Err(PatchError::Mismatch);
                }
                out.extend_from_slice(emit);
                at = end;
            }
            op => return Err(PatchError::UnknownOp(op)),
        }
    }
    if at != source.len() {
        return Err(PatchError::Underrun);
    }
    Ok(out)
}
