// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The seekable, bidirectional snapshot log.
//!
//! A [`History`] wraps any random-access byte stream and a cursor. The
//! cursor names a snapshot index; the in-memory buffer always holds the
//! canonical bytes of the snapshot at the cursor, rebuilt incrementally by
//! folding frame patches forward or backward. Index −1 means "parked
//! outside both ends": the next forward step lands on index 0, the next
//! reverse step on the last index.
//!
//! # Position invariant
//!
//! Whenever the cursor is at index `k`, the stream position sits at the end
//! of frame `k`. Forward steps read the next frame in place; reverse steps
//! walk back over the previous frame and reseek to its start, so steps
//! compose in any order and for any chain length.
//!
//! # Poisoning
//!
//! End-of-stream is a distinct, recoverable signal that parks the cursor. A
//! history that has returned a real I/O error from [`History::seek`] or
//! [`History::append`] is poisoned by documented contract and must not be
//! used further; this is not enforced by the type.

use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;

use relic_core::{CodecError, State};

use crate::constants::{DEFAULT_BLOCK_SIZE, SIZE_FIELD};
use crate::patch::{BlockDiff, PatchCodec, PatchError};

/// Where a seek offset counts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Frame offsets count from the first snapshot.
    Start,
    /// Frame offsets count from the cursor.
    Cur,
    /// Frame offsets count from the last snapshot.
    End,
}

/// Errors produced by history operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A step would pass the first or last frame. The cursor is parked at
    /// −1 with the buffer cleared; re-enter from either end.
    #[error("end of history")]
    EndOfStream,
    /// A frame size field was negative or inconsistent.
    #[error("history frame is corrupt")]
    FrameCorrupt,
    /// The underlying stream failed. The history is poisoned.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The current buffer did not decode as a canonical state.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A frame patch did not apply to the current buffer.
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// A seekable log of world snapshots stored as size-framed bidirectional
/// patches.
///
/// Generic over the byte stream and the patch codec; `History<S>` uses the
/// default [`BlockDiff`] codec. The stream and cursor are single-owner:
/// concurrent use of one history is undefined.
pub struct History<S, C = BlockDiff> {
    stream: S,
    cursor: i64,
    buf: Vec<u8>,
    block_size: usize,
    _codec: PhantomData<C>,
}

impl<S: Read + Write + Seek> History<S> {
    /// Wraps `stream` with the default codec and block size. The cursor
    /// starts parked at −1.
    pub fn new(stream: S) -> Self {
        Self::with_block_size(stream, DEFAULT_BLOCK_SIZE)
    }

    /// Wraps `stream` with the default codec and a custom diff block size.
    pub fn with_block_size(stream: S, block_size: usize) -> Self {
        History {
            stream,
            cursor: -1,
            buf: Vec::new(),
            block_size,
            _codec: PhantomData,
        }
    }
}

impl<S: Read + Write + Seek, C: PatchCodec> History<S, C> {
    /// Wraps `stream` with a custom patch codec.
    pub fn with_codec(stream: S, block_size: usize) -> Self {
        History {
            stream,
            cursor: -1,
            buf: Vec::new(),
            block_size,
            _codec: PhantomData,
        }
    }

    /// Moves the cursor by `offset` frames relative to `whence` and decodes
    /// the snapshot under it.
    ///
    /// A parked cursor (−1) rewinds first, so `seek(1, Cur)` after
    /// [`History::reset`] lands on index 0 and `seek(-1, Cur)` lands on the
    /// last index.
    ///
    /// # Errors
    /// [`HistoryError::EndOfStream`] when the walk would pass either end
    /// (cursor parks at −1, buffer cleared); any other error poisons the
    /// history.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<Arc<State>, HistoryError> {
        match self.walk(offset, whence) {
            Ok(()) => Ok(State::decode(&self.buf)?),
            Err(HistoryError::EndOfStream) => {
                self.cursor = -1;
                self.buf.clear();
                Err(HistoryError::EndOfStream)
            }
            Err(err) => Err(err),
        }
    }

    fn walk(&mut self, mut offset: i64, mut whence: Whence) -> Result<(), HistoryError> {
        if whence == Whence::Cur && self.cursor < 0 {
            // A parked cursor re-enters the chain: one forward step reaches
            // index 0, one reverse step reaches the last index.
            if offset > 0 {
                offset -= 1;
            } else {
                offset += 1;
                whence = Whence::End;
            }
        }
        if whence == Whence::Start || self.cursor < 0 {
            self.stream.seek(SeekFrom::Start(0))?;
            self.cursor = -1;
            self.buf.clear();
            self.step_forward()?;
        }
        if whence == Whence::End {
            loop {
                match self.step_forward() {
                    Ok(()) => {}
                    Err(HistoryError::EndOfStream) => break,
                    Err(err) => return Err(err),
                }
            }
        }
        while offset > 0 {
            self.step_forward()?;
            offset -= 1;
        }
        while offset < 0 {
            self.step_reverse()?;
            offset += 1;
        }
        Ok(())
    }

    /// Serializes `state`, frames the forward patch against the previous
    /// snapshot, and writes it at the end of the chain.
    ///
    /// # Errors
    /// Encoding errors from the state, patch errors, or stream I/O errors;
    /// the latter poison the history.
    pub fn append(&mut self, state: &State) -> Result<(), HistoryError> {
        match self.seek(0, Whence::End) {
            Ok(_) => {}
            // An empty log is not an error to append to.
            Err(HistoryError::EndOfStream) if self.cursor == -1 => {}
            Err(err) => return Err(err),
        }
        let next = state.encode()?;
        let patch = C::diff(&self.buf, &next, self.block_size);
        let size = i64::try_from(patch.len()).map_err(|_| HistoryError::FrameCorrupt)?;
        self.stream.write_all(&size.to_le_bytes())?;
        self.stream.write_all(&patch)?;
        self.stream.write_all(&size.to_le_bytes())?;
        self.cursor += 1;
        self.buf = next;
        Ok(())
    }

    /// The current snapshot index, −1 when parked outside both ends.
    #[must_use]
    pub fn tell(&self) -> i64 {
        self.cursor
    }

    /// Parks the cursor at −1 and clears the buffer without touching the
    /// underlying stream.
    pub fn reset(&mut self) {
        self.cursor = -1;
        self.buf.clear();
    }

    /// Consumes the history, returning the underlying stream.
    #[must_use]
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn step_forward(&mut self) -> Result<(), HistoryError> {
        let Some(size) = self.read_frame_size()? else {
            return Err(HistoryError::EndOfStream);
        };
        let len = usize::try_from(size).map_err(|_| HistoryError::FrameCorrupt)?;
        let mut patch = vec![0u8; len];
        self.stream.read_exact(&mut patch)?;
        self.stream.seek(SeekFrom::Current(SIZE_FIELD))?;
        self.buf = C::forward(&self.buf, &patch)?;
        self.cursor += 1;
        Ok(())
    }

    fn step_reverse(&mut self) -> Result<(), HistoryError> {
        if self.cursor <= 0 {
            return Err(HistoryError::EndOfStream);
        }
        self.stream.seek(SeekFrom::Current(-SIZE_FIELD))?;
        let mut suffix = [0u8; 8];
        self.stream.read_exact(&mut suffix)?;
        let size = i64::from_le_bytes(suffix);
        let len = usize::try_from(size).map_err(|_| HistoryError::FrameCorrupt)?;
        let frame_span = size
            .checked_add(2 * SIZE_FIELD)
            .ok_or(HistoryError::FrameCorrupt)?;
        self.stream.seek(SeekFrom::Current(-frame_span))?;
        let mut frame = vec![0u8; len + 8];
        self.stream.read_exact(&mut frame)?;
        // Reseek to the frame start so the position invariant (cursor k ⇒
        // stream at end of frame k) holds for the next step.
        self.stream.seek(SeekFrom::Current(-(size + SIZE_FIELD)))?;
        self.buf = C::reverse(&self.buf, &frame[8..])?;
        self.cursor -= 1;
        Ok(())
    }

    /// Reads the next frame's size field, or `None` at a clean end of the
    /// chain. A partial read is an I/O error, not end-of-stream.
    fn read_frame_size(&mut self) -> Result<Option<i64>, HistoryError> {
        let mut bytes = [0u8; 8];
        let mut filled = 0;
        while filled < bytes.len() {
            match self.stream.read(&mut bytes[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
                }
                Ok(n) => filled += n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(Some(i64::from_le_bytes(bytes)))
    }
}

impl<S, C> core::fmt::Debug for History<S, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("History")
            .field("cursor", &self.cursor)
            .field("buffered", &self.buf.len())
            .finish_non_exhaustive()
    }
}
