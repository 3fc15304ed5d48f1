//! Bounded chunk queue shared between the emulation thread and the audio callback
//!
//! The emulation core produces samples in bursts tied to emulated frames, while
//! the output device drains them at its own fixed pace. Samples travel between
//! the two in fixed-size [`Chunk`]s held by a [`ChunkBuffer`].
//!
//! ## Design
//!
//! - The queue never holds more than `max_depth` chunks. Pushing into a full
//!   queue evicts the oldest chunk, so `push` always succeeds and buffered
//!   latency stays bounded.
//! - A partially read head chunk stays whole; only a read offset moves.
//! - Push, pull and clear each hold one short critical section. Nothing inside
//!   it allocates, frees, logs or does I/O.
//! - Chunk storage that has been played or evicted is handed back to the
//!   producer through a lock-free SPSC ring (`ringbuf`), so in steady state
//!   neither thread touches the allocator.

use ringbuf::{
    traits::{Producer, Split},
    HeapRb,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One stereo sample pair
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub right: f32,
}

impl Frame {
    pub const SILENCE: Frame = Frame {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn scaled(self, gain: f32) -> Self {
        Self {
            left: self.left * gain,
            right: self.right * gain,
        }
    }
}

/// A sealed, immutable run of frames
#[derive(Debug)]
pub struct Chunk {
    frames: Box<[Frame]>,
}

impl Chunk {
    /// Seal storage into a chunk. The storage is never written again
    /// until it comes back through the recycler.
    pub fn from_storage(frames: Box<[Frame]>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn into_storage(self) -> Box<[Frame]> {
        self.frames
    }
}

/// Result of pushing a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended without displacing anything
    Queued,
    /// The queue was full; the oldest chunk was dropped to make room
    EvictedOldest,
}

/// Consumer half of the storage recycling ring (owned by the producer side)
pub type ChunkRecycler = ringbuf::HeapCons<Box<[Frame]>>;

struct Inner {
    chunks: VecDeque<Chunk>,
    /// Frames already consumed from `chunks[0]`
    read_offset: usize,
    spares: ringbuf::HeapProd<Box<[Frame]>>,
}

impl Inner {
    fn retire_head(&mut self) {
        self.read_offset = 0;
        if let Some(chunk) = self.chunks.pop_front() {
            self.recycle(chunk);
        }
    }

    fn recycle(&mut self, chunk: Chunk) {
        // The single producer adapter keeps at most one chunk outside the
        // queue, so this only fails for chunks pushed around it.
        let _ = self.spares.try_push(chunk.into_storage());
    }
}

/// Thread-safe bounded FIFO of chunks
pub struct ChunkBuffer {
    inner: Mutex<Inner>,
    /// Held by the live producer adapter, returned when it is dropped
    recycler: Mutex<Option<ChunkRecycler>>,
    /// Bumped by `reset`; tells the producer to discard its staging
    generation: AtomicU64,
    max_depth: usize,
    chunk_frames: usize,
}

impl ChunkBuffer {
    /// Create an empty buffer holding at most `max_depth` chunks of
    /// `chunk_frames` frames each.
    pub fn new(max_depth: usize, chunk_frames: usize) -> Self {
        let max_depth = max_depth.max(1);
        // Queue + one staging chunk is the most storage ever in flight.
        let (spares, recycler) = HeapRb::<Box<[Frame]>>::new(max_depth + 1).split();

        Self {
            inner: Mutex::new(Inner {
                chunks: VecDeque::with_capacity(max_depth),
                read_offset: 0,
                spares,
            }),
            recycler: Mutex::new(Some(recycler)),
            generation: AtomicU64::new(0),
            max_depth,
            chunk_frames,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the recycling ring consumer. `None` while a producer holds it.
    pub fn take_recycler(&self) -> Option<ChunkRecycler> {
        self.recycler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Hand the recycling ring consumer back for the next producer
    pub fn return_recycler(&self, recycler: ChunkRecycler) {
        *self.recycler.lock().unwrap_or_else(PoisonError::into_inner) = Some(recycler);
    }

    /// Append a chunk at the tail, evicting the oldest one if the queue is full.
    pub fn push(&self, chunk: Chunk) -> PushOutcome {
        let mut inner = self.lock();
        let outcome = if inner.chunks.len() >= self.max_depth {
            inner.retire_head();
            PushOutcome::EvictedOldest
        } else {
            PushOutcome::Queued
        };
        inner.chunks.push_back(chunk);
        outcome
    }

    /// Copy up to `dest.len()` frames from the head into `dest`.
    ///
    /// Returns the number of frames written. This is less than `dest.len()`
    /// only when the buffer ran dry. Safe to call from the audio callback.
    pub fn pull_into(&self, dest: &mut [Frame]) -> usize {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let mut written = 0;

        while written < dest.len() {
            let Some(head) = inner.chunks.front() else {
                break;
            };
            let remaining = &head.frames()[inner.read_offset.min(head.len())..];
            let n = remaining.len().min(dest.len() - written);
            dest[written..written + n].copy_from_slice(&remaining[..n]);
            written += n;

            if n == remaining.len() {
                inner.retire_head();
            } else {
                inner.read_offset += n;
            }
        }

        written
    }

    /// Remove and return up to `n` frames from the head.
    ///
    /// Allocates the result; the audio callback uses [`Self::pull_into`].
    pub fn pull(&self, n: usize) -> Vec<Frame> {
        let mut frames = vec![Frame::SILENCE; n];
        let written = self.pull_into(&mut frames);
        frames.truncate(written);
        frames
    }

    /// Drop every buffered chunk. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.chunks.len();
        while !inner.chunks.is_empty() {
            inner.retire_head();
        }
        dropped
    }

    /// Clear the queue and tell the producer to drop its partial chunk.
    ///
    /// Used on lifecycle transitions; the audio callback only calls `clear`.
    pub fn reset(&self) -> usize {
        let dropped = self.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
        dropped
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Number of queued chunks, including a partially read head
    pub fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().chunks.is_empty()
    }

    /// Frames still waiting to be pulled
    pub fn buffered_frames(&self) -> usize {
        let inner = self.lock();
        let total: usize = inner.chunks.iter().map(Chunk::len).sum();
        total - inner.read_offset.min(total)
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames
    }
}
