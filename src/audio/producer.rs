//! Producer side: turns per-sample callbacks from the emulation core into chunks

use ringbuf::traits::Consumer;
use std::sync::Arc;

use super::buffer::{Chunk, ChunkBuffer, ChunkRecycler, Frame, PushOutcome};
use super::stats::Diagnostics;

/// Accumulates emulated samples and hands full chunks to the [`ChunkBuffer`]
///
/// Lives on the emulation thread. `submit` never fails and never waits for
/// the consumer; when the buffer is full the oldest chunk is dropped.
///
/// Only one adapter per buffer exists at a time, since it alone drains the
/// storage recycling ring. Dropping it frees the slot for the next one.
pub struct ProducerAdapter {
    buffer: Arc<ChunkBuffer>,
    stats: Arc<Diagnostics>,
    /// Storage coming back from the audio thread. Always `Some` until drop.
    recycler: Option<ChunkRecycler>,
    staging: Box<[Frame]>,
    filled: usize,
    /// Buffer generation the staged frames belong to
    generation: u64,
}

impl ProducerAdapter {
    /// Create the producer for `buffer`, or `None` if one is already live.
    pub fn new(buffer: Arc<ChunkBuffer>, stats: Arc<Diagnostics>) -> Option<Self> {
        let recycler = buffer.take_recycler()?;
        let staging = fresh_storage(buffer.chunk_frames());
        let generation = buffer.generation();

        Some(Self {
            buffer,
            stats,
            recycler: Some(recycler),
            staging,
            filled: 0,
            generation,
        })
    }

    /// Accept one stereo sample from the emulation core
    #[inline]
    pub fn submit(&mut self, left: f32, right: f32) {
        self.sync_generation();
        self.stage(Frame::new(left, right));
        self.stats.record_submitted(1);
    }

    /// Accept a batch of frames
    pub fn submit_frames(&mut self, frames: &[Frame]) {
        self.sync_generation();
        for &frame in frames {
            self.stage(frame);
        }
        self.stats.record_submitted(frames.len() as u64);
    }

    /// Accept interleaved `L R L R ...` samples. A trailing odd sample is ignored.
    pub fn submit_interleaved(&mut self, samples: &[f32]) {
        self.sync_generation();
        let pairs = samples.chunks_exact(2);
        let count = pairs.len();
        for pair in pairs {
            self.stage(Frame::new(pair[0], pair[1]));
        }
        self.stats.record_submitted(count as u64);
    }

    /// Frames staged but not yet sealed into a chunk
    pub fn pending_frames(&self) -> usize {
        self.filled
    }

    /// Discard the partially staged chunk
    pub fn reset(&mut self) {
        self.filled = 0;
    }

    pub fn buffer(&self) -> &Arc<ChunkBuffer> {
        &self.buffer
    }

    /// Drop staged frames from before the last buffer reset
    #[inline]
    fn sync_generation(&mut self) {
        let current = self.buffer.generation();
        if current != self.generation {
            self.generation = current;
            self.filled = 0;
        }
    }

    #[inline]
    fn stage(&mut self, frame: Frame) {
        // A zero-length chunk size would never seal
        if self.staging.is_empty() {
            return;
        }
        self.staging[self.filled] = frame;
        self.filled += 1;
        if self.filled == self.staging.len() {
            self.seal();
        }
    }

    fn seal(&mut self) {
        let next = self.next_storage();
        let full = std::mem::replace(&mut self.staging, next);
        self.filled = 0;

        if self.buffer.push(Chunk::from_storage(full)) == PushOutcome::EvictedOldest {
            self.stats.record_eviction();
            log::trace!("Chunk buffer full, dropped oldest chunk");
        }
    }

    fn next_storage(&mut self) -> Box<[Frame]> {
        let chunk_frames = self.buffer.chunk_frames();
        self.recycler
            .as_mut()
            .and_then(|r| r.try_pop())
            .unwrap_or_else(|| fresh_storage(chunk_frames))
    }
}

impl Drop for ProducerAdapter {
    fn drop(&mut self) {
        if let Some(recycler) = self.recycler.take() {
            self.buffer.return_recycler(recycler);
        }
    }
}

fn fresh_storage(frames: usize) -> Box<[Frame]> {
    vec![Frame::SILENCE; frames].into_boxed_slice()
}
