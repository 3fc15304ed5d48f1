//! Diagnostic counters shared by the producer and the audio callback
//!
//! Relaxed atomics only; bumping a counter never blocks or allocates, so the
//! output driver may do it from the real-time thread.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Diagnostics {
    frames_submitted: AtomicU64,
    chunks_evicted: AtomicU64,
    underrun_blocks: AtomicU64,
    padded_frames: AtomicU64,
}

/// Point-in-time copy of [`Diagnostics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub frames_submitted: u64,
    pub chunks_evicted: u64,
    pub underrun_blocks: u64,
    pub padded_frames: u64,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_submitted(&self, frames: u64) {
        self.frames_submitted.fetch_add(frames, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_eviction(&self) {
        self.chunks_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// One output block came up `padded` frames short
    #[inline]
    pub fn record_underrun(&self, padded: u64) {
        self.underrun_blocks.fetch_add(1, Ordering::Relaxed);
        self.padded_frames.fetch_add(padded, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            chunks_evicted: self.chunks_evicted.load(Ordering::Relaxed),
            underrun_blocks: self.underrun_blocks.load(Ordering::Relaxed),
            padded_frames: self.padded_frames.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.frames_submitted.store(0, Ordering::Relaxed);
        self.chunks_evicted.store(0, Ordering::Relaxed);
        self.underrun_blocks.store(0, Ordering::Relaxed);
        self.padded_frames.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_reset() {
        let stats = Diagnostics::new();
        stats.record_submitted(10);
        stats.record_eviction();
        stats.record_underrun(7);
        stats.record_underrun(3);

        let snap = stats.snapshot();
        assert_eq!(snap.frames_submitted, 10);
        assert_eq!(snap.chunks_evicted, 1);
        assert_eq!(snap.underrun_blocks, 2);
        assert_eq!(snap.padded_frames, 10);

        stats.reset();
        assert_eq!(stats.snapshot(), DiagnosticsSnapshot::default());
    }
}
