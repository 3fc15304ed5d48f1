//! Volume and mute shared between the UI thread and the audio callback
//!
//! Both values live in one `AtomicU64`: the low 32 bits hold the volume as
//! `f32` bits, bit 32 holds the mute flag. The callback loads the word once per
//! block and always sees a volume and mute flag that were set together.

use std::sync::atomic::{AtomicU64, Ordering};

const MUTE_BIT: u64 = 1 << 32;
const VOLUME_MASK: u64 = u32::MAX as u64;

/// Level state as read at the start of an output block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSnapshot {
    pub volume: f32,
    pub muted: bool,
}

#[derive(Debug)]
pub struct LevelControl {
    state: AtomicU64,
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

fn pack(volume: f32, muted: bool) -> u64 {
    let mute = if muted { MUTE_BIT } else { 0 };
    u64::from(volume.to_bits()) | mute
}

impl Default for LevelControl {
    fn default() -> Self {
        Self::new(1.0, false)
    }
}

impl LevelControl {
    pub fn new(volume: f32, muted: bool) -> Self {
        Self {
            state: AtomicU64::new(pack(clamp_volume(volume), muted)),
        }
    }

    #[inline]
    pub fn snapshot(&self) -> LevelSnapshot {
        let bits = self.state.load(Ordering::Acquire);
        LevelSnapshot {
            volume: f32::from_bits((bits & VOLUME_MASK) as u32),
            muted: bits & MUTE_BIT != 0,
        }
    }

    /// Set the volume, clamped to `0.0..=1.0`. Returns the stored value.
    pub fn set_volume(&self, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        let volume_bits = u64::from(volume.to_bits());
        // The closure never returns None, so this cannot fail.
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((bits & MUTE_BIT) | volume_bits)
            });
        volume
    }

    pub fn volume(&self) -> f32 {
        self.snapshot().volume
    }

    /// Flip the mute flag and return the new value
    pub fn toggle_mute(&self) -> bool {
        let previous = self.state.fetch_xor(MUTE_BIT, Ordering::AcqRel);
        previous & MUTE_BIT == 0
    }

    pub fn set_muted(&self, muted: bool) {
        if muted {
            self.state.fetch_or(MUTE_BIT, Ordering::AcqRel);
        } else {
            self.state.fetch_and(!MUTE_BIT, Ordering::AcqRel);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.snapshot().muted
    }
}
