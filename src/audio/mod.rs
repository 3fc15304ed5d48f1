//! Audio module - moves emulator samples to the output device
//!
//! This module provides:
//! - Bounded chunk buffer shared by the emulation and audio threads
//! - Producer adapter that chunks per-sample callbacks
//! - Output driver run by the device callback
//! - Lock-free volume/mute control
//! - Engine owning the pipeline lifecycle

mod buffer;
mod engine;
mod level;
mod output;
mod producer;
mod stats;

pub use buffer::{Chunk, ChunkBuffer, ChunkRecycler, Frame, PushOutcome};
pub use engine::{AudioEngine, EngineState};
pub use level::{LevelControl, LevelSnapshot};
pub use output::{AudioError, CpalBackend, OutputBackend, OutputDriver};
pub use producer::ProducerAdapter;
pub use stats::{Diagnostics, DiagnosticsSnapshot};
