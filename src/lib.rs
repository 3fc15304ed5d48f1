//! emu-audio-bridge - audio streaming core for emulator frontends
//!
//! Bridges an emulated sound source, which hands over stereo samples in bursts
//! tied to emulation progress, to a real-time output device that pulls fixed
//! blocks on its own schedule. Latency is bounded by a small chunk queue;
//! overflow drops the oldest audio and underrun plays silence.

pub mod audio;
pub mod settings;

pub use audio::{AudioEngine, AudioError, CpalBackend, EngineState, Frame, ProducerAdapter};
pub use settings::AudioSettings;
