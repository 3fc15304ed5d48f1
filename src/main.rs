//! emu-audio-bridge - headless host
//!
//! Stands in for an emulator frontend: feeds a tone through the audio engine
//! one video frame at a time, with the uneven pacing a real emulation loop
//! has, and walks the engine through mute, pause/resume and stop.
//!
//! Usage: `emu-audio-bridge [seconds]`

use std::f32::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use emu_audio_bridge::{AudioEngine, AudioSettings, CpalBackend, ProducerAdapter};

const FRAMES_PER_SECOND: u32 = 60;
const TONE_HZ: f32 = 440.0;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting emu-audio-bridge");

    let seconds: f32 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(6.0);

    let settings = AudioSettings::load();
    let mut engine = match AudioEngine::new(CpalBackend::new(), settings) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = engine.start() {
        log::error!("Audio unavailable ({}), continuing without sound", e);
    }

    let Some(mut producer) = engine.take_producer() else {
        log::error!("Audio producer already in use");
        std::process::exit(1);
    };
    let mut tone = Tone::new(engine.settings().sample_rate);
    let frame_time = Duration::from_secs_f32(1.0 / FRAMES_PER_SECOND as f32);
    let total_frames = (seconds * FRAMES_PER_SECOND as f32) as u32;

    // Frame numbers at which the UI would poke the engine
    let mute_at = total_frames / 3;
    let unmute_at = mute_at + FRAMES_PER_SECOND / 2;
    let pause_at = total_frames / 2;
    let resume_at = pause_at + FRAMES_PER_SECOND / 2;

    let started = Instant::now();
    for frame in 0..total_frames {
        match frame {
            f if f == mute_at || f == unmute_at => {
                let muted = engine.toggle_mute();
                log::info!("Mute: {}", muted);
            }
            f if f == pause_at => engine.pause(),
            f if f == resume_at => {
                if let Err(e) = engine.resume() {
                    log::warn!("Resume failed: {}", e);
                }
            }
            _ => {}
        }

        run_emulated_frame(&mut producer, &mut tone, frame);

        let deadline = frame_time * (frame + 1);
        if let Some(wait) = deadline.checked_sub(started.elapsed()) {
            thread::sleep(wait);
        }
    }

    let stats = engine.diagnostics();
    log::info!(
        "Submitted {} frames, evicted {} chunks, {} underrun blocks ({} frames of padding)",
        stats.frames_submitted,
        stats.chunks_evicted,
        stats.underrun_blocks,
        stats.padded_frames
    );

    engine.stop();
}

/// Emit one video frame's worth of samples. Every seventh frame runs long
/// and the one after it short, like a core catching up after a slow frame.
fn run_emulated_frame(producer: &mut ProducerAdapter, tone: &mut Tone, frame: u32) {
    let nominal = tone.sample_rate / FRAMES_PER_SECOND;
    let samples = match frame % 7 {
        5 => nominal + nominal / 4,
        6 => nominal - nominal / 4,
        _ => nominal,
    };

    for _ in 0..samples {
        let s = tone.sample() * 0.25;
        producer.submit(s, s);
    }
}

/// Sine oscillator standing in for the emulated sound chip
struct Tone {
    sample_rate: u32,
    phase: f32,
}

impl Tone {
    fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            phase: 0.0,
        }
    }

    fn sample(&mut self) -> f32 {
        let value = (self.phase * TAU).sin();
        self.phase = (self.phase + TONE_HZ / self.sample_rate as f32).fract();
        value
    }
}
