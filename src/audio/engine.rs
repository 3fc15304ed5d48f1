//! Audio engine - owns the pipeline and drives its lifecycle
//!
//! `Stopped -> Started -> (Paused <-> Started) -> Stopped`
//!
//! Pausing releases the output stream, so the device callback stops
//! entirely. The emulation side may keep submitting while paused; the chunk
//! buffer stays bounded by evicting its oldest chunk. Resuming discards
//! whatever piled up and re-acquires the device once.

use std::sync::Arc;

use super::buffer::ChunkBuffer;
use super::level::LevelControl;
use super::output::{AudioError, OutputBackend, OutputDriver};
use super::producer::ProducerAdapter;
use super::stats::{Diagnostics, DiagnosticsSnapshot};
use crate::settings::AudioSettings;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Stopped,
    Started,
    Paused,
}

/// Explicit owner of the audio pipeline
pub struct AudioEngine<B: OutputBackend> {
    backend: B,
    settings: AudioSettings,
    buffer: Arc<ChunkBuffer>,
    level: Arc<LevelControl>,
    stats: Arc<Diagnostics>,
    /// Live device stream; dropping it releases the device
    stream: Option<B::Stream>,
    state: EngineState,
}

impl<B: OutputBackend> AudioEngine<B> {
    pub fn new(backend: B, settings: AudioSettings) -> Result<Self, AudioError> {
        settings.validate()?;

        let buffer = Arc::new(ChunkBuffer::new(settings.max_depth, settings.chunk_frames));
        let level = Arc::new(LevelControl::new(settings.volume, settings.muted));

        log::debug!(
            "Audio engine: {} Hz, {} x {} frame chunks, {} frame blocks, max latency {:?}",
            settings.sample_rate,
            settings.max_depth,
            settings.chunk_frames,
            settings.block_frames,
            settings.latency()
        );

        Ok(Self {
            backend,
            settings,
            buffer,
            level,
            stats: Arc::new(Diagnostics::new()),
            stream: None,
            state: EngineState::Stopped,
        })
    }

    /// Take the producer adapter feeding this engine's buffer.
    ///
    /// Hand it to the emulation core; it stays valid across start/stop.
    /// Returns `None` while a previous adapter is still alive.
    pub fn take_producer(&self) -> Option<ProducerAdapter> {
        ProducerAdapter::new(Arc::clone(&self.buffer), Arc::clone(&self.stats))
    }

    /// Acquire the output device and start the callback
    pub fn start(&mut self) -> Result<(), AudioError> {
        match self.state {
            EngineState::Started => return Ok(()),
            EngineState::Paused => return self.resume(),
            EngineState::Stopped => {}
        }

        log::info!("Starting audio output...");
        self.buffer.reset();
        self.open_stream()?;
        self.state = EngineState::Started;
        Ok(())
    }

    /// Release the device stream but keep the pipeline
    pub fn pause(&mut self) {
        if self.state != EngineState::Started {
            return;
        }
        self.stream = None;
        self.state = EngineState::Paused;
        log::info!("Audio paused");
    }

    /// Drop stale audio and re-acquire the device
    pub fn resume(&mut self) -> Result<(), AudioError> {
        if self.state != EngineState::Paused {
            return Ok(());
        }

        self.buffer.reset();
        if let Err(e) = self.open_stream() {
            log::error!("Failed to resume audio: {}", e);
            return Err(e);
        }
        self.state = EngineState::Started;
        log::info!("Audio resumed");
        Ok(())
    }

    /// Release the device and drain all state
    pub fn stop(&mut self) {
        if self.state == EngineState::Stopped {
            return;
        }
        self.stream = None;
        self.buffer.reset();
        self.stats.reset();
        self.state = EngineState::Stopped;
        log::info!("Audio stopped");
    }

    fn open_stream(&mut self) -> Result<(), AudioError> {
        let driver = OutputDriver::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.level),
            Arc::clone(&self.stats),
            self.settings.block_frames,
        );
        self.stream = Some(self.backend.open(&self.settings, driver)?);
        Ok(())
    }

    pub fn set_volume(&self, volume: f32) -> f32 {
        self.level.set_volume(volume)
    }

    pub fn volume(&self) -> f32 {
        self.level.volume()
    }

    pub fn toggle_mute(&self) -> bool {
        let muted = self.level.toggle_mute();
        log::debug!("Audio {}", if muted { "muted" } else { "unmuted" });
        muted
    }

    pub fn is_muted(&self) -> bool {
        self.level.is_muted()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.stats.snapshot()
    }

    pub fn buffer(&self) -> &Arc<ChunkBuffer> {
        &self.buffer
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Frame;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory device: records opens and exposes the last driver
    #[derive(Clone, Default)]
    struct MockBackend {
        opens: Arc<AtomicUsize>,
        live: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
        driver: Arc<Mutex<Option<OutputDriver>>>,
    }

    struct MockStream {
        live: Arc<AtomicUsize>,
    }

    impl Drop for MockStream {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl OutputBackend for MockBackend {
        type Stream = MockStream;

        fn open(
            &mut self,
            _settings: &AudioSettings,
            driver: OutputDriver,
        ) -> Result<MockStream, AudioError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AudioError::NoDevice);
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.live.fetch_add(1, Ordering::SeqCst);
            *self.driver.lock().unwrap() = Some(driver);
            Ok(MockStream {
                live: Arc::clone(&self.live),
            })
        }
    }

    impl MockBackend {
        /// Run one device callback of `frames` stereo frames
        fn render(&self, frames: usize) -> Vec<f32> {
            let mut block = vec![0.5_f32; frames * 2];
            let mut slot = self.driver.lock().unwrap();
            slot.as_mut().unwrap().render(&mut block, 2);
            block
        }
    }

    fn engine(settings: AudioSettings) -> (AudioEngine<MockBackend>, MockBackend) {
        let backend = MockBackend::default();
        let engine = AudioEngine::new(backend.clone(), settings).unwrap();
        (engine, backend)
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut engine, backend) = engine(AudioSettings::default());

        engine.start().unwrap();
        engine.start().unwrap();

        assert_eq!(engine.state(), EngineState::Started);
        assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
        assert_eq!(backend.live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let (mut engine, backend) = engine(AudioSettings::default());
        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(backend.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_start_failure_is_recoverable() {
        let (mut engine, backend) = engine(AudioSettings::default());
        backend.fail.store(true, Ordering::SeqCst);

        assert!(matches!(engine.start(), Err(AudioError::NoDevice)));
        assert_eq!(engine.state(), EngineState::Stopped);

        // Producer keeps working without a device
        let mut producer = engine.take_producer().unwrap();
        for _ in 0..4096 {
            producer.submit(0.1, 0.1);
        }
        assert_eq!(engine.buffer().len(), 2);

        backend.fail.store(false, Ordering::SeqCst);
        engine.start().unwrap();
        assert_eq!(engine.state(), EngineState::Started);
        assert!(engine.buffer().is_empty());
    }

    #[test]
    fn test_pause_releases_device_and_resume_discards_stale_audio() {
        let (mut engine, backend) = engine(AudioSettings::default());
        let mut producer = engine.take_producer().unwrap();
        engine.start().unwrap();

        engine.pause();
        assert_eq!(engine.state(), EngineState::Paused);
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);

        for _ in 0..2048 * 5 {
            producer.submit(0.9, 0.9);
        }
        assert_eq!(engine.buffer().len(), 3);

        engine.resume().unwrap();
        assert_eq!(engine.state(), EngineState::Started);
        assert_eq!(backend.opens.load(Ordering::SeqCst), 2);
        assert!(engine.buffer().is_empty());
        assert!(backend.render(64).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_resume_failure_stays_paused() {
        let (mut engine, backend) = engine(AudioSettings::default());
        engine.start().unwrap();
        engine.pause();

        backend.fail.store(true, Ordering::SeqCst);
        assert!(engine.resume().is_err());
        assert_eq!(engine.state(), EngineState::Paused);

        backend.fail.store(false, Ordering::SeqCst);
        engine.start().unwrap();
        assert_eq!(engine.state(), EngineState::Started);
    }

    #[test]
    fn test_pause_and_resume_outside_their_states_are_noops() {
        let (mut engine, backend) = engine(AudioSettings::default());
        engine.pause();
        assert_eq!(engine.state(), EngineState::Stopped);
        engine.resume().unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(backend.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_drains_buffer_and_counters() {
        let (mut engine, backend) = engine(AudioSettings::default());
        let mut producer = engine.take_producer().unwrap();
        engine.start().unwrap();

        for _ in 0..2048 * 2 {
            producer.submit(0.2, 0.2);
        }
        backend.render(16);
        assert!(engine.diagnostics().frames_submitted > 0);

        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(engine.buffer().is_empty());
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
        assert_eq!(engine.diagnostics(), DiagnosticsSnapshot::default());
    }

    #[test]
    fn test_level_controls() {
        let (engine, backend) = engine(AudioSettings {
            volume: 0.5,
            ..Default::default()
        });
        assert_eq!(engine.volume(), 0.5);
        assert_eq!(engine.set_volume(2.0), 1.0);
        assert!(engine.toggle_mute());
        assert!(engine.is_muted());
        assert!(!engine.toggle_mute());
        assert_eq!(backend.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let result = AudioEngine::new(
            MockBackend::default(),
            AudioSettings {
                max_depth: 0,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(AudioError::InvalidSettings(_))));
    }

    #[test]
    fn test_end_to_end_constant_signal() {
        let (mut engine, backend) = engine(AudioSettings::default());
        let mut producer = engine.take_producer().unwrap();
        engine.start().unwrap();

        for _ in 0..6144 {
            producer.submit(1.0, -1.0);
        }

        let first = engine.buffer().pull(4096);
        assert_eq!(first.len(), 4096);
        assert!(first.iter().all(|f| *f == Frame::new(1.0, -1.0)));

        let second = engine.buffer().pull(2048);
        assert_eq!(second.len(), 2048);
        assert!(second.iter().all(|f| *f == Frame::new(1.0, -1.0)));

        assert!(engine.buffer().pull(4096).is_empty());
        assert!(engine.buffer().pull(1).is_empty());

        // The device sees silence once the producer stops
        assert!(backend.render(4096).iter().all(|&s| s == 0.0));
        assert_eq!(engine.diagnostics().underrun_blocks, 1);
    }

    #[test]
    fn test_device_block_through_engine() {
        let (mut engine, backend) = engine(AudioSettings::default());
        let mut producer = engine.take_producer().unwrap();
        engine.start().unwrap();
        engine.set_volume(0.5);

        for _ in 0..4096 {
            producer.submit(0.8, -0.8);
        }

        let block = backend.render(4096);
        assert!(block
            .chunks(2)
            .all(|f| (f[0] - 0.4).abs() < 1e-6 && (f[1] + 0.4).abs() < 1e-6));
        assert_eq!(engine.diagnostics().underrun_blocks, 0);

        engine.toggle_mute();
        for _ in 0..2048 {
            producer.submit(0.8, -0.8);
        }
        assert!(backend.render(4096).iter().all(|&s| s == 0.0));
        assert!(engine.buffer().is_empty());
    }

    #[test]
    fn test_producer_handed_out_once_at_a_time() {
        let (engine, _backend) = engine(AudioSettings::default());
        let producer = engine.take_producer().unwrap();
        assert!(engine.take_producer().is_none());

        drop(producer);
        assert!(engine.take_producer().is_some());
    }

    #[test]
    fn test_restart_drops_frames_staged_before_stop() {
        let (mut engine, _backend) = engine(AudioSettings {
            chunk_frames: 8,
            ..Default::default()
        });
        let mut producer = engine.take_producer().unwrap();
        engine.start().unwrap();

        for _ in 0..5 {
            producer.submit(0.9, 0.9);
        }
        engine.stop();
        engine.start().unwrap();

        for _ in 0..8 {
            producer.submit(0.1, 0.1);
        }
        let frames = engine.buffer().pull(8);
        assert_eq!(frames.len(), 8);
        assert!(frames.iter().all(|f| *f == Frame::new(0.1, 0.1)));
    }
}
