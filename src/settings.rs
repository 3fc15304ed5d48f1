use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::AudioError;

/// Returns the path to the settings file: `~/.config/emu-audio-bridge/audio.json`
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("emu-audio-bridge");
    path.push("audio.json");
    path
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Audio pipeline configuration.
///
/// Fields use `#[serde(default)]` so a partial file only overrides
/// what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Frames per chunk handed from producer to buffer
    pub chunk_frames: usize,
    /// Maximum number of chunks buffered before the oldest is dropped
    pub max_depth: usize,
    /// Frames per device callback block
    pub block_frames: usize,

    // Initial level
    pub volume: f32,
    pub muted: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            chunk_frames: 2048,
            max_depth: 3,
            block_frames: 4096,

            volume: 1.0,
            muted: false,
        }
    }
}

impl AudioSettings {
    /// Load settings from the config directory, falling back to defaults on any error.
    pub fn load() -> Self {
        let path = settings_path();
        match Self::load_from(&path) {
            Ok(settings) => {
                log::info!("Loaded audio settings from {}", path.display());
                settings
            }
            Err(SettingsError::Io(e)) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
            Err(e) => {
                log::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), AudioError> {
        let invalid = |msg: &str| -> Result<(), AudioError> {
            Err(AudioError::InvalidSettings(msg.to_string()))
        };

        if self.sample_rate == 0 {
            return invalid("sample_rate must be non-zero");
        }
        if self.chunk_frames == 0 {
            return invalid("chunk_frames must be non-zero");
        }
        if self.max_depth == 0 {
            return invalid("max_depth must be non-zero");
        }
        if self.block_frames == 0 {
            return invalid("block_frames must be non-zero");
        }
        if !self.volume.is_finite() {
            return invalid("volume must be a finite number");
        }
        Ok(())
    }

    /// Worst-case audio held in the chunk buffer
    pub fn latency(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = (self.max_depth * self.chunk_frames) as f64;
        Duration::from_secs_f64(frames / f64::from(self.sample_rate))
    }
}
