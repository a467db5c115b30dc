// Session configuration - Startup settings loaded from a RON file

use crate::sampler::pool::{DEFAULT_GUARD_BAND, DEFAULT_MAX_VOICES};
use crate::sequencer::store::{DEFAULT_BPM, DEFAULT_STEP_COUNT};
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Failed to write config: {0}")]
    Serialize(#[from] ron::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for one sequencer session
///
/// Every field has a default, so a config file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sample rate used when running without an output device
    pub sample_rate: u32,
    /// Directory holding `snare.wav`, `clap.wav` and `hihat.wav`
    pub sample_dir: PathBuf,
    /// Where recorded takes are written
    pub recording_dir: PathBuf,
    pub default_bpm: u32,
    pub default_step_count: usize,
    /// Retained playbacks per sample voice
    pub pool_max_voices: usize,
    pub pool_guard_band_ms: u64,
    /// Bounded wait for the clock thread on stop
    pub stop_timeout_ms: u64,
    pub master_volume: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            sample_dir: PathBuf::from("assets/samples"),
            recording_dir: default_recording_dir(),
            default_bpm: DEFAULT_BPM,
            default_step_count: DEFAULT_STEP_COUNT,
            pool_max_voices: DEFAULT_MAX_VOICES,
            pool_guard_band_ms: DEFAULT_GUARD_BAND.as_millis() as u64,
            stop_timeout_ms: 2000,
            master_volume: 0.5,
        }
    }
}

/// User audio directory when the platform has one, `exports` otherwise
fn default_recording_dir() -> PathBuf {
    dirs::audio_dir()
        .map(|dir| dir.join("pulsegrid"))
        .unwrap_or_else(|| PathBuf::from("exports"))
}

impl SessionConfig {
    /// Read and validate a config file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron(&text)
    }

    pub fn from_ron(text: &str) -> ConfigResult<Self> {
        let config: SessionConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron(&self) -> ConfigResult<String> {
        Ok(ron::ser::to_string_pretty(self, PrettyConfig::default())?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.default_bpm == 0 {
            return Err(ConfigError::Invalid("default_bpm must be positive".into()));
        }
        if self.default_step_count == 0 {
            return Err(ConfigError::Invalid(
                "default_step_count must be positive".into(),
            ));
        }
        if self.pool_max_voices == 0 {
            return Err(ConfigError::Invalid("pool_max_voices must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.master_volume) {
            return Err(ConfigError::Invalid(format!(
                "master_volume must be within 0.0..=2.0, got {}",
                self.master_volume
            )));
        }
        Ok(())
    }

    pub fn pool_guard_band(&self) -> Duration {
        Duration::from_millis(self.pool_guard_band_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Location of a kit sample: `<sample_dir>/<name>.wav`
    pub fn sample_path(&self, name: &str) -> PathBuf {
        self.sample_dir.join(format!("{}.wav", name))
    }
}
