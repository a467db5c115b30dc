// Session - Wires store, voices, clock and recorder from one config
//
// Owns everything a running sequencer needs. The editor side talks to
// `store()` and `set_parameter`; transport goes through `play`/`stop` and the
// recording workflow (`start_with_recording` / `stop_and_collect`).

use crate::audio::backend::AudioBackend;
use crate::audio::mix_bus::MixBus;
use crate::audio::recording::{RecordingController, RecordingError, temp_take_path};
use crate::config::{ConfigError, SessionConfig};
use crate::sequencer::clock::{ClockError, SequencerClock};
use crate::sequencer::store::{PatternError, PatternStore};
use crate::synth::params::{ParamResult, ParamValue};
use crate::synth::voice_registry::VoiceRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    Recording(#[from] RecordingError),
}

pub type SessionResult<T> = Result<T, SessionError>;

pub struct Session {
    config: SessionConfig,
    store: Arc<PatternStore>,
    bus: Arc<MixBus>,
    recorder: RecordingController,
    clock: SequencerClock,
}

impl Session {
    /// Open the default output device, or run headless if there is none
    pub fn open(config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;
        let backend = AudioBackend::open_or_headless(config.sample_rate, config.master_volume);
        Self::with_backend(config, backend)
    }

    /// Session without an output device; the caller renders the bus
    pub fn headless(config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;
        let backend = AudioBackend::headless(config.sample_rate, config.master_volume);
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: SessionConfig, backend: AudioBackend) -> SessionResult<Self> {
        let store = Arc::new(PatternStore::with_defaults(
            config.default_bpm,
            config.default_step_count,
        )?);
        let registry = Arc::new(VoiceRegistry::with_default_kit(&backend, &config));
        let bus = Arc::clone(backend.bus());
        let recorder = RecordingController::new(Arc::clone(&bus));
        let clock = SequencerClock::new(Arc::clone(&store), registry, backend)
            .with_stop_timeout(config.stop_timeout());

        Ok(Self {
            config,
            store,
            bus,
            recorder,
            clock,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<VoiceRegistry> {
        self.clock.registry()
    }

    pub fn clock(&self) -> &SequencerClock {
        &self.clock
    }

    pub fn recorder(&self) -> &RecordingController {
        &self.recorder
    }

    pub fn bus(&self) -> &Arc<MixBus> {
        &self.bus
    }

    /// Forward a parameter change to an instrument
    pub fn set_parameter(
        &self,
        instrument: &str,
        name: &str,
        value: ParamValue,
    ) -> ParamResult<ParamValue> {
        self.registry().update_parameter(instrument, name, value)
    }

    pub fn play(&self) -> SessionResult<()> {
        self.clock.start()?;
        Ok(())
    }

    pub fn stop(&self) {
        self.clock.stop();
    }

    /// Start capturing, then start the clock (REC then PLAY)
    ///
    /// Without a path the take goes to `recording_dir` with a timestamped
    /// name. Returns the file being written.
    pub fn start_with_recording(&self, path: Option<&Path>) -> SessionResult<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => temp_take_path(&self.config.recording_dir),
        };
        self.recorder.start(&path)?;

        if let Err(e) = self.clock.start() {
            // Do not leave an orphan capture running
            if let Err(stop_err) = self.recorder.stop() {
                warn!("Could not finalize take after clock failure: {}", stop_err);
            }
            return Err(e.into());
        }
        Ok(path)
    }

    /// Stop the clock, then finalize the take
    ///
    /// Returns the recorded file, or `None` if nothing was being recorded.
    pub fn stop_and_collect(&self) -> SessionResult<Option<PathBuf>> {
        self.clock.stop();
        let take = self.recorder.stop()?;
        if let Some(path) = &take {
            info!("Take saved to {}", path.display());
        }
        Ok(take)
    }

    /// Finalize any capture, then stop the clock, release voices and close audio
    ///
    /// Best effort; safe to call more than once.
    pub fn shutdown(&self) {
        if let Err(e) = self.recorder.stop() {
            warn!("Recording could not be finalized on shutdown: {}", e);
        }
        self.clock.shutdown();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> SessionConfig {
        SessionConfig {
            sample_rate: 8000,
            sample_dir: dir.join("samples"),
            recording_dir: dir.join("takes"),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_headless_session_wires_default_kit() {
        let dir = tempdir().unwrap();
        let session = Session::headless(test_config(dir.path())).unwrap();

        assert_eq!(session.store().bpm(), 120);
        assert_eq!(session.registry().len(), 5);
        assert_eq!(session.bus().sample_rate(), 8000);
        assert!(session.clock().with_backend(|b| b.is_headless()));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempdir().unwrap();
        let config = SessionConfig {
            default_step_count: 0,
            ..test_config(dir.path())
        };
        assert!(matches!(
            Session::headless(config),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn test_record_take_workflow() {
        let dir = tempdir().unwrap();
        let session = Session::headless(test_config(dir.path())).unwrap();

        let path = session.start_with_recording(None).unwrap();
        assert!(path.starts_with(dir.path().join("takes")));
        assert!(session.clock().is_running());
        assert!(session.recorder().is_recording());

        let mut block = [0.0f32; 512];
        for _ in 0..4 {
            session.bus().render(&mut block);
        }

        let take = session.stop_and_collect().unwrap();
        assert_eq!(take.as_deref(), Some(path.as_path()));
        assert!(!session.clock().is_running());
        assert!(path.exists());

        // Nothing left to collect
        assert!(session.stop_and_collect().unwrap().is_none());
    }
}
