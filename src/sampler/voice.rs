// Sample voice - Percussive one-shots (snare, clap, hihat)
//
// Every trigger starts a fresh playback owned by the voice's transient pool,
// so a hit never cuts the previous one short.

use super::loader::{SampleBuffer, load_sample};
use super::player::SamplePlayer;
use super::pool::TransientVoicePool;
use crate::audio::mix_bus::MixBus;
use crate::audio::parameters::AtomicF32;
use crate::synth::params::{ParamError, ParamResult, ParamSpec, ParamValue, find_spec};
use crate::synth::voice::{Voice, VoiceState};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const SAMPLE_PARAMS: &[ParamSpec] = &[ParamSpec::range("volume", 0.0, 5.0, 1.0)];

pub struct SampleVoice {
    name: String,
    buffer: Option<Arc<SampleBuffer>>,
    output_rate: u32,
    /// Shared with every in-flight player
    volume: AtomicF32,
    pool: TransientVoicePool,
}

impl SampleVoice {
    /// Build a voice around an already decoded buffer
    ///
    /// With `None` the voice is silent: triggers are accepted and ignored.
    pub fn new(
        name: impl Into<String>,
        buffer: Option<Arc<SampleBuffer>>,
        pool: TransientVoicePool,
        output_rate: u32,
    ) -> Self {
        Self {
            name: name.into(),
            buffer,
            output_rate,
            volume: AtomicF32::new(1.0),
            pool,
        }
    }

    /// Load the voice's sample from `path`
    ///
    /// A missing or unreadable asset is logged and yields a silent voice, so
    /// one bad file never prevents the kit from starting.
    pub fn load(
        name: impl Into<String>,
        path: &Path,
        bus: &Arc<MixBus>,
        pool: TransientVoicePool,
    ) -> Self {
        let name = name.into();
        let buffer = match load_sample(path) {
            Ok(buffer) => {
                debug!(
                    "Loaded sample for {}: {} frames at {} Hz",
                    name,
                    buffer.len(),
                    buffer.sample_rate
                );
                Some(Arc::new(buffer))
            }
            Err(e) => {
                warn!("{}: {}; voice will be silent", name, e);
                None
            }
        };
        Self::new(name, buffer, pool, bus.sample_rate())
    }

    pub fn has_sample(&self) -> bool {
        self.buffer.is_some()
    }

    /// In-flight playbacks of this voice
    pub fn pool(&self) -> &TransientVoicePool {
        &self.pool
    }
}

impl Voice for SampleVoice {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger(&self) {
        let Some(buffer) = &self.buffer else {
            return;
        };
        let expected = Duration::from_secs_f64(buffer.duration_secs());
        let id = self.pool.play(
            || SamplePlayer::new(Arc::clone(buffer), self.output_rate, self.volume.clone()),
            expected,
        );
        debug!("{} triggered (playback {})", self.name, id);
    }

    fn update_parameter(&self, name: &str, value: ParamValue) -> ParamResult<ParamValue> {
        let spec = find_spec(SAMPLE_PARAMS, name).ok_or_else(|| ParamError::UnknownParameter {
            voice: self.name.clone(),
            name: name.to_string(),
        })?;
        let stored = spec.coerce(&value)?;
        if let ParamValue::Number(v) = stored {
            self.volume.set(v);
        }
        Ok(stored)
    }

    fn release(&self) {
        let released = self.pool.release_all();
        if released > 0 {
            debug!("{} released {} playbacks", self.name, released);
        }
    }

    fn state(&self) -> VoiceState {
        if self.pool.active_count() > 0 {
            VoiceState::Sounding
        } else {
            VoiceState::Idle
        }
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        SAMPLE_PARAMS
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        (name == "volume").then(|| ParamValue::Number(self.volume.get()))
    }
}
