// Voice registry - Instrument name to voice, resolved once at startup
//
// The map is built before the clock starts and never changes afterwards, so
// lookups from the timing thread need no lock. Voices synchronize their own
// state.

use super::params::{ParamError, ParamResult, ParamSpec, ParamValue};
use super::tonal::{BassVoice, KickVoice};
use super::voice::Voice;
use crate::audio::backend::AudioBackend;
use crate::config::SessionConfig;
use crate::sampler::pool::TransientVoicePool;
use crate::sampler::voice::SampleVoice;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

/// Instruments of the default kit, in pad order
pub const DEFAULT_KIT: &[&str] = &["kick", "snare", "clap", "hihat", "bass"];

/// Sample-based members of the default kit
const SAMPLE_INSTRUMENTS: &[&str] = &["snare", "clap", "hihat"];

#[derive(Default)]
pub struct VoiceRegistry {
    voices: BTreeMap<String, Box<dyn Voice>>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kick, bass and the three sample voices, routed to `backend`'s bus
    ///
    /// Sample voices read `<sample_dir>/<name>.wav`; a missing file leaves
    /// that voice silent.
    pub fn with_default_kit(backend: &AudioBackend, config: &SessionConfig) -> Self {
        let bus = backend.bus();
        let mut registry = Self::new();

        registry.insert(KickVoice::new("kick", bus));
        registry.insert(BassVoice::new("bass", bus));

        for &name in SAMPLE_INSTRUMENTS {
            let pool = TransientVoicePool::new(
                Arc::clone(bus),
                config.pool_max_voices,
                config.pool_guard_band(),
            );
            registry.insert(SampleVoice::load(name, &config.sample_path(name), bus, pool));
        }

        info!("Voice registry ready: {}", registry.names().join(", "));
        registry
    }

    /// Register a voice under its own name, replacing any previous one
    pub fn insert(&mut self, voice: impl Voice + 'static) {
        self.voices.insert(voice.name().to_string(), Box::new(voice));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Voice> {
        self.voices.get(name).map(|v| v.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.voices.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.voices.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Trigger an instrument; unknown names are skipped
    pub fn trigger(&self, name: &str) -> bool {
        match self.voices.get(name) {
            Some(voice) => {
                voice.trigger();
                true
            }
            None => false,
        }
    }

    /// Forward a parameter change; failures are logged and returned, never fatal
    pub fn update_parameter(
        &self,
        instrument: &str,
        name: &str,
        value: ParamValue,
    ) -> ParamResult<ParamValue> {
        let result = match self.voices.get(instrument) {
            Some(voice) => voice.update_parameter(name, value),
            None => Err(ParamError::UnknownInstrument(instrument.to_string())),
        };
        if let Err(e) = &result {
            warn!("Parameter update ignored: {}", e);
        }
        result
    }

    /// Current value of one instrument parameter
    pub fn parameter(&self, instrument: &str, name: &str) -> Option<ParamValue> {
        self.voices.get(instrument)?.parameter(name)
    }

    /// Declared parameters of an instrument
    pub fn parameters(&self, instrument: &str) -> Option<&'static [ParamSpec]> {
        self.voices.get(instrument).map(|v| v.parameters())
    }

    /// Silence every voice
    ///
    /// Each release is guarded, so one failing voice does not keep the others
    /// sounding.
    pub fn release_all(&self) {
        for (name, voice) in &self.voices {
            if panic::catch_unwind(AssertUnwindSafe(|| voice.release())).is_err() {
                warn!("Release of {} panicked", name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::voice::VoiceState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingVoice {
        name: &'static str,
        hits: Arc<AtomicUsize>,
    }

    impl Voice for CountingVoice {
        fn name(&self) -> &str {
            self.name
        }
        fn trigger(&self) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        fn update_parameter(&self, name: &str, _: ParamValue) -> ParamResult<ParamValue> {
            Err(ParamError::UnknownParameter {
                voice: self.name.to_string(),
                name: name.to_string(),
            })
        }
        fn release(&self) {
            panic!("release failure");
        }
        fn state(&self) -> VoiceState {
            VoiceState::Idle
        }
        fn parameters(&self) -> &'static [ParamSpec] {
            &[]
        }
        fn parameter(&self, _: &str) -> Option<ParamValue> {
            None
        }
    }

    #[test]
    fn test_default_kit() {
        let backend = AudioBackend::headless(8000, 1.0);
        let config = SessionConfig {
            sample_dir: "does/not/exist".into(),
            ..SessionConfig::default()
        };
        let registry = VoiceRegistry::with_default_kit(&backend, &config);

        assert_eq!(registry.names(), vec!["bass", "clap", "hihat", "kick", "snare"]);
        for name in DEFAULT_KIT {
            assert!(registry.contains(name));
        }
        // Missing samples give silent voices, triggers are harmless
        assert!(registry.trigger("snare"));
        assert!(registry.trigger("kick"));
        assert!(!registry.trigger("cowbell"));
    }

    #[test]
    fn test_update_parameter_routing() {
        let backend = AudioBackend::headless(8000, 1.0);
        let registry = VoiceRegistry::with_default_kit(&backend, &SessionConfig::default());

        assert_eq!(
            registry.update_parameter("kick", "decay", ParamValue::Number(3.0)),
            Ok(ParamValue::Number(1.0))
        );
        assert_eq!(registry.parameter("kick", "decay"), Some(ParamValue::Number(1.0)));
        assert_eq!(
            registry.update_parameter("cowbell", "volume", ParamValue::Number(1.0)),
            Err(ParamError::UnknownInstrument("cowbell".to_string()))
        );
        assert!(registry
            .update_parameter("hihat", "cutoff", ParamValue::Number(1.0))
            .is_err());
        assert_eq!(registry.parameters("bass").map(|p| p.len()), Some(4));
    }

    #[test]
    fn test_release_all_survives_a_panicking_voice() {
        let backend = AudioBackend::headless(8000, 1.0);
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = VoiceRegistry::new();
        registry.insert(CountingVoice {
            name: "broken",
            hits: Arc::clone(&hits),
        });
        registry.insert(KickVoice::new("kick", backend.bus()));

        let kick = registry.get("kick").unwrap();
        kick.trigger();
        assert!(kick.is_sounding());

        registry.release_all();
        assert!(!registry.get("kick").unwrap().is_sounding());

        assert!(registry.trigger("broken"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
