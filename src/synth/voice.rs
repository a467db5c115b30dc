// Voice - One instrument slot driven by the sequencer
//
// A voice is created once at startup and lives for the whole session. All
// methods take `&self`: the mutable rendering state sits behind the same lock
// the audio thread takes, so a parameter update is never observed half
// applied.

use super::params::{ParamResult, ParamSpec, ParamValue};

/// Whether a voice is currently producing sound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Sounding,
}

pub trait Voice: Send + Sync {
    /// Instrument name the voice is registered under
    fn name(&self) -> &str;

    /// Start the sound at the next audio block
    ///
    /// Retriggering restarts the envelopes instead of layering. Sample voices
    /// start an independent playback per call.
    fn trigger(&self);

    /// Validate and apply a parameter change
    ///
    /// Numbers outside the declared range are clamped; the value actually
    /// stored is returned.
    fn update_parameter(&self, name: &str, value: ParamValue) -> ParamResult<ParamValue>;

    /// Silence the voice promptly, whatever its envelope stage
    fn release(&self);

    fn state(&self) -> VoiceState;

    /// Declared parameters with their domains
    fn parameters(&self) -> &'static [ParamSpec];

    /// Current value of a parameter
    fn parameter(&self, name: &str) -> Option<ParamValue>;

    fn is_sounding(&self) -> bool {
        self.state() == VoiceState::Sounding
    }
}
