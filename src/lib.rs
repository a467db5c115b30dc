// pulsegrid - Real-time step sequencer engine
//
// Library exports for the binary and the integration tests.

pub mod audio;
pub mod config;
pub mod sampler;
pub mod sequencer;
pub mod session;
pub mod synth;

// Re-export commonly used types for convenience
pub use audio::{AudioBackend, MixBus, RecordingController};
pub use config::SessionConfig;
pub use sampler::TransientVoicePool;
pub use sequencer::{ClockState, Pattern, PatternStore, SequencerClock, StepState};
pub use session::{Session, SessionError};
pub use synth::{ParamValue, Voice, VoiceRegistry, VoiceState};
