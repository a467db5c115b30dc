// Synth module - Voice abstraction, tonal voices and the registry

pub mod envelope;
pub mod oscillator;
pub mod params;
pub mod tonal;
pub mod voice;
pub mod voice_registry;

pub use params::{ParamDomain, ParamError, ParamSpec, ParamValue};
pub use tonal::{BassVoice, KickVoice};
pub use voice::{Voice, VoiceState};
pub use voice_registry::VoiceRegistry;
