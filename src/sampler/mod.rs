// Sampler module - Sample loading, one-shot playback and the transient pool

pub mod loader;
pub mod player;
pub mod pool;
pub mod voice;

pub use loader::{SampleBuffer, SampleError, load_sample};
pub use pool::{TransientVoiceHandle, TransientVoiceId, TransientVoicePool};
pub use voice::SampleVoice;
