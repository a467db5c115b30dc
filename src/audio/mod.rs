// Audio module - Output back-end, mix bus and capture

pub mod backend;
pub mod dsp_utils;
pub mod format_conversion;
pub mod mix_bus;
pub mod parameters;
pub mod recording;
pub mod status;

pub use backend::{AudioBackend, BackendError};
pub use mix_bus::{MixBus, SharedSource, Source};
pub use recording::{RecordingController, RecordingError};
