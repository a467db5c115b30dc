// Sequencer module - Step patterns, the shared store and the timing loop

pub mod clock;
pub mod pattern;
pub mod store;

pub use clock::{ClockError, ClockState, SequencerClock};
pub use pattern::{Pattern, StepState};
pub use store::{PatternError, PatternSnapshot, PatternStore};
