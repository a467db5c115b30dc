// Pattern Store - Shared tempo, step count and per-instrument patterns
//
// Written by editor threads, read by the sequencer clock every block.
// Patterns are kept behind an `Arc` and replaced copy-on-write, so a reader
// holding a snapshot never sees a half-applied mutation.

use super::pattern::{Pattern, StepState};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_BPM: u32 = 120;
pub const DEFAULT_STEP_COUNT: usize = 16;

/// Immutable view of all patterns, keyed by instrument name
pub type PatternMap = BTreeMap<String, Pattern>;

/// Configuration errors rejected at the store boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("BPM must be positive, got {0}")]
    InvalidBpm(u32),

    #[error("Step count must be positive, got {0}")]
    InvalidStepCount(usize),
}

pub type PatternResult<T> = Result<T, PatternError>;

/// Serializable copy of the store, for export consumers
///
/// Field names follow the preset layout: `{ bpm, steps, instruments }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSnapshot {
    pub bpm: u32,
    pub steps: usize,
    pub instruments: PatternMap,
}

#[derive(Debug)]
struct StoreState {
    bpm: u32,
    step_count: usize,
    patterns: Arc<PatternMap>,
}

/// Thread-safe pattern store
#[derive(Debug)]
pub struct PatternStore {
    state: RwLock<StoreState>,
}

impl PatternStore {
    /// Create a store with the default tempo (120 BPM) and 16 steps
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                bpm: DEFAULT_BPM,
                step_count: DEFAULT_STEP_COUNT,
                patterns: Arc::new(PatternMap::new()),
            }),
        }
    }

    /// Create a store with explicit defaults
    pub fn with_defaults(bpm: u32, step_count: usize) -> PatternResult<Self> {
        validate_bpm(bpm)?;
        validate_step_count(step_count)?;
        Ok(Self {
            state: RwLock::new(StoreState {
                bpm,
                step_count,
                patterns: Arc::new(PatternMap::new()),
            }),
        })
    }

    pub fn bpm(&self) -> u32 {
        self.state.read().bpm
    }

    pub fn step_count(&self) -> usize {
        self.state.read().step_count
    }

    /// Snapshot of all patterns
    ///
    /// Cheap: clones an `Arc`. Later mutations never affect the returned map.
    pub fn patterns(&self) -> Arc<PatternMap> {
        Arc::clone(&self.state.read().patterns)
    }

    /// Pattern of one instrument, if present
    pub fn pattern(&self, instrument: &str) -> Option<Pattern> {
        self.state.read().patterns.get(instrument).cloned()
    }

    /// Set tempo; the clock picks it up at its next block boundary
    pub fn set_bpm(&self, bpm: u32) -> PatternResult<()> {
        validate_bpm(bpm)?;
        self.state.write().bpm = bpm;
        Ok(())
    }

    /// Change the step count and normalize every stored pattern to it
    pub fn set_step_count(&self, step_count: usize) -> PatternResult<()> {
        validate_step_count(step_count)?;

        let mut state = self.state.write();
        state.step_count = step_count;
        let patterns = Arc::make_mut(&mut state.patterns);
        for pattern in patterns.values_mut() {
            pattern.resize(step_count);
        }
        Ok(())
    }

    /// Store a copy of `pattern` normalized to the current step count
    ///
    /// Unknown instruments are created on demand.
    pub fn set_pattern(&self, instrument: impl Into<String>, pattern: Pattern) {
        let mut state = self.state.write();
        let normalized = pattern.resized(state.step_count);
        Arc::make_mut(&mut state.patterns).insert(instrument.into(), normalized);
    }

    /// Flip one step (pad click); creates an all-rest pattern first if needed
    ///
    /// Returns the new state of the step, or `None` if `index` is out of range.
    pub fn toggle_step(&self, instrument: &str, index: usize) -> Option<StepState> {
        let mut state = self.state.write();
        if index >= state.step_count {
            return None;
        }
        let step_count = state.step_count;
        let patterns = Arc::make_mut(&mut state.patterns);
        let pattern = patterns
            .entry(instrument.to_string())
            .or_insert_with(|| Pattern::rests(step_count));
        let new_state = pattern.get(index).unwrap_or_default().toggled();
        pattern.set(index, new_state);
        Some(new_state)
    }

    /// Replace an instrument's pattern with rests
    pub fn clear_pattern(&self, instrument: &str) {
        let mut state = self.state.write();
        let step_count = state.step_count;
        Arc::make_mut(&mut state.patterns).insert(instrument.to_string(), Pattern::rests(step_count));
    }

    /// Remove an instrument's pattern entirely
    pub fn remove_pattern(&self, instrument: &str) -> Option<Pattern> {
        let mut state = self.state.write();
        if !state.patterns.contains_key(instrument) {
            return None;
        }
        Arc::make_mut(&mut state.patterns).remove(instrument)
    }

    /// Consistent copy of tempo, step count and patterns
    pub fn snapshot(&self) -> PatternSnapshot {
        let state = self.state.read();
        PatternSnapshot {
            bpm: state.bpm,
            steps: state.step_count,
            instruments: (*state.patterns).clone(),
        }
    }

    /// Replace the whole store content from a snapshot
    ///
    /// Validated before anything changes; patterns are normalized to
    /// `snapshot.steps`.
    pub fn load_snapshot(&self, snapshot: PatternSnapshot) -> PatternResult<()> {
        validate_bpm(snapshot.bpm)?;
        validate_step_count(snapshot.steps)?;

        let patterns: PatternMap = snapshot
            .instruments
            .into_iter()
            .map(|(name, pattern)| (name, pattern.resized(snapshot.steps)))
            .collect();

        let mut state = self.state.write();
        state.bpm = snapshot.bpm;
        state.step_count = snapshot.steps;
        state.patterns = Arc::new(patterns);
        Ok(())
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_bpm(bpm: u32) -> PatternResult<()> {
    if bpm == 0 {
        return Err(PatternError::InvalidBpm(bpm));
    }
    Ok(())
}

fn validate_step_count(step_count: usize) -> PatternResult<()> {
    if step_count == 0 {
        return Err(PatternError::InvalidStepCount(step_count));
    }
    Ok(())
}
