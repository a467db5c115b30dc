// Pattern - Fixed-length step string for one instrument
// A step is either a hit or a rest, one step per 16th note

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StepState {
    Hit,
    #[default]
    Rest,
}

impl StepState {
    /// Parse one character of the textual form ('X' or 'x' is a hit)
    pub fn from_char(c: char) -> Self {
        if c.eq_ignore_ascii_case(&'x') {
            StepState::Hit
        } else {
            StepState::Rest
        }
    }

    /// Character used when rendering a pattern as text
    pub fn as_char(self) -> char {
        match self {
            StepState::Hit => 'X',
            StepState::Rest => '-',
        }
    }

    pub fn is_hit(self) -> bool {
        matches!(self, StepState::Hit)
    }

    /// Opposite state (pad toggle)
    pub fn toggled(self) -> Self {
        match self {
            StepState::Hit => StepState::Rest,
            StepState::Rest => StepState::Hit,
        }
    }
}

/// A sequence of steps for one instrument
///
/// The textual form is the one used by the pad editor and the command line:
/// `"X---X---X---X---"`. Serialized as that string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Pattern {
    steps: Vec<StepState>,
}

impl Pattern {
    /// Create an empty pattern (all rests) of the given length
    pub fn rests(length: usize) -> Self {
        Self {
            steps: vec![StepState::Rest; length],
        }
    }

    /// Wrap steps as they are, without normalizing the length
    pub fn from_steps(steps: Vec<StepState>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[StepState] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// State at `index`, or `None` past the end
    pub fn get(&self, index: usize) -> Option<StepState> {
        self.steps.get(index).copied()
    }

    /// True if `index` is inside the pattern and holds a hit
    pub fn is_hit(&self, index: usize) -> bool {
        self.get(index).is_some_and(StepState::is_hit)
    }

    /// Indices of all hits, in order
    pub fn hit_indices(&self) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_hit())
            .map(|(i, _)| i)
            .collect()
    }

    /// Set a step; out of range indices are ignored
    pub fn set(&mut self, index: usize, state: StepState) {
        if let Some(step) = self.steps.get_mut(index) {
            *step = state;
        }
    }

    /// Truncate or right-pad with rests to exactly `length` steps
    ///
    /// Truncation drops the tail; it is not recoverable by growing again.
    pub fn resize(&mut self, length: usize) {
        self.steps.resize(length, StepState::Rest);
    }

    /// Copy resized to `length`
    pub fn resized(&self, length: usize) -> Self {
        let mut copy = self.clone();
        copy.resize(length);
        copy
    }
}

impl FromStr for Pattern {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Pattern::from(s))
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Self::from_steps(s.trim().chars().map(StepState::from_char).collect())
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Pattern::from(s.as_str())
    }
}

impl From<Pattern> for String {
    fn from(p: Pattern) -> Self {
        p.to_string()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "{}", step.as_char())?;
        }
        Ok(())
    }
}
