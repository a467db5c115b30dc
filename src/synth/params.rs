// Voice parameters - Declared domains, values and validation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A parameter value: a number, or one option of a small enum (waveform)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f32),
    Choice(String),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f32> {
        match self {
            ParamValue::Number(v) => Some(*v),
            ParamValue::Choice(_) => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ParamValue::Number(_) => "number",
            ParamValue::Choice(_) => "choice",
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Number(v)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Choice(s.to_string())
    }
}

/// Parse command-line style input: numbers first, anything else is a choice
impl FromStr for ParamValue {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<f32>() {
            Ok(v) => ParamValue::Number(v),
            Err(_) => ParamValue::Choice(s.to_ascii_lowercase()),
        })
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(v) => write!(f, "{}", v),
            ParamValue::Choice(c) => f.write_str(c),
        }
    }
}

/// Valid values of a parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamDomain {
    Range { min: f32, max: f32, default: f32 },
    Choice {
        options: &'static [&'static str],
        default: &'static str,
    },
}

/// Declared parameter of a voice
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub domain: ParamDomain,
}

impl ParamSpec {
    pub const fn range(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            domain: ParamDomain::Range { min, max, default },
        }
    }

    pub const fn choice(
        name: &'static str,
        options: &'static [&'static str],
        default: &'static str,
    ) -> Self {
        Self {
            name,
            domain: ParamDomain::Choice { options, default },
        }
    }

    pub fn default_value(&self) -> ParamValue {
        match &self.domain {
            ParamDomain::Range { default, .. } => ParamValue::Number(*default),
            ParamDomain::Choice { default, .. } => ParamValue::Choice(default.to_string()),
        }
    }

    /// Validate `value` against the domain
    ///
    /// Numbers are clamped into range. Choices must match an option
    /// (case-insensitive) and come back in their canonical spelling.
    pub fn coerce(&self, value: &ParamValue) -> Result<ParamValue, ParamError> {
        match (&self.domain, value) {
            (ParamDomain::Range { min, max, .. }, ParamValue::Number(v)) => {
                if v.is_nan() {
                    return Err(ParamError::NotANumber {
                        name: self.name.to_string(),
                    });
                }
                Ok(ParamValue::Number(v.clamp(*min, *max)))
            }
            (ParamDomain::Choice { options, .. }, ParamValue::Choice(c)) => options
                .iter()
                .find(|option| option.eq_ignore_ascii_case(c.trim()))
                .map(|option| ParamValue::Choice(option.to_string()))
                .ok_or_else(|| ParamError::InvalidChoice {
                    name: self.name.to_string(),
                    value: c.clone(),
                    options: options.join(", "),
                }),
            (_, other) => Err(ParamError::WrongKind {
                name: self.name.to_string(),
                got: other.kind(),
            }),
        }
    }
}

/// Find a spec by name in a voice's declared list
pub fn find_spec<'a>(specs: &'a [ParamSpec], name: &str) -> Option<&'a ParamSpec> {
    specs.iter().find(|spec| spec.name == name)
}

/// Parameter update errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Unknown parameter '{name}' for {voice}")]
    UnknownParameter { voice: String, name: String },

    #[error("Parameter '{name}' does not accept a {got} value")]
    WrongKind { name: String, got: &'static str },

    #[error("Parameter '{name}' has no option '{value}' (expected one of: {options})")]
    InvalidChoice {
        name: String,
        value: String,
        options: String,
    },

    #[error("Parameter '{name}' must be a number")]
    NotANumber { name: String },
}

pub type ParamResult<T> = Result<T, ParamError>;

#[cfg(test)]
mod tests {
    use super::*;

    const FREQ: ParamSpec = ParamSpec::range("freq", 30.0, 120.0, 60.0);
    const WAVE: ParamSpec = ParamSpec::choice("wave", &["saw", "square", "sine"], "saw");

    #[test]
    fn test_range_clamps() {
        assert_eq!(FREQ.coerce(&ParamValue::Number(1000.0)), Ok(ParamValue::Number(120.0)));
        assert_eq!(FREQ.coerce(&ParamValue::Number(-5.0)), Ok(ParamValue::Number(30.0)));
        assert_eq!(FREQ.coerce(&ParamValue::Number(45.0)), Ok(ParamValue::Number(45.0)));
    }

    #[test]
    fn test_nan_is_rejected() {
        assert!(matches!(
            FREQ.coerce(&f32::NAN.into()),
            Err(ParamError::NotANumber { .. })
        ));
    }

    #[test]
    fn test_choice_is_canonicalized() {
        assert_eq!(WAVE.coerce(&"Square".into()), Ok(ParamValue::from("square")));
        assert!(matches!(
            WAVE.coerce(&"noise".into()),
            Err(ParamError::InvalidChoice { .. })
        ));
    }

    #[test]
    fn test_wrong_kind() {
        assert!(matches!(WAVE.coerce(&ParamValue::Number(3.0)), Err(ParamError::WrongKind { .. })));
        assert!(matches!(FREQ.coerce(&"high".into()), Err(ParamError::WrongKind { .. })));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!("80".parse::<ParamValue>(), Ok(ParamValue::Number(80.0)));
        assert_eq!(" SINE ".parse::<ParamValue>(), Ok(ParamValue::from("sine")));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(FREQ.default_value(), ParamValue::Number(60.0));
        assert_eq!(WAVE.default_value(), ParamValue::from("saw"));
        assert!(find_spec(&[FREQ, WAVE], "wave").is_some());
        assert!(find_spec(&[FREQ, WAVE], "cutoff").is_none());
    }
}
