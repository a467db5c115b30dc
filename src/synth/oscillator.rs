// Oscillators - Naive waveform generators for the tonal voices

use std::f32::consts::TAU;
use std::fmt;
use std::str::FromStr;

pub trait Oscillator {
    fn next_sample(&mut self) -> f32;
    fn set_frequency(&mut self, freq: f32);
    fn reset(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WaveformType {
    Sine,
    Square,
    #[default]
    Saw,
}

impl WaveformType {
    /// Names accepted by the `wave` parameter
    pub const NAMES: &'static [&'static str] = &["saw", "square", "sine"];

    pub fn as_str(self) -> &'static str {
        match self {
            WaveformType::Sine => "sine",
            WaveformType::Square => "square",
            WaveformType::Saw => "saw",
        }
    }
}

impl FromStr for WaveformType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sine" => Ok(WaveformType::Sine),
            "square" => Ok(WaveformType::Square),
            "saw" | "sawtooth" => Ok(WaveformType::Saw),
            other => Err(format!("unknown waveform '{}'", other)),
        }
    }
}

impl fmt::Display for WaveformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase accumulator oscillator
///
/// `harmonic_level` adds the second harmonic on top of the sine (the bass
/// uses 0.5 to thicken it); the other shapes ignore it.
#[derive(Debug, Clone)]
pub struct SimpleOscillator {
    waveform: WaveformType,
    phase: f32,
    phase_increment: f32,
    sample_rate: f32,
    harmonic_level: f32,
}

impl SimpleOscillator {
    pub fn new(waveform: WaveformType, sample_rate: f32) -> Self {
        Self {
            waveform,
            phase: 0.0,
            phase_increment: 0.0,
            sample_rate,
            harmonic_level: 0.0,
        }
    }

    pub fn with_sine_harmonic(mut self, level: f32) -> Self {
        self.harmonic_level = level;
        self
    }

    pub fn waveform(&self) -> WaveformType {
        self.waveform
    }

    /// Switch shape without resetting the phase
    pub fn set_waveform(&mut self, waveform: WaveformType) {
        self.waveform = waveform;
    }
}

impl Oscillator for SimpleOscillator {
    fn next_sample(&mut self) -> f32 {
        let sample = match self.waveform {
            WaveformType::Sine => {
                let fundamental = (self.phase * TAU).sin();
                if self.harmonic_level > 0.0 {
                    (fundamental + self.harmonic_level * (self.phase * 2.0 * TAU).sin())
                        / (1.0 + self.harmonic_level)
                } else {
                    fundamental
                }
            }
            WaveformType::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            WaveformType::Saw => self.phase * 2.0 - 1.0,
        };

        self.phase += self.phase_increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        sample
    }

    fn set_frequency(&mut self, freq: f32) {
        self.phase_increment = (freq / self.sample_rate).clamp(0.0, 0.5);
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}
