// Envelopes - Amplitude (ADSR with optional gate) and linear pitch ramp
//
// Both run per sample on the audio thread and never allocate.

/// ADSR envelope parameters (times in seconds)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrParams {
    /// Attack time (0.001 to 5.0)
    pub attack: f32,
    /// Decay time (0.001 to 5.0)
    pub decay: f32,
    /// Sustain level (0.0 to 1.0)
    pub sustain: f32,
    /// Release time (0.001 to 5.0)
    pub release: f32,
}

impl AdsrParams {
    /// Create ADSR parameters, clamping every field to its range
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.clamp(0.001, 5.0),
            decay: decay.clamp(0.001, 5.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.clamp(0.001, 5.0),
        }
    }
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self::new(0.01, 0.1, 0.7, 0.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Linear ADSR generator
///
/// With a gate set, the envelope releases on its own once the gate length has
/// elapsed since `note_on`, like a fixed-length hit.
#[derive(Debug, Clone)]
pub struct AdsrEnvelope {
    params: AdsrParams,
    stage: EnvelopeStage,
    value: f32,
    sample_rate: f32,
    /// Samples spent in the current stage
    stage_pos: f32,
    /// Value when the release started
    release_from: f32,
    gate_samples: Option<f32>,
    gate_pos: f32,
}

impl AdsrEnvelope {
    pub fn new(params: AdsrParams, sample_rate: f32) -> Self {
        Self {
            params,
            stage: EnvelopeStage::Idle,
            value: 0.0,
            sample_rate,
            stage_pos: 0.0,
            release_from: 0.0,
            gate_samples: None,
            gate_pos: 0.0,
        }
    }

    /// Same envelope with an automatic note-off after `seconds`
    pub fn with_gate(mut self, seconds: f32) -> Self {
        self.gate_samples = Some(seconds.max(0.0) * self.sample_rate);
        self
    }

    pub fn params(&self) -> AdsrParams {
        self.params
    }

    /// Replace the parameters; takes effect from the next sample
    pub fn set_params(&mut self, params: AdsrParams) {
        self.params = params;
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    pub fn current_value(&self) -> f32 {
        self.value
    }

    /// Restart from zero at the attack stage
    pub fn note_on(&mut self) {
        self.stage = EnvelopeStage::Attack;
        self.stage_pos = 0.0;
        self.gate_pos = 0.0;
        self.value = 0.0;
    }

    /// Enter the release stage from the current level
    pub fn note_off(&mut self) {
        if self.stage != EnvelopeStage::Idle && self.stage != EnvelopeStage::Release {
            self.release_from = self.value;
            self.stage = EnvelopeStage::Release;
            self.stage_pos = 0.0;
        }
    }

    /// Drop to silence immediately
    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.value = 0.0;
        self.stage_pos = 0.0;
        self.gate_pos = 0.0;
    }

    /// Advance one sample and return the level (0.0 to 1.0)
    pub fn process(&mut self) -> f32 {
        let gated = matches!(
            self.stage,
            EnvelopeStage::Attack | EnvelopeStage::Decay | EnvelopeStage::Sustain
        );
        if let Some(gate) = self.gate_samples.filter(|_| gated) {
            if self.gate_pos >= gate {
                self.note_off();
            }
            self.gate_pos += 1.0;
        }

        match self.stage {
            EnvelopeStage::Idle => {
                self.value = 0.0;
            }
            EnvelopeStage::Attack => {
                let length = self.params.attack * self.sample_rate;
                self.stage_pos += 1.0;
                self.value = (self.stage_pos / length).min(1.0);
                if self.stage_pos >= length {
                    self.stage = EnvelopeStage::Decay;
                    self.stage_pos = 0.0;
                    self.value = 1.0;
                }
            }
            EnvelopeStage::Decay => {
                let length = self.params.decay * self.sample_rate;
                let sustain = self.params.sustain;
                self.stage_pos += 1.0;
                let progress = (self.stage_pos / length).min(1.0);
                self.value = 1.0 - progress * (1.0 - sustain);
                if self.stage_pos >= length {
                    self.value = sustain;
                    if sustain <= 0.0 {
                        // Percussive shape: nothing left to hold
                        self.reset();
                    } else {
                        self.stage = EnvelopeStage::Sustain;
                        self.stage_pos = 0.0;
                    }
                }
            }
            EnvelopeStage::Sustain => {
                self.value = self.params.sustain;
            }
            EnvelopeStage::Release => {
                let length = self.params.release * self.sample_rate;
                self.stage_pos += 1.0;
                let progress = (self.stage_pos / length).min(1.0);
                self.value = self.release_from * (1.0 - progress);
                if self.stage_pos >= length {
                    self.reset();
                }
            }
        }

        self.value
    }
}

/// Linear ramp from `start` to `end` over a fixed time, then holds `end`
///
/// Used as the kick's pitch sweep.
#[derive(Debug, Clone)]
pub struct LinearRamp {
    start: f32,
    end: f32,
    length: f32,
    pos: f32,
}

impl LinearRamp {
    pub fn new(start: f32, end: f32, seconds: f32, sample_rate: f32) -> Self {
        Self {
            start,
            end,
            length: (seconds * sample_rate).max(1.0),
            pos: 0.0,
        }
    }

    /// Restart the ramp with new end points
    pub fn retrigger(&mut self, start: f32, end: f32, seconds: f32, sample_rate: f32) {
        *self = Self::new(start, end, seconds, sample_rate);
    }

    /// Change the ramp's shape without moving its position
    pub fn reshape(&mut self, start: f32, end: f32, seconds: f32, sample_rate: f32) {
        self.start = start;
        self.end = end;
        self.length = (seconds * sample_rate).max(1.0);
    }

    /// Current value, then advance one sample
    pub fn process(&mut self) -> f32 {
        let progress = (self.pos / self.length).min(1.0);
        if self.pos < self.length {
            self.pos += 1.0;
        }
        self.start + (self.end - self.start) * progress
    }

    pub fn is_finished(&self) -> bool {
        self.pos >= self.length
    }
}
