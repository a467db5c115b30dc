// Tonal voices - Kick and bass synthesized from oscillators
//
// Each voice owns an `Arc<Mutex<..>>` render node that is routed to the mix
// bus. The bus holds it weakly, so the voice (kept by the registry) is what
// keeps it audible. Parameter updates and triggers take the node lock, the
// same one the audio thread takes to render.

use super::envelope::{AdsrEnvelope, AdsrParams, LinearRamp};
use super::oscillator::{Oscillator, SimpleOscillator, WaveformType};
use super::params::{ParamError, ParamResult, ParamSpec, ParamValue, find_spec};
use super::voice::{Voice, VoiceState};
use crate::audio::dsp_utils::OnePoleSmoother;
use crate::audio::mix_bus::{MixBus, SharedSource, Source};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Release time used when a tonal hit ends on its own
const TAIL_RELEASE: f32 = 0.05;

pub const KICK_PARAMS: &[ParamSpec] = &[
    ParamSpec::range("base_freq", 20.0, 200.0, 50.0),
    ParamSpec::range("decay", 0.05, 1.0, 0.3),
    ParamSpec::range("volume", 0.0, 5.0, 1.5),
];

pub const BASS_PARAMS: &[ParamSpec] = &[
    ParamSpec::range("freq", 30.0, 120.0, 60.0),
    ParamSpec::choice("wave", WaveformType::NAMES, "saw"),
    ParamSpec::range("decay", 0.05, 1.0, 0.2),
    ParamSpec::range("volume", 0.0, 5.0, 1.0),
];

/// Bass note length before the envelope releases by itself
const BASS_GATE: f32 = 0.5;
/// Bass frequency glide time
const BASS_GLIDE_MS: f32 = 50.0;
/// Level of the second harmonic mixed into the sine bass
const BASS_SINE_HARMONIC: f32 = 0.5;

fn unknown(voice: &str, name: &str) -> ParamError {
    ParamError::UnknownParameter {
        voice: voice.to_string(),
        name: name.to_string(),
    }
}

fn coerce(voice: &str, specs: &[ParamSpec], name: &str, value: &ParamValue) -> ParamResult<ParamValue> {
    find_spec(specs, name)
        .ok_or_else(|| unknown(voice, name))?
        .coerce(value)
}

// ---------------------------------------------------------------------------
// Kick
// ---------------------------------------------------------------------------

struct KickNode {
    sample_rate: f32,
    osc: SimpleOscillator,
    pitch: LinearRamp,
    env: AdsrEnvelope,
    base_freq: f32,
    decay: f32,
    volume: f32,
}

impl KickNode {
    fn new(sample_rate: f32) -> Self {
        let base_freq = 50.0;
        let decay = 0.3;
        Self {
            sample_rate,
            osc: SimpleOscillator::new(WaveformType::Sine, sample_rate),
            pitch: LinearRamp::new(base_freq * 2.0, base_freq, decay, sample_rate),
            env: AdsrEnvelope::new(AdsrParams::new(0.001, decay, 0.0, TAIL_RELEASE), sample_rate),
            base_freq,
            decay,
            volume: 1.5,
        }
    }

    fn trigger(&mut self) {
        // Both envelopes restart from t = 0
        self.pitch
            .retrigger(self.base_freq * 2.0, self.base_freq, self.decay, self.sample_rate);
        self.env
            .set_params(AdsrParams::new(0.001, self.decay, 0.0, TAIL_RELEASE));
        self.env.note_on();
        self.osc.reset();
    }

    /// Push `base_freq` and `decay` into a hit that is still sounding
    fn reshape(&mut self) {
        self.pitch
            .reshape(self.base_freq * 2.0, self.base_freq, self.decay, self.sample_rate);
        self.env
            .set_params(AdsrParams::new(0.001, self.decay, 0.0, TAIL_RELEASE));
    }
}

impl Source for KickNode {
    fn render(&mut self, out: &mut [f32]) {
        if !self.env.is_active() {
            return;
        }
        for sample in out.iter_mut() {
            self.osc.set_frequency(self.pitch.process());
            let amp = self.env.process();
            *sample += self.osc.next_sample() * amp * self.volume;
        }
    }
}

/// Sine kick with a downward pitch sweep
pub struct KickVoice {
    name: String,
    node: Arc<Mutex<KickNode>>,
}

impl KickVoice {
    /// Create the voice and route it to `bus`
    pub fn new(name: impl Into<String>, bus: &MixBus) -> Self {
        let node = Arc::new(Mutex::new(KickNode::new(bus.sample_rate() as f32)));
        let source: SharedSource = node.clone();
        bus.route(&source);
        Self {
            name: name.into(),
            node,
        }
    }
}

impl Voice for KickVoice {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger(&self) {
        self.node.lock().trigger();
        debug!("{} triggered", self.name);
    }

    fn update_parameter(&self, name: &str, value: ParamValue) -> ParamResult<ParamValue> {
        let stored = coerce(&self.name, KICK_PARAMS, name, &value)?;
        let number = stored.as_number().unwrap_or_default();
        let mut node = self.node.lock();
        match name {
            "base_freq" => node.base_freq = number,
            "decay" => node.decay = number,
            "volume" => node.volume = number,
            _ => return Err(unknown(&self.name, name)),
        }
        node.reshape();
        Ok(stored)
    }

    fn release(&self) {
        self.node.lock().env.reset();
    }

    fn state(&self) -> VoiceState {
        if self.node.lock().env.is_active() {
            VoiceState::Sounding
        } else {
            VoiceState::Idle
        }
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        KICK_PARAMS
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        let node = self.node.lock();
        let value = match name {
            "base_freq" => node.base_freq,
            "decay" => node.decay,
            "volume" => node.volume,
            _ => return None,
        };
        Some(ParamValue::Number(value))
    }
}

// ---------------------------------------------------------------------------
// Bass
// ---------------------------------------------------------------------------

struct BassNode {
    osc: SimpleOscillator,
    env: AdsrEnvelope,
    freq_smoother: OnePoleSmoother,
    freq: f32,
    decay: f32,
    volume: f32,
}

impl BassNode {
    fn new(sample_rate: f32) -> Self {
        let freq = 60.0;
        let decay = 0.2;
        Self {
            osc: SimpleOscillator::new(WaveformType::Saw, sample_rate)
                .with_sine_harmonic(BASS_SINE_HARMONIC),
            env: AdsrEnvelope::new(AdsrParams::new(0.01, decay, 0.3, TAIL_RELEASE), sample_rate)
                .with_gate(BASS_GATE),
            freq_smoother: OnePoleSmoother::new(freq, BASS_GLIDE_MS, sample_rate),
            freq,
            decay,
            volume: 1.0,
        }
    }

    fn trigger(&mut self) {
        self.env
            .set_params(AdsrParams::new(0.01, self.decay, 0.3, TAIL_RELEASE));
        self.env.note_on();
    }
}

impl Source for BassNode {
    fn render(&mut self, out: &mut [f32]) {
        if !self.env.is_active() {
            // Keep the glide settled so the next note starts on pitch
            self.freq_smoother.reset(self.freq);
            return;
        }
        for sample in out.iter_mut() {
            let freq = self.freq_smoother.process(self.freq);
            self.osc.set_frequency(freq);
            let amp = self.env.process();
            *sample += self.osc.next_sample() * amp * self.volume;
        }
    }
}

/// Single-oscillator bass with frequency glide
pub struct BassVoice {
    name: String,
    node: Arc<Mutex<BassNode>>,
}

impl BassVoice {
    /// Create the voice and route it to `bus`
    pub fn new(name: impl Into<String>, bus: &MixBus) -> Self {
        let node = Arc::new(Mutex::new(BassNode::new(bus.sample_rate() as f32)));
        let source: SharedSource = node.clone();
        bus.route(&source);
        Self {
            name: name.into(),
            node,
        }
    }
}

impl Voice for BassVoice {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger(&self) {
        self.node.lock().trigger();
        debug!("{} triggered", self.name);
    }

    fn update_parameter(&self, name: &str, value: ParamValue) -> ParamResult<ParamValue> {
        let stored = coerce(&self.name, BASS_PARAMS, name, &value)?;
        let mut node = self.node.lock();
        match (name, &stored) {
            ("freq", ParamValue::Number(v)) => node.freq = *v,
            ("decay", ParamValue::Number(v)) => node.decay = *v,
            ("volume", ParamValue::Number(v)) => node.volume = *v,
            ("wave", ParamValue::Choice(c)) => {
                let wave = c
                    .parse::<WaveformType>()
                    .map_err(|_| ParamError::InvalidChoice {
                        name: name.to_string(),
                        value: c.clone(),
                        options: WaveformType::NAMES.join(", "),
                    })?;
                node.osc.set_waveform(wave);
            }
            _ => return Err(unknown(&self.name, name)),
        }
        Ok(stored)
    }

    fn release(&self) {
        self.node.lock().env.reset();
    }

    fn state(&self) -> VoiceState {
        if self.node.lock().env.is_active() {
            VoiceState::Sounding
        } else {
            VoiceState::Idle
        }
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        BASS_PARAMS
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        let node = self.node.lock();
        match name {
            "freq" => Some(ParamValue::Number(node.freq)),
            "decay" => Some(ParamValue::Number(node.decay)),
            "volume" => Some(ParamValue::Number(node.volume)),
            "wave" => Some(ParamValue::from(node.osc.waveform().as_str())),
            _ => None,
        }
    }
}
