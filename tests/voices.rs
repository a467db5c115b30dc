// Integration test: Voices, the transient pool and the registry
//
// Uses the headless back-end and renders the bus by hand, so everything here
// is deterministic.

use hound::{SampleFormat, WavSpec, WavWriter};
use pulsegrid::sampler::pool::TransientVoicePool;
use pulsegrid::sampler::{SampleBuffer, SampleVoice};
use pulsegrid::synth::params::ParamError;
use pulsegrid::{AudioBackend, ParamValue, SessionConfig, Voice, VoiceRegistry, VoiceState};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

const RATE: u32 = 8000;

fn write_click(path: &Path, frames: usize) {
    let spec = WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        let value = if i % 2 == 0 { 8000i16 } else { -8000 };
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
}

fn render(backend: &AudioBackend, frames: usize) -> Vec<f32> {
    let mut block = vec![0.0f32; frames];
    backend.bus().render(&mut block);
    block
}

#[test]
fn test_rapid_triggers_overlap_instead_of_cutting() {
    let backend = AudioBackend::headless(RATE, 1.0);
    // Two seconds of sample
    let buffer = Arc::new(SampleBuffer::new("clap", vec![0.1; 2 * RATE as usize], RATE));
    let pool = TransientVoicePool::with_defaults(Arc::clone(backend.bus()));
    let clap = SampleVoice::new("clap", Some(buffer), pool, RATE);

    let k = 5;
    for _ in 0..k {
        clap.trigger();
    }
    assert_eq!(clap.pool().len(), k);
    assert_eq!(backend.bus().active_sources(), k);

    // All five playbacks sound together
    let block = render(&backend, 64);
    let single = 0.1f32;
    assert!(block[10] > single * 2.0);
}

#[test]
fn test_capacity_overflow_evicts_oldest_playback() {
    let backend = AudioBackend::headless(RATE, 1.0);
    let buffer = Arc::new(SampleBuffer::new("hihat", vec![0.1; 4 * RATE as usize], RATE));
    let pool = TransientVoicePool::new(Arc::clone(backend.bus()), 3, Duration::from_millis(100));
    let hihat = SampleVoice::new("hihat", Some(buffer), pool, RATE);

    for _ in 0..3 {
        hihat.trigger();
    }
    let first_ids = hihat.pool().ids();

    hihat.trigger();
    let ids = hihat.pool().ids();
    assert_eq!(ids.len(), 3);
    assert!(!ids.contains(&first_ids[0]), "oldest playback should be gone");
    assert_eq!(ids[..2], first_ids[1..]);
    assert_eq!(backend.bus().active_sources(), 3);
}

#[test]
fn test_playback_survives_until_expected_duration_plus_guard() {
    let backend = AudioBackend::headless(RATE, 1.0);
    let buffer = Arc::new(SampleBuffer::new("snare", vec![0.1; RATE as usize], RATE));
    let pool = TransientVoicePool::with_defaults(Arc::clone(backend.bus()));
    let snare = SampleVoice::new("snare", Some(buffer), pool, RATE);

    snare.trigger();
    let triggered = Instant::now();

    // Nothing is reclaimed before one second plus the 100ms guard band
    assert_eq!(snare.pool().reap_expired(triggered), 0);
    assert_eq!(snare.pool().reap_expired(triggered + Duration::from_millis(900)), 0);
    assert_eq!(snare.pool().len(), 1);

    assert_eq!(
        snare
            .pool()
            .reap_expired(triggered + Duration::from_millis(1200)),
        1
    );
    assert_eq!(snare.state(), VoiceState::Idle);
    assert!(render(&backend, 32).iter().all(|&s| s == 0.0));
}

#[test]
fn test_default_kit_loads_samples_from_disk() {
    let dir = tempdir().unwrap();
    for name in ["snare", "clap"] {
        write_click(&dir.path().join(format!("{}.wav", name)), 400);
    }
    // hihat.wav deliberately missing

    let backend = AudioBackend::headless(RATE, 1.0);
    let config = SessionConfig {
        sample_dir: dir.path().to_path_buf(),
        ..SessionConfig::default()
    };
    let registry = VoiceRegistry::with_default_kit(&backend, &config);

    assert!(registry.trigger("snare"));
    assert!(registry.trigger("hihat"));
    assert!(registry.get("snare").unwrap().is_sounding());
    assert!(!registry.get("hihat").unwrap().is_sounding());

    let block = render(&backend, 256);
    assert!(block.iter().any(|&s| s.abs() > 0.05));
}

#[test]
fn test_kick_retrigger_restarts_envelope() {
    let backend = AudioBackend::headless(RATE, 1.0);
    let registry = VoiceRegistry::with_default_kit(&backend, &SessionConfig::default());
    let kick = registry.get("kick").unwrap();

    kick.trigger();
    let first = render(&backend, 200);

    // Halfway through its decay the kick is retriggered from t = 0
    kick.trigger();
    let second = render(&backend, 200);

    for (a, b) in first.iter().zip(second.iter()) {
        assert!((a - b).abs() < 1e-4);
    }
}

#[test]
fn test_parameter_updates_clamp_and_never_fail_hard() {
    let backend = AudioBackend::headless(RATE, 1.0);
    let registry = VoiceRegistry::with_default_kit(&backend, &SessionConfig::default());

    let cases = [
        ("kick", "base_freq", 5.0, 20.0),
        ("kick", "base_freq", 500.0, 200.0),
        ("bass", "freq", 10.0, 30.0),
        ("bass", "decay", 2.0, 1.0),
        ("snare", "volume", 9.0, 5.0),
        ("hihat", "volume", -3.0, 0.0),
    ];
    for (instrument, name, input, stored) in cases {
        assert_eq!(
            registry.update_parameter(instrument, name, ParamValue::Number(input)),
            Ok(ParamValue::Number(stored)),
            "{}.{}",
            instrument,
            name
        );
        assert_eq!(
            registry.parameter(instrument, name),
            Some(ParamValue::Number(stored))
        );
    }

    assert!(matches!(
        registry.update_parameter("bass", "resonance", ParamValue::Number(1.0)),
        Err(ParamError::UnknownParameter { .. })
    ));
    assert!(matches!(
        registry.update_parameter("kick", "volume", ParamValue::from("loud")),
        Err(ParamError::WrongKind { .. })
    ));
}

#[test]
fn test_release_all_silences_everything() {
    let backend = AudioBackend::headless(RATE, 1.0);
    let registry = VoiceRegistry::with_default_kit(&backend, &SessionConfig::default());
    registry.trigger("kick");
    registry.trigger("bass");
    render(&backend, 64);

    registry.release_all();
    for name in registry.names() {
        assert_eq!(registry.get(name).unwrap().state(), VoiceState::Idle, "{}", name);
    }
    assert!(render(&backend, 64).iter().all(|&s| s == 0.0));
}
