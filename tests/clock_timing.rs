// Integration test: Sequencer clock timing and lifecycle
//
// Drives the clock with recording voices and checks when and how often they
// are triggered. Timing tolerances are loose enough for a loaded CI machine.

use parking_lot::Mutex;
use pulsegrid::sequencer::clock::step_duration;
use pulsegrid::synth::params::{ParamError, ParamResult, ParamSpec, ParamValue};
use pulsegrid::{AudioBackend, Pattern, PatternStore, SequencerClock, Voice, VoiceRegistry, VoiceState};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Voice that records the instant of every trigger
struct ProbeVoice {
    name: &'static str,
    hits: Arc<Mutex<Vec<Instant>>>,
    released: Arc<AtomicBool>,
}

impl ProbeVoice {
    fn new(name: &'static str) -> (Self, Arc<Mutex<Vec<Instant>>>, Arc<AtomicBool>) {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let released = Arc::new(AtomicBool::new(false));
        (
            Self {
                name,
                hits: Arc::clone(&hits),
                released: Arc::clone(&released),
            },
            hits,
            released,
        )
    }
}

impl Voice for ProbeVoice {
    fn name(&self) -> &str {
        self.name
    }

    fn trigger(&self) {
        self.hits.lock().push(Instant::now());
    }

    fn update_parameter(&self, name: &str, _value: ParamValue) -> ParamResult<ParamValue> {
        Err(ParamError::UnknownParameter {
            voice: self.name.to_string(),
            name: name.to_string(),
        })
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    fn state(&self) -> VoiceState {
        VoiceState::Idle
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        &[]
    }

    fn parameter(&self, _name: &str) -> Option<ParamValue> {
        None
    }
}

fn clock_with(store: Arc<PatternStore>, voices: Vec<ProbeVoice>) -> SequencerClock {
    let mut registry = VoiceRegistry::new();
    for voice in voices {
        registry.insert(voice);
    }
    SequencerClock::new(
        store,
        Arc::new(registry),
        AudioBackend::headless(8000, 1.0),
    )
}

#[test]
fn test_four_on_the_floor_at_120_bpm() {
    let store = Arc::new(PatternStore::new());
    store.set_pattern("kick", Pattern::from("X---X---X---X---"));
    let (kick, hits, _) = ProbeVoice::new("kick");
    let clock = clock_with(Arc::clone(&store), vec![kick]);

    let started = Instant::now();
    clock.start().unwrap();
    // One cycle is 2s; stop just before the second cycle's first hit
    thread::sleep(Duration::from_millis(1900));
    clock.stop();

    let hits = hits.lock().clone();
    assert_eq!(hits.len(), 4, "expected one kick per beat");

    let first_offset = hits[0].duration_since(started);
    assert!(first_offset < Duration::from_millis(100), "first hit at {:?}", first_offset);

    for pair in hits.windows(2) {
        let gap = pair[1].duration_since(pair[0]).as_secs_f64();
        assert!((gap - 0.5).abs() < 0.05, "kick spacing was {:.3}s", gap);
    }
}

#[test]
fn test_cycle_restarts_after_longest_pattern() {
    // 16 steps at 480 BPM: 31.25ms per step, 0.5s per cycle
    let store = Arc::new(PatternStore::with_defaults(480, 16).unwrap());
    store.set_pattern("kick", Pattern::from("X"));
    let (kick, hits, _) = ProbeVoice::new("kick");
    let clock = clock_with(Arc::clone(&store), vec![kick]);

    clock.start().unwrap();
    thread::sleep(Duration::from_millis(1250));
    clock.stop();

    let hits = hits.lock().clone();
    assert_eq!(hits.len(), 3, "one hit per 0.5s cycle");
    let gap = hits[1].duration_since(hits[0]).as_secs_f64();
    let cycle = step_duration(480).as_secs_f64() * 16.0;
    assert!((gap - cycle).abs() < 0.05, "cycle was {:.3}s", gap);
}

#[test]
fn test_short_patterns_still_play_a_full_16_step_block() {
    // 8-step store at 600 BPM: 25ms per step, 0.4s per block
    let store = Arc::new(PatternStore::with_defaults(600, 8).unwrap());
    store.set_pattern("kick", Pattern::from("X-------"));
    let (kick, hits, _) = ProbeVoice::new("kick");
    let clock = clock_with(Arc::clone(&store), vec![kick]);

    let steps = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&steps);
    clock.set_on_step(move |step| seen.lock().push(step));

    clock.start().unwrap();
    thread::sleep(Duration::from_millis(600));
    clock.stop();

    let steps = steps.lock().clone();
    for expected in 8..16 {
        assert!(steps.contains(&expected), "step {} never published: {:?}", expected, steps);
    }
    assert!(steps.iter().all(|&s| s < 16));

    // Steps 8..15 rest: one kick per 16-step block
    let hits = hits.lock().clone();
    assert_eq!(hits.len(), 2);
    let gap = hits[1].duration_since(hits[0]).as_secs_f64();
    assert!((gap - 0.4).abs() < 0.05, "block was {:.3}s", gap);
}

#[test]
fn test_stop_interrupts_long_step_promptly() {
    // 1 BPM: each step sleeps 15 seconds
    let store = Arc::new(PatternStore::with_defaults(1, 16).unwrap());
    let clock = clock_with(store, vec![]);

    clock.start().unwrap();
    thread::sleep(Duration::from_millis(50));

    let stop_started = Instant::now();
    clock.stop();
    let took = stop_started.elapsed();

    assert!(!clock.is_running());
    assert!(took < Duration::from_millis(500), "stop took {:?}", took);
}

#[test]
fn test_second_start_does_not_spawn_another_loop() {
    let store = Arc::new(PatternStore::with_defaults(600, 16).unwrap());
    let clock = clock_with(store, vec![]);

    let steps = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&steps);
    clock.set_on_step(move |step| seen.lock().push(step));

    clock.start().unwrap();
    clock.start().unwrap();
    thread::sleep(Duration::from_millis(300));
    clock.start().unwrap();
    thread::sleep(Duration::from_millis(100));
    clock.stop();

    // A single loop publishes 0, 1, 2, ... with no repeats
    let steps = steps.lock().clone();
    assert!(steps.len() > 5);
    for (i, step) in steps.iter().enumerate() {
        assert_eq!(*step, i % 16, "step stream diverged: {:?}", steps);
    }
}

#[test]
fn test_callback_panic_is_contained() {
    let store = Arc::new(PatternStore::with_defaults(600, 16).unwrap());
    store.set_pattern("hihat", Pattern::from("XXXXXXXXXXXXXXXX"));
    let (hihat, hits, _) = ProbeVoice::new("hihat");
    let clock = clock_with(store, vec![hihat]);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    clock.set_on_step(move |step| {
        counter.fetch_add(1, Ordering::SeqCst);
        if step == 0 {
            panic!("playhead widget exploded");
        }
    });

    clock.start().unwrap();
    thread::sleep(Duration::from_millis(200));
    assert!(clock.is_running());
    clock.stop();

    // Steps after the panic still fired
    assert!(calls.load(Ordering::SeqCst) > 4);
    assert!(hits.lock().len() > 4);
}

#[test]
fn test_stop_from_step_callback_does_not_deadlock() {
    let store = Arc::new(PatternStore::with_defaults(600, 16).unwrap());
    store.set_pattern("kick", Pattern::from("XXXXXXXXXXXXXXXX"));
    let (kick, hits, _) = ProbeVoice::new("kick");
    let clock = Arc::new(clock_with(store, vec![kick]));

    let weak = Arc::downgrade(&clock);
    clock.set_on_step(move |step| {
        if step != 2 {
            return;
        }
        if let Some(clock) = weak.upgrade() {
            clock.stop();
        }
    });

    clock.start().unwrap();
    thread::sleep(Duration::from_millis(300));

    assert!(!clock.is_running());
    assert_eq!(clock.current_step(), 2);
    // Steps 0 and 1 triggered; step 2 stopped before its hits
    assert_eq!(hits.lock().len(), 2);
}

#[test]
fn test_tempo_change_applies_at_next_block() {
    let store = Arc::new(PatternStore::new());
    store.set_bpm(960).unwrap();
    store.set_pattern("kick", Pattern::from("X---X---X---X---"));
    let (kick, hits, _) = ProbeVoice::new("kick");
    let clock = clock_with(Arc::clone(&store), vec![kick]);

    clock.start().unwrap();
    thread::sleep(Duration::from_millis(200));
    // 960 BPM: a kick every 62.5ms, block ends at 250ms.
    // 120 BPM: the next kick after the block's first is 0.5s later
    store.set_bpm(120).unwrap();
    thread::sleep(Duration::from_millis(100));
    let before = hits.lock().len();
    thread::sleep(Duration::from_millis(300));
    let after = hits.lock().len();
    clock.stop();

    assert!(before >= 3);
    assert!(after - before <= 1, "tempo change not applied: {} -> {}", before, after);
}

#[test]
fn test_unknown_instruments_are_skipped() {
    let store = Arc::new(PatternStore::with_defaults(600, 16).unwrap());
    store.set_pattern("cowbell", Pattern::from("XXXXXXXXXXXXXXXX"));
    store.set_pattern("kick", Pattern::from("X---"));
    let (kick, hits, _) = ProbeVoice::new("kick");
    let clock = clock_with(store, vec![kick]);

    clock.start().unwrap();
    thread::sleep(Duration::from_millis(250));
    assert!(clock.is_running());
    clock.stop();

    assert!(!hits.lock().is_empty());
}

#[test]
fn test_shutdown_releases_voices_and_is_repeatable() {
    let store = Arc::new(PatternStore::new());
    store.set_pattern("kick", Pattern::from("X"));
    let (kick, _, released) = ProbeVoice::new("kick");
    let clock = clock_with(store, vec![kick]);

    clock.start().unwrap();
    thread::sleep(Duration::from_millis(20));
    clock.shutdown();
    assert!(!clock.is_running());
    assert!(released.load(Ordering::SeqCst));

    clock.shutdown();
    clock.stop();
    assert!(!clock.is_running());
}
