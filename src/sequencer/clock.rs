// Sequencer clock - Fixed-tempo step loop on a dedicated thread
//
// Per block (one pass over the steps) the loop re-reads the tempo and takes a
// pattern snapshot. Per step it publishes the playhead, notifies the step
// callback, triggers every hit through the voice registry, then sleeps for
// what is left of the step. The sleep is a channel wait, so `stop()` wakes it
// immediately. Drift is corrected within a step only: a step that overruns is
// not paid back by the next one.
//
// States: Stopped -> Running -> Stopped. Starting a running clock is a no-op.

use super::store::{DEFAULT_STEP_COUNT, PatternMap, PatternStore};
use crate::audio::backend::AudioBackend;
use crate::synth::voice_registry::VoiceRegistry;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("Failed to spawn clock thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type ClockResult<T> = Result<T, ClockError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Running,
}

/// Playhead callback, run on the clock thread with the step index
pub type StepCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Length of one 16th-note step
pub fn step_duration(bpm: u32) -> Duration {
    Duration::from_secs_f64(60.0 / bpm.max(1) as f64 / 4.0)
}

/// Steps in one block: the longest pattern, never fewer than 16
///
/// Shorter patterns rest for the remainder of the block.
pub fn cycle_length(patterns: &PatternMap) -> usize {
    patterns
        .values()
        .map(|p| p.len())
        .max()
        .unwrap_or(0)
        .max(DEFAULT_STEP_COUNT)
}

struct ClockShared {
    store: Arc<PatternStore>,
    registry: Arc<VoiceRegistry>,
    running: AtomicBool,
    current_step: AtomicUsize,
    on_step: RwLock<Option<StepCallback>>,
}

impl ClockShared {
    fn notify(&self, step: usize) {
        // Cloned out so the callback may replace itself
        let callback = self.on_step.read().clone();
        let Some(callback) = callback else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| callback(step))).is_err() {
            warn!("Step callback panicked at step {}", step);
        }
    }

    fn trigger_hits(&self, patterns: &PatternMap, step: usize) {
        for (instrument, pattern) in patterns.iter() {
            if !pattern.is_hit(step) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| self.registry.trigger(instrument))) {
                Ok(true) => {}
                Ok(false) => debug!("No voice for '{}', hit skipped", instrument),
                Err(_) => warn!("Trigger of '{}' panicked", instrument),
            }
        }
    }
}

struct Worker {
    stop_tx: Sender<()>,
    /// Disconnects when the loop thread exits
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Drives the voices from the pattern store
pub struct SequencerClock {
    shared: Arc<ClockShared>,
    worker: Mutex<Option<Worker>>,
    backend: Mutex<AudioBackend>,
    stop_timeout: Duration,
}

impl SequencerClock {
    pub fn new(
        store: Arc<PatternStore>,
        registry: Arc<VoiceRegistry>,
        backend: AudioBackend,
    ) -> Self {
        Self {
            shared: Arc::new(ClockShared {
                store,
                registry,
                running: AtomicBool::new(false),
                current_step: AtomicUsize::new(0),
                on_step: RwLock::new(None),
            }),
            worker: Mutex::new(None),
            backend: Mutex::new(backend),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Bound on how long `stop()` waits for the loop thread
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<PatternStore> {
        &self.shared.store
    }

    pub fn registry(&self) -> &Arc<VoiceRegistry> {
        &self.shared.registry
    }

    pub fn state(&self) -> ClockState {
        if self.shared.running.load(Ordering::Acquire) {
            ClockState::Running
        } else {
            ClockState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == ClockState::Running
    }

    /// Step most recently published by the loop
    pub fn current_step(&self) -> usize {
        self.shared.current_step.load(Ordering::Acquire)
    }

    /// Install the playhead callback, replacing any previous one
    ///
    /// Panics inside the callback are caught and logged; the loop keeps going.
    pub fn set_on_step<F>(&self, callback: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        *self.shared.on_step.write() = Some(Arc::new(callback));
    }

    pub fn clear_on_step(&self) {
        *self.shared.on_step.write() = None;
    }

    /// Spawn the timing loop; does nothing if it is already running
    pub fn start(&self) -> ClockResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let shared = Arc::clone(&self.shared);

        self.shared.current_step.store(0, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let spawned = thread::Builder::new()
            .name("pulsegrid-clock".to_string())
            .spawn(move || {
                let _done = done_tx;
                run_loop(&shared, &stop_rx);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                return Err(e.into());
            }
        };

        info!("Clock started at {} BPM", self.shared.store.bpm());
        *worker = Some(Worker {
            stop_tx,
            done_rx,
            handle,
        });
        Ok(())
    }

    /// Stop the timing loop and wait (bounded) for it to exit
    ///
    /// From the clock thread itself (inside the step callback) this only
    /// signals; the loop ends right after the callback returns.
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        self.shared.running.store(false, Ordering::Release);
        let _ = worker.stop_tx.try_send(());

        if thread::current().id() == worker.handle.thread().id() {
            debug!("Clock stop requested from the clock thread");
            return;
        }

        match worker.done_rx.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    error!("Clock thread panicked");
                }
                info!("Clock stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                // Dropping the handle detaches the thread; it exits on its own
                // once the stop message is seen
                warn!(
                    "Clock thread did not exit within {:?}, detaching it",
                    self.stop_timeout
                );
            }
        }
    }

    /// Stop, release every voice, then close the audio back-end
    ///
    /// Each step is guarded independently and never propagates a failure.
    /// Safe to call any number of times.
    pub fn shutdown(&self) {
        if panic::catch_unwind(AssertUnwindSafe(|| self.stop())).is_err() {
            error!("Clock stop panicked during shutdown");
        }

        if panic::catch_unwind(AssertUnwindSafe(|| self.shared.registry.release_all())).is_err() {
            error!("Voice release panicked during shutdown");
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.backend.lock().close())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Audio back-end close failed: {}", e),
            Err(_) => error!("Audio back-end close panicked during shutdown"),
        }
    }

    /// Run `f` with the audio back-end (e.g. to read its status)
    pub fn with_backend<R>(&self, f: impl FnOnce(&AudioBackend) -> R) -> R {
        f(&self.backend.lock())
    }
}

impl Drop for SequencerClock {
    fn drop(&mut self) {
        self.stop();
    }
}

/// True once a stop message arrived or the clock dropped its sender
fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    matches!(
        stop_rx.try_recv(),
        Ok(()) | Err(TryRecvError::Disconnected)
    )
}

fn run_loop(shared: &ClockShared, stop_rx: &Receiver<()>) {
    loop {
        // Tempo and patterns are sampled once per block
        let step_len = step_duration(shared.store.bpm());
        let patterns = shared.store.patterns();
        let steps = cycle_length(&patterns);

        for step in 0..steps {
            if stop_requested(stop_rx) {
                return;
            }

            shared.current_step.store(step, Ordering::Release);
            shared.notify(step);
            // The callback may have stopped the clock
            if stop_requested(stop_rx) {
                return;
            }

            let tick_start = Instant::now();
            shared.trigger_hits(&patterns, step);

            let remaining = step_len.saturating_sub(tick_start.elapsed());
            match stop_rx.recv_timeout(remaining) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}
