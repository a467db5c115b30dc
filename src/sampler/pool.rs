// Transient voice pool - Keeps one-shot playbacks alive for their natural length
//
// The mix bus only holds weak references, so a playback nobody owns stops
// immediately. The pool owns each playback until `expected_duration` plus a
// guard band has elapsed, then lets it go. Capacity is bounded: the oldest
// playback is evicted first.
//
// Every mutation of the retained set happens under one mutex; the reaper
// thread and the trigger calls run on different threads.

use crate::audio::mix_bus::{MixBus, SharedSource, Source};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_MAX_VOICES: usize = 64;
pub const DEFAULT_GUARD_BAND: Duration = Duration::from_millis(100);

/// Sequence number of a playback, unique per pool
pub type TransientVoiceId = u64;

/// One in-flight playback
pub struct TransientVoiceHandle {
    pub id: TransientVoiceId,
    pub created_at: Instant,
    pub expected_duration: Duration,
    player: SharedSource,
}

impl TransientVoiceHandle {
    /// Instant after which the playback may be released
    pub fn deadline(&self, guard_band: Duration) -> Instant {
        self.created_at + self.expected_duration + guard_band
    }

    /// False once the player has rendered its last frame
    pub fn is_playing(&self) -> bool {
        !self.player.lock().is_finished()
    }
}

struct PoolInner {
    bus: Arc<MixBus>,
    max_voices: usize,
    guard_band: Duration,
    retained: Mutex<VecDeque<TransientVoiceHandle>>,
    next_id: AtomicU64,
}

impl PoolInner {
    fn next_deadline(&self) -> Option<Instant> {
        self.retained
            .lock()
            .iter()
            .map(|h| h.deadline(self.guard_band))
            .min()
    }

    fn reap_expired(&self, now: Instant) -> usize {
        let expired: VecDeque<TransientVoiceHandle> = {
            let mut retained = self.retained.lock();
            let (keep, expired) = retained
                .drain(..)
                .partition(|h| h.deadline(self.guard_band) > now);
            *retained = keep;
            expired
        };
        // Dropped outside the lock
        expired.len()
    }
}

struct Reaper {
    wake_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Bounded owner of transient playbacks
pub struct TransientVoicePool {
    inner: Arc<PoolInner>,
    reaper: Option<Reaper>,
}

impl TransientVoicePool {
    /// Pool with the default capacity (64) and guard band (100ms)
    pub fn with_defaults(bus: Arc<MixBus>) -> Self {
        Self::new(bus, DEFAULT_MAX_VOICES, DEFAULT_GUARD_BAND)
    }

    pub fn new(bus: Arc<MixBus>, max_voices: usize, guard_band: Duration) -> Self {
        let inner = Arc::new(PoolInner {
            bus,
            max_voices: max_voices.max(1),
            guard_band,
            retained: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
        });

        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        let reaper_inner = Arc::clone(&inner);
        let reaper = match thread::Builder::new()
            .name("pulsegrid-reaper".to_string())
            .spawn(move || run_reaper(reaper_inner, wake_rx))
        {
            Ok(handle) => Some(Reaper { wake_tx, handle }),
            Err(e) => {
                warn!("Could not start pool reaper ({}), playbacks are reclaimed on capacity only", e);
                None
            }
        };

        Self { inner, reaper }
    }

    /// Create a playback, route it to the bus and retain it
    ///
    /// Returns the id of the new playback. If the pool is full the oldest
    /// playback is released first.
    pub fn play<F, S>(&self, make_player: F, expected_duration: Duration) -> TransientVoiceId
    where
        F: FnOnce() -> S,
        S: Source + 'static,
    {
        let player: SharedSource = Arc::new(Mutex::new(make_player()));
        self.inner.bus.route(&player);

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let evicted = {
            let mut retained = self.inner.retained.lock();
            retained.push_back(TransientVoiceHandle {
                id,
                created_at: Instant::now(),
                expected_duration,
                player,
            });
            let overflow = retained.len().saturating_sub(self.inner.max_voices);
            retained.drain(..overflow).collect::<Vec<_>>()
        };

        for handle in &evicted {
            debug!("Pool full, evicted playback {}", handle.id);
        }

        if let Some(reaper) = &self.reaper {
            // A pending wake-up already covers this one
            let _ = reaper.wake_tx.try_send(());
        }
        id
    }

    /// Release one playback; unknown or already released ids are ignored
    pub fn release(&self, id: TransientVoiceId) -> bool {
        let mut retained = self.inner.retained.lock();
        let Some(index) = retained.iter().position(|h| h.id == id) else {
            return false;
        };
        let removed = retained.remove(index);
        drop(retained);
        removed.is_some()
    }

    /// Release every playback, returning how many were held
    pub fn release_all(&self) -> usize {
        let released: Vec<_> = self.inner.retained.lock().drain(..).collect();
        released.len()
    }

    /// Release every playback whose deadline is at or before `now`
    pub fn reap_expired(&self, now: Instant) -> usize {
        self.inner.reap_expired(now)
    }

    /// Number of retained playbacks
    pub fn len(&self) -> usize {
        self.inner.retained.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retained playbacks that are still rendering
    pub fn active_count(&self) -> usize {
        self.inner
            .retained
            .lock()
            .iter()
            .filter(|h| h.is_playing())
            .count()
    }

    /// Ids of retained playbacks, oldest first
    pub fn ids(&self) -> Vec<TransientVoiceId> {
        self.inner.retained.lock().iter().map(|h| h.id).collect()
    }

    pub fn max_voices(&self) -> usize {
        self.inner.max_voices
    }

    pub fn guard_band(&self) -> Duration {
        self.inner.guard_band
    }
}

impl Drop for TransientVoicePool {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.take() {
            // Disconnecting the channel ends the reaper loop
            drop(reaper.wake_tx);
            if reaper.handle.join().is_err() {
                warn!("Pool reaper thread panicked");
            }
        }
    }
}

fn run_reaper(inner: Arc<PoolInner>, wake_rx: Receiver<()>) {
    loop {
        inner.reap_expired(Instant::now());

        let received = match inner.next_deadline() {
            Some(deadline) => {
                wake_rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => wake_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
