// Mix Bus - Sums every routed source into the output block
//
// The bus only keeps *weak* references to its sources. Whoever routed a
// source must keep it alive: long-lived voices are held by the voice
// registry, one-shot sample playbacks by a `TransientVoicePool`. Once the
// last strong reference goes away the source silently drops off the bus.
//
// Lock order: the source list is locked before any source. Code holding a
// source lock must never route or render.

use crate::audio::dsp_utils::{OnePoleSmoother, flush_denormals_to_zero, soft_clip};
use crate::audio::parameters::AtomicF32;
use parking_lot::Mutex;
use ringbuf::HeapProd;
use ringbuf::traits::Producer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Anything that can render mono audio into the bus
pub trait Source: Send {
    /// Add this source's output to `out`
    ///
    /// `out` already holds the sum of previously rendered sources; implementors
    /// must add, not overwrite.
    fn render(&mut self, out: &mut [f32]);

    /// A finished source is dropped from the bus at the next block
    fn is_finished(&self) -> bool {
        false
    }
}

/// Strong handle to a routed source
pub type SharedSource = Arc<Mutex<dyn Source>>;

/// Sink for the rendered bus, fed from the audio thread
///
/// Samples that do not fit in the ring buffer are counted, not waited for.
pub struct CaptureTap {
    producer: HeapProd<f32>,
    dropped: Arc<AtomicU64>,
}

impl CaptureTap {
    pub fn new(producer: HeapProd<f32>, dropped: Arc<AtomicU64>) -> Self {
        Self { producer, dropped }
    }

    fn push(&mut self, block: &[f32]) {
        let written = self.producer.push_slice(block);
        if written < block.len() {
            self.dropped
                .fetch_add((block.len() - written) as u64, Ordering::Relaxed);
        }
    }
}

struct RenderState {
    sources: Vec<Weak<Mutex<dyn Source>>>,
    gain_smoother: OnePoleSmoother,
}

/// Output bus shared by the back-end, the voices and the recorder
pub struct MixBus {
    sample_rate: u32,
    state: Mutex<RenderState>,
    master_volume: AtomicF32,
    tap: Mutex<Option<CaptureTap>>,
    rendered_frames: AtomicU64,
}

impl MixBus {
    /// Create a bus with the given sample rate and master volume
    pub fn new(sample_rate: u32, master_volume: f32) -> Self {
        Self {
            sample_rate,
            state: Mutex::new(RenderState {
                sources: Vec::new(),
                // 10ms glide on master volume changes
                gain_smoother: OnePoleSmoother::new(master_volume, 10.0, sample_rate as f32),
            }),
            master_volume: AtomicF32::new(master_volume),
            tap: Mutex::new(None),
            rendered_frames: AtomicU64::new(0),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Route a source to the bus (weakly held)
    ///
    /// Dead entries are dropped here as well as in `render`, so the list
    /// stays bounded when nothing renders (headless).
    pub fn route(&self, source: &SharedSource) {
        let mut state = self.state.lock();
        state.sources.retain(|weak| weak.strong_count() > 0);
        state.sources.push(Arc::downgrade(source));
    }

    /// Number of sources still alive on the bus
    pub fn active_sources(&self) -> usize {
        self.state
            .lock()
            .sources
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume.get()
    }

    /// Set master volume (0.0 to 2.0)
    pub fn set_master_volume(&self, volume: f32) {
        self.master_volume.set(volume.clamp(0.0, 2.0));
    }

    /// Total frames rendered since creation
    pub fn rendered_frames(&self) -> u64 {
        self.rendered_frames.load(Ordering::Relaxed)
    }

    /// Install or remove the capture tap, returning the previous one
    pub fn set_tap(&self, tap: Option<CaptureTap>) -> Option<CaptureTap> {
        std::mem::replace(&mut *self.tap.lock(), tap)
    }

    pub fn has_tap(&self) -> bool {
        self.tap.lock().is_some()
    }

    /// Render one mono block, overwriting `out`
    ///
    /// Called by the device callback, or directly when running headless.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);

        {
            let mut state = self.state.lock();
            state.sources.retain(|weak| match weak.upgrade() {
                Some(source) => {
                    let mut source = source.lock();
                    source.render(out);
                    !source.is_finished()
                }
                None => false,
            });

            let target = self.master_volume.get();
            for sample in out.iter_mut() {
                let gain = state.gain_smoother.process(target);
                *sample = soft_clip(flush_denormals_to_zero(*sample) * gain);
            }
        }

        if let Some(tap) = self.tap.lock().as_mut() {
            tap.push(out);
        }

        self.rendered_frames
            .fetch_add(out.len() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::HeapRb;
    use ringbuf::traits::{Consumer, Split};

    struct Dc {
        level: f32,
        remaining: usize,
    }

    impl Source for Dc {
        fn render(&mut self, out: &mut [f32]) {
            for sample in out.iter_mut() {
                if self.remaining == 0 {
                    break;
                }
                *sample += self.level;
                self.remaining -= 1;
            }
        }

        fn is_finished(&self) -> bool {
            self.remaining == 0
        }
    }

    fn dc(level: f32, remaining: usize) -> SharedSource {
        Arc::new(Mutex::new(Dc { level, remaining }))
    }

    #[test]
    fn test_silence_without_sources() {
        let bus = MixBus::new(44100, 1.0);
        let mut block = [1.0f32; 64];
        bus.render(&mut block);
        assert!(block.iter().all(|&s| s == 0.0));
        assert_eq!(bus.rendered_frames(), 64);
    }

    #[test]
    fn test_dropped_source_leaves_bus() {
        let bus = MixBus::new(44100, 1.0);
        let source = dc(0.1, usize::MAX);
        bus.route(&source);
        assert_eq!(bus.active_sources(), 1);

        let mut block = [0.0f32; 32];
        bus.render(&mut block);
        assert!(block.iter().all(|&s| s > 0.0));

        drop(source);
        bus.render(&mut block);
        assert!(block.iter().all(|&s| s == 0.0));
        assert_eq!(bus.active_sources(), 0);
    }

    #[test]
    fn test_finished_source_is_pruned() {
        let bus = MixBus::new(44100, 1.0);
        let source = dc(0.1, 10);
        bus.route(&source);

        let mut block = [0.0f32; 32];
        bus.render(&mut block);
        assert!(block[9] > 0.0);
        assert_eq!(block[10], 0.0);

        // Still strongly held, but no longer on the bus
        assert_eq!(bus.state.lock().sources.len(), 0);
    }

    #[test]
    fn test_output_is_soft_clipped() {
        let bus = MixBus::new(44100, 1.0);
        let a = dc(3.0, usize::MAX);
        let b = dc(3.0, usize::MAX);
        bus.route(&a);
        bus.route(&b);

        let mut block = [0.0f32; 16];
        bus.render(&mut block);
        assert!(block.iter().all(|&s| s <= 1.0 && s > 0.9));
    }

    #[test]
    fn test_routing_without_render_stays_bounded() {
        let bus = MixBus::new(44100, 1.0);
        let keep = dc(0.1, usize::MAX);
        bus.route(&keep);

        // One-shots that die before anything renders them
        for _ in 0..10_000 {
            let blip = dc(0.5, 64);
            bus.route(&blip);
        }

        assert_eq!(bus.active_sources(), 1);
        assert!(bus.state.lock().sources.len() <= 2);
    }

    #[test]
    fn test_tap_receives_rendered_block() {
        let bus = MixBus::new(44100, 1.0);
        let (producer, mut consumer) = HeapRb::<f32>::new(16).split();
        let dropped = Arc::new(AtomicU64::new(0));
        bus.set_tap(Some(CaptureTap::new(producer, Arc::clone(&dropped))));

        let source = dc(0.2, usize::MAX);
        bus.route(&source);

        let mut block = [0.0f32; 24];
        bus.render(&mut block);

        let mut captured = [0.0f32; 24];
        let n = consumer.pop_slice(&mut captured);
        assert_eq!(n, 16);
        assert_eq!(dropped.load(Ordering::Relaxed), 8);
        assert_eq!(captured[..16], block[..16]);

        assert!(bus.set_tap(None).is_some());
        assert!(!bus.has_tap());
    }
}
