// Sample player - One independent playback of a sample buffer

use super::loader::SampleBuffer;
use crate::audio::mix_bus::Source;
use crate::audio::parameters::AtomicF32;
use std::sync::Arc;

/// Plays a buffer once from the start, resampling by linear interpolation
///
/// The volume is shared with the owning voice, so changes apply to playbacks
/// already in flight.
pub struct SamplePlayer {
    buffer: Arc<SampleBuffer>,
    position: f64,
    step: f64,
    volume: AtomicF32,
}

impl SamplePlayer {
    pub fn new(buffer: Arc<SampleBuffer>, output_rate: u32, volume: AtomicF32) -> Self {
        let step = if output_rate == 0 {
            1.0
        } else {
            buffer.sample_rate as f64 / output_rate as f64
        };
        Self {
            buffer,
            position: 0.0,
            step,
            volume,
        }
    }
}

impl Source for SamplePlayer {
    fn render(&mut self, out: &mut [f32]) {
        let frames = &self.buffer.frames;
        let volume = self.volume.get();

        for sample in out.iter_mut() {
            let index = self.position as usize;
            if index >= frames.len() {
                break;
            }
            let frac = (self.position - index as f64) as f32;
            let current = frames[index];
            let next = frames.get(index + 1).copied().unwrap_or(0.0);
            *sample += (current + (next - current) * frac) * volume;
            self.position += self.step;
        }
    }

    fn is_finished(&self) -> bool {
        self.position as usize >= self.buffer.frames.len()
    }
}
