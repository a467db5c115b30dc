// DSP utilities - Output hygiene and parameter smoothing
//
// Small helpers used by the mix bus and by voices on the render path.
// Everything here is allocation-free.

/// Flush denormals to zero
///
/// Denormal floats (very close to 0) can slow some CPUs down a lot in
/// decaying envelopes and feedback paths.
///
/// Threshold: 1e-15 (far below 32-bit float noise)
#[inline]
pub fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < 1e-15 { 0.0 } else { x }
}

/// Soft clipping with tanh
///
/// Keeps the summed bus inside [-1, 1] without hard edges. Several voices at
/// volume > 1 can easily push the sum past full scale.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// One-pole smoother (first order low-pass)
///
/// Used for parameter glides (bass frequency) and master gain, to avoid
/// zipper noise when a value jumps.
///
/// y[n] = y[n-1] + a * (x[n] - y[n-1])
#[derive(Debug, Clone)]
pub struct OnePoleSmoother {
    current: f32,
    coefficient: f32,
}

impl OnePoleSmoother {
    /// Create a smoother
    ///
    /// # Arguments
    /// * `initial_value` - Starting value
    /// * `time_constant_ms` - Time to reach ~63% of a step change
    /// * `sample_rate` - Sample rate in Hz
    ///
    /// # Example
    /// ```
    /// use pulsegrid::audio::dsp_utils::OnePoleSmoother;
    /// // 50ms glide at 44.1kHz
    /// let smoother = OnePoleSmoother::new(60.0, 50.0, 44100.0);
    /// assert_eq!(smoother.get(), 60.0);
    /// ```
    pub fn new(initial_value: f32, time_constant_ms: f32, sample_rate: f32) -> Self {
        let time_constant_samples = (time_constant_ms * 0.001 * sample_rate).max(1.0);
        let coefficient = 1.0 / time_constant_samples;

        Self {
            current: initial_value,
            coefficient: coefficient.min(1.0),
        }
    }

    /// Advance one sample towards `target`
    #[inline]
    pub fn process(&mut self, target: f32) -> f32 {
        self.current += self.coefficient * (target - self.current);
        self.current = flush_denormals_to_zero(self.current);
        self.current
    }

    /// Jump to a value without smoothing
    #[inline]
    pub fn reset(&mut self, value: f32) {
        self.current = value;
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }
}
