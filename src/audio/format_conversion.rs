// Format conversion for CPAL output streams and WAV capture
//
// The mix bus renders mono f32. The device may want f32, i16 or u16 and any
// channel count; captures are written as 16-bit integer PCM.
// All conversions are allocation-free and safe for the audio callback.

use cpal::{FromSample, Sample};

/// Convert f32 sample to i16
///
/// Maps [-1.0, 1.0] to [i16::MIN, i16::MAX]
/// Clamps values outside the range to prevent overflow
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);

    // i16::MAX (32767) on the positive side avoids overflow
    if clamped >= 0.0 {
        (clamped * i16::MAX as f32) as i16
    } else {
        (clamped * -(i16::MIN as f32)) as i16
    }
}

/// Write one mono sample to every channel of an interleaved frame
///
/// # Arguments
/// * `internal_sample` - The mono f32 sample to write
/// * `output_frame` - One audio frame (e.g., [L, R] for stereo)
#[inline]
pub fn write_mono_to_interleaved_frame<T>(internal_sample: f32, output_frame: &mut [T])
where
    T: Sample + FromSample<f32>,
{
    for channel_sample in output_frame.iter_mut() {
        *channel_sample = Sample::from_sample::<f32>(internal_sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_i16_conversion() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), i16::MIN);

        // Out of range is clamped
        assert_eq!(f32_to_i16(2.5), i16::MAX);
        assert_eq!(f32_to_i16(-7.0), i16::MIN);
    }

    #[test]
    fn test_mono_to_stereo_frame() {
        let mut frame = [0.0f32; 2];
        write_mono_to_interleaved_frame(0.5, &mut frame);
        assert_eq!(frame, [0.5, 0.5]);

        let mut frame_i16 = [0i16; 2];
        write_mono_to_interleaved_frame(0.0, &mut frame_i16);
        assert_eq!(frame_i16, [0, 0]);
    }
}
