//! Allocation-free mixing helpers used on the real-time path.

use crate::processing::buffer_view::{InputBuffer, OutputBuffer};

/// Average of all channels of one frame.
#[inline]
pub fn downmix_frame(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    frame.iter().sum::<f32>() / frame.len() as f32
}

/// Route live input to a monitor output.
///
/// Each input frame is averaged to mono, scaled by `amplification`, and
/// written to every channel of the matching output frame. Output frames
/// without a matching input frame are silenced.
pub fn write_monitor_output(input: &InputBuffer<'_>, output: &mut OutputBuffer<'_>, amplification: f32) {
    let mut inputs = input.frames();
    for out_frame in output.frames_mut() {
        let value = match inputs.next() {
            Some(frame) => downmix_frame(frame) * amplification,
            None => 0.0,
        };
        out_frame.fill(value);
    }
}

/// RMS level of a block of samples.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_of_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_of_squares / samples.len() as f32).sqrt()
}

/// Peak absolute level of a block of samples.
pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn downmix_averages_channels() {
        assert_relative_eq!(downmix_frame(&[0.2, 0.4]), 0.3);
        assert_eq!(downmix_frame(&[]), 0.0);
    }

    #[test]
    fn mono_monitor_is_amplified() {
        let samples = [0.2, -0.2, 0.2, -0.2];
        let mut out = [0.0f32; 4];
        write_monitor_output(
            &InputBuffer::new(&samples, 1),
            &mut OutputBuffer::new(&mut out, 1),
            2.0,
        );
        for (actual, expected) in out.iter().zip([0.4, -0.4, 0.4, -0.4]) {
            assert_relative_eq!(*actual, expected);
        }
    }

    #[test]
    fn stereo_input_is_downmixed_to_every_output_channel() {
        let samples = [0.5, 0.1, -0.2, -0.4];
        let mut out = [0.0f32; 4];
        write_monitor_output(
            &InputBuffer::new(&samples, 2),
            &mut OutputBuffer::new(&mut out, 2),
            1.0,
        );
        assert_relative_eq!(out[0], 0.3);
        assert_relative_eq!(out[1], 0.3);
        assert_relative_eq!(out[2], -0.3);
        assert_relative_eq!(out[3], -0.3);
    }

    #[test]
    fn missing_input_frames_are_silenced() {
        let samples = [1.0];
        let mut out = [9.0f32; 3];
        write_monitor_output(
            &InputBuffer::new(&samples, 1),
            &mut OutputBuffer::new(&mut out, 1),
            1.0,
        );
        assert_eq!(out, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn levels() {
        assert_relative_eq!(rms_level(&[0.5, -0.5]), 0.5);
        assert_relative_eq!(peak_level(&[0.1, -0.7, 0.3]), 0.7);
        assert_eq!(rms_level(&[]), 0.0);
        assert_eq!(peak_level(&[]), 0.0);
    }
}
