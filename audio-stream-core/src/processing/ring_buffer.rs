use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use atomic_float::AtomicF32;

use crate::models::error::StreamError;
use crate::processing::buffer_view::InputBuffer;

/// Result of a [`RingBuffer::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// All samples were stored; keep streaming.
    Continue,
    /// The buffer is not looping and has been filled. The stream should finish.
    Full,
}

/// Fixed-capacity circular store of interleaved multi-channel samples.
///
/// One allocation of `capacity_frames * channels` samples. Exactly one
/// producer (the stream's real-time callback) may call [`write`](Self::write);
/// any number of threads may read concurrently without locking.
///
/// Samples live in atomic cells and the write cursor is published with
/// release ordering once a block is stored, so a reader always sees every
/// sample written before the cursor it observed. A read that overlaps a
/// block still being written may see newer samples in its oldest slots when
/// the writer has wrapped into them. Fine for visualization and monitoring,
/// not for bit-exact comparisons against a live stream.
///
/// Looping: overwrites the oldest frames once full.
/// Non-looping: the write that fills the last slot returns
/// [`WriteOutcome::Full`] and latches the buffer; later writes store nothing
/// and keep returning `Full` until [`reset`](Self::reset).
#[derive(Debug)]
pub struct RingBuffer {
    samples: Box<[AtomicF32]>,
    channels: usize,
    write_index: AtomicUsize,
    looping: AtomicBool,
    full: AtomicBool,
}

impl RingBuffer {
    pub fn new(capacity_frames: usize, channels: usize, looping: bool) -> Result<Self, StreamError> {
        if capacity_frames == 0 {
            return Err(StreamError::InvalidArgument(
                "ring buffer capacity cannot be zero".into(),
            ));
        }
        if channels == 0 {
            return Err(StreamError::InvalidArgument(
                "ring buffer channel count cannot be zero".into(),
            ));
        }
        let len = capacity_frames.checked_mul(channels).ok_or_else(|| {
            StreamError::InvalidArgument("ring buffer capacity overflows".into())
        })?;

        Ok(Self {
            samples: (0..len).map(|_| AtomicF32::new(0.0)).collect(),
            channels,
            write_index: AtomicUsize::new(0),
            looping: AtomicBool::new(looping),
            full: AtomicBool::new(false),
        })
    }

    /// Store one callback period of interleaved samples at the write cursor.
    ///
    /// Real-time safe: no allocation, no locking. Must only be called by the
    /// single producer.
    pub fn write(&self, input: &InputBuffer<'_>) -> WriteOutcome {
        if self.full.load(Ordering::Acquire) {
            return WriteOutcome::Full;
        }
        if input.channels() != self.channels {
            debug_assert_eq!(input.channels(), self.channels, "channel layout mismatch");
            return WriteOutcome::Continue;
        }

        let len = self.samples.len();
        let looping = self.looping.load(Ordering::Relaxed);
        let mut cursor = self.write_index.load(Ordering::Relaxed);

        for &sample in input.interleaved() {
            self.samples[cursor].store(sample, Ordering::Relaxed);
            cursor += 1;
            if cursor == len {
                cursor = 0;
                if !looping {
                    self.write_index.store(0, Ordering::Release);
                    self.full.store(true, Ordering::Release);
                    return WriteOutcome::Full;
                }
            }
        }

        self.write_index.store(cursor, Ordering::Release);
        WriteOutcome::Continue
    }

    /// Fill `destination` with the most recent samples of one channel, oldest first.
    ///
    /// Slots never written read as silence.
    pub fn read_latest(&self, channel: usize, destination: &mut [f32]) -> Result<(), StreamError> {
        if channel >= self.channels {
            return Err(StreamError::InvalidArgument(format!(
                "channel {} out of range for {} channels",
                channel, self.channels
            )));
        }
        if destination.len() > self.capacity_frames() {
            return Err(StreamError::InvalidArgument(format!(
                "destination holds {} samples but the buffer only keeps {} per channel",
                destination.len(),
                self.capacity_frames()
            )));
        }

        let len = self.samples.len();
        let cursor = self.write_index.load(Ordering::Acquire);
        // Newest sample of `channel` sits one frame behind the cursor.
        let mut index = (cursor + len - self.channels + channel) % len;
        for slot in destination.iter_mut().rev() {
            *slot = self.samples[index].load(Ordering::Relaxed);
            index = (index + len - self.channels) % len;
        }
        Ok(())
    }

    /// Fill `destination` with the most recent interleaved samples of all channels, oldest first.
    pub fn read_all_channels_latest(&self, destination: &mut [f32]) -> Result<(), StreamError> {
        let len = self.samples.len();
        if destination.len() > len {
            return Err(StreamError::InvalidArgument(format!(
                "destination holds {} samples but the buffer only keeps {}",
                destination.len(),
                len
            )));
        }

        let cursor = self.write_index.load(Ordering::Acquire);
        let mut index = (cursor + len - 1) % len;
        for slot in destination.iter_mut().rev() {
            *slot = self.samples[index].load(Ordering::Relaxed);
            index = (index + len - 1) % len;
        }
        Ok(())
    }

    /// Index of the next frame to be written, modulo capacity.
    pub fn position_in_frames(&self) -> usize {
        self.write_index.load(Ordering::Acquire) / self.channels
    }

    /// Zero the storage and rewind. Only call while the producer is stopped.
    pub fn reset(&self) {
        for sample in self.samples.iter() {
            sample.store(0.0, Ordering::Relaxed);
        }
        self.write_index.store(0, Ordering::Release);
        self.full.store(false, Ordering::Release);
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    /// Whether a non-looping buffer has been filled.
    pub fn is_full(&self) -> bool {
        self.full.load(Ordering::Acquire)
    }

    pub fn capacity_frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    /// Frames whose sample for channel `c` at frame `f` is `f * channels + c`.
    fn ramp(start_frame: usize, frames: usize, channels: usize) -> Vec<f32> {
        (start_frame * channels..(start_frame + frames) * channels)
            .map(|v| v as f32)
            .collect()
    }

    fn write_frames(buf: &RingBuffer, start_frame: usize, frames: usize) -> WriteOutcome {
        let channels = buf.channel_count();
        let samples = ramp(start_frame, frames, channels);
        buf.write(&InputBuffer::new(&samples, channels))
    }

    #[test]
    fn wraparound_keeps_last_capacity_frames_in_order() {
        let buf = RingBuffer::new(8, 2, true).unwrap();
        assert_eq!(write_frames(&buf, 0, 5), WriteOutcome::Continue);
        assert_eq!(write_frames(&buf, 5, 6), WriteOutcome::Continue); // 11 frames total

        let mut all = vec![0.0; 16];
        buf.read_all_channels_latest(&mut all).unwrap();
        assert_eq!(all, ramp(3, 8, 2));
        assert_eq!(buf.position_in_frames(), 3);
    }

    #[test]
    fn non_looping_fill_signals_full_on_last_slot() {
        let buf = RingBuffer::new(4, 1, false).unwrap();
        assert_eq!(write_frames(&buf, 0, 3), WriteOutcome::Continue);
        assert!(!buf.is_full());
        assert_eq!(write_frames(&buf, 3, 1), WriteOutcome::Full);
        assert!(buf.is_full());
        assert_eq!(buf.position_in_frames(), 0);

        let mut latest = vec![0.0; 4];
        buf.read_latest(0, &mut latest).unwrap();
        assert_eq!(latest, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn write_after_full_is_dropped_and_signals_full_again() {
        let buf = RingBuffer::new(4, 1, false).unwrap();
        assert_eq!(write_frames(&buf, 0, 4), WriteOutcome::Full);
        assert_eq!(write_frames(&buf, 4, 1), WriteOutcome::Full);

        let mut latest = vec![0.0; 4];
        buf.read_latest(0, &mut latest).unwrap();
        assert_eq!(latest, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn non_looping_block_crossing_the_end_keeps_what_fits() {
        let buf = RingBuffer::new(4, 1, false).unwrap();
        write_frames(&buf, 0, 2);
        assert_eq!(write_frames(&buf, 2, 5), WriteOutcome::Full);

        let mut latest = vec![0.0; 4];
        buf.read_latest(0, &mut latest).unwrap();
        assert_eq!(latest, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn channels_deinterleave_exactly() {
        let channels = 3;
        let buf = RingBuffer::new(16, channels, true).unwrap();
        write_frames(&buf, 0, 10);

        for channel in 0..channels {
            let mut samples = vec![0.0; 10];
            buf.read_latest(channel, &mut samples).unwrap();
            let expected: Vec<f32> = (0..10).map(|f| (f * channels + channel) as f32).collect();
            assert_eq!(samples, expected, "channel {}", channel);
        }
    }

    #[test]
    fn unwritten_slots_read_as_silence() {
        let buf = RingBuffer::new(6, 2, true).unwrap();
        write_frames(&buf, 0, 2);

        let mut samples = vec![9.0; 4];
        buf.read_latest(1, &mut samples).unwrap();
        assert_eq!(samples, vec![0.0, 0.0, 1.0, 3.0]);
    }

    #[test]
    fn oversized_destination_is_rejected() {
        let buf = RingBuffer::new(4, 2, true).unwrap();
        let mut channel = vec![0.0; 5];
        assert!(matches!(
            buf.read_latest(0, &mut channel),
            Err(StreamError::InvalidArgument(_))
        ));
        let mut all = vec![0.0; 9];
        assert!(matches!(
            buf.read_all_channels_latest(&mut all),
            Err(StreamError::InvalidArgument(_))
        ));
    }

    #[test]
    fn channel_out_of_range_is_rejected() {
        let buf = RingBuffer::new(4, 2, true).unwrap();
        let mut samples = vec![0.0; 2];
        assert!(buf.read_latest(2, &mut samples).is_err());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(RingBuffer::new(0, 1, true).is_err());
        assert!(RingBuffer::new(1, 0, true).is_err());
    }

    #[test]
    fn reset_clears_samples_cursor_and_full_latch() {
        let buf = RingBuffer::new(2, 1, false).unwrap();
        assert_eq!(write_frames(&buf, 1, 2), WriteOutcome::Full);
        buf.reset();

        assert!(!buf.is_full());
        assert_eq!(buf.position_in_frames(), 0);
        let mut samples = vec![9.0; 2];
        buf.read_latest(0, &mut samples).unwrap();
        assert_eq!(samples, vec![0.0, 0.0]);
        assert_eq!(write_frames(&buf, 0, 1), WriteOutcome::Continue);
    }

    #[test]
    fn loop_flag_can_change_while_writing() {
        let buf = RingBuffer::new(2, 1, true).unwrap();
        assert_eq!(write_frames(&buf, 0, 3), WriteOutcome::Continue);
        buf.set_looping(false);
        assert!(!buf.is_looping());
        assert_eq!(write_frames(&buf, 3, 1), WriteOutcome::Full);
    }

    #[test]
    fn concurrent_reader_sees_monotonic_progress() {
        let frames = 4096;
        let buf = Arc::new(RingBuffer::new(frames, 1, false).unwrap());

        let writer = {
            let buf = Arc::clone(&buf);
            thread::spawn(move || {
                for block in 0..(frames / 64 - 1) {
                    let samples = ramp(block * 64 + 1, 64, 1);
                    buf.write(&InputBuffer::new(&samples, 1));
                }
            })
        };

        let mut last = 0.0f32;
        let mut newest = [0.0f32; 1];
        for _ in 0..10_000 {
            buf.read_latest(0, &mut newest).unwrap();
            assert!(newest[0] >= last, "went backwards: {} < {}", newest[0], last);
            last = newest[0];
        }
        writer.join().unwrap();
    }
}
