//! Capture stream: driver callback into a [`RingBuffer`], with optional live monitoring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use atomic_float::AtomicF32;

use crate::models::config::StreamConfig;
use crate::models::error::StreamError;
use crate::models::state::StreamState;
use crate::processing::buffer_view::{InputBuffer, OutputBuffer};
use crate::processing::mixer::write_monitor_output;
use crate::processing::ring_buffer::{RingBuffer, WriteOutcome};
use crate::session::thread_guard::ThreadGuard;
use crate::traits::audio_stream::AudioStream;
use crate::traits::driver::{
    AudioDriver, ChannelParameters, DriverStream, StreamCallback, StreamParameters, StreamSignal,
};

/// State shared between the controller and its real-time callback.
struct InputShared {
    ring: RingBuffer,
    started: AtomicBool,
    disposed: AtomicBool,
    completed: AtomicBool,
    amplification: AtomicF32,
}

struct InputCallback {
    shared: Arc<InputShared>,
}

impl StreamCallback for InputCallback {
    fn on_audio_buffer(&mut self, input: InputBuffer<'_>, mut output: OutputBuffer<'_>) -> StreamSignal {
        let shared = &self.shared;
        if shared.disposed.load(Ordering::Acquire) || !shared.started.load(Ordering::Acquire) {
            output.silence();
            return StreamSignal::Abort;
        }

        let outcome = shared.ring.write(&input);

        if !output.is_empty() {
            let gain = shared.amplification.load(Ordering::Relaxed);
            write_monitor_output(&input, &mut output, gain);
        }

        match outcome {
            WriteOutcome::Continue => StreamSignal::Continue,
            WriteOutcome::Full => {
                shared.completed.store(true, Ordering::Release);
                StreamSignal::Complete
            }
        }
    }
}

/// Owns one capture stream on one device.
///
/// The ring buffer outlives every driver stream the controller opens, so
/// samples stay readable after [`stop`](AudioStream::stop).
pub struct InputStreamController<D: AudioDriver> {
    driver: Arc<D>,
    config: StreamConfig,
    shared: Arc<InputShared>,
    stream: Option<D::Stream>,
    state: StreamState,
    guard: ThreadGuard,
}

impl<D: AudioDriver> InputStreamController<D> {
    /// Allocate the ring buffer. No driver stream is opened until `start`.
    pub fn new(driver: Arc<D>, config: StreamConfig) -> Result<Self, StreamError> {
        config.validate()?;
        let ring = RingBuffer::new(
            config.capacity_frames(),
            config.channel_count as usize,
            config.loop_recording,
        )?;
        let shared = Arc::new(InputShared {
            ring,
            started: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            amplification: AtomicF32::new(config.output_amplification_factor),
        });

        Ok(Self {
            driver,
            config,
            shared,
            stream: None,
            state: StreamState::Created,
            guard: ThreadGuard::current(),
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Started and the buffer has not completed.
    pub fn is_recording(&self) -> bool {
        self.state.is_started() && !self.shared.completed.load(Ordering::Acquire)
    }

    /// Whether a non-looping recording has filled its buffer.
    pub fn is_complete(&self) -> bool {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Current write position in frames, modulo capacity.
    pub fn position(&self) -> usize {
        self.shared.ring.position_in_frames()
    }

    pub fn capacity_frames(&self) -> usize {
        self.shared.ring.capacity_frames()
    }

    /// Most recent samples of `channel`, oldest first.
    ///
    /// A disposed controller leaves `destination` untouched.
    pub fn recorded_samples(&self, channel: usize, destination: &mut [f32]) -> Result<(), StreamError> {
        self.guard.check()?;
        if self.state.is_disposed() {
            return Ok(());
        }
        self.shared.ring.read_latest(channel, destination)
    }

    /// Most recent interleaved samples of every channel, oldest first.
    pub fn all_recorded_samples(&self, destination: &mut [f32]) -> Result<(), StreamError> {
        self.guard.check()?;
        if self.state.is_disposed() {
            return Ok(());
        }
        self.shared.ring.read_all_channels_latest(destination)
    }

    /// Takes effect from the next callback.
    pub fn set_amplification(&mut self, factor: f32) -> Result<(), StreamError> {
        self.guard.check()?;
        if !factor.is_finite() {
            return Err(StreamError::InvalidArgument(
                "output amplification factor must be finite".into(),
            ));
        }
        self.config.output_amplification_factor = factor;
        self.shared.amplification.store(factor, Ordering::Relaxed);
        Ok(())
    }

    /// Takes effect from the next callback.
    pub fn set_loop(&mut self, looping: bool) -> Result<(), StreamError> {
        self.guard.check()?;
        self.config.loop_recording = looping;
        self.shared.ring.set_looping(looping);
        Ok(())
    }

    fn stream_parameters(&self) -> StreamParameters {
        let device = &self.config.device;
        let output = self.config.monitor_device.as_ref().and_then(|monitor| {
            (self.config.monitor_channel_count() > 0).then(|| ChannelParameters {
                device: monitor.global_device_index,
                channel_count: self.config.monitor_channel_count(),
                suggested_latency: monitor.default_low_output_latency,
            })
        });

        StreamParameters {
            input: Some(ChannelParameters {
                device: device.global_device_index,
                channel_count: self.config.channel_count,
                suggested_latency: device.default_low_input_latency,
            }),
            output,
            sample_rate: self.config.sample_rate,
            frames_per_period: self.config.frames_per_period,
        }
    }

    /// Stop and close the driver stream without the thread check. Used by
    /// `Drop`, which may run anywhere.
    fn teardown(&mut self) -> Result<(), StreamError> {
        self.shared.started.store(false, Ordering::Release);
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let stopped = stream.stop();
        let closed = stream.close();
        log::info!("Closed capture stream on {}", self.config.device);
        stopped?;
        closed?;
        Ok(())
    }
}

impl<D: AudioDriver> AudioStream for InputStreamController<D> {
    fn start(&mut self) -> Result<(), StreamError> {
        self.guard.check()?;
        if self.state.is_started() && self.is_complete() {
            // A filled non-looping buffer has finished; record again from scratch.
            log::debug!("Restarting completed capture on {}", self.config.device);
            self.state = StreamState::Stopped;
            self.teardown()?;
        }
        if !self.state.can_start() {
            return Ok(());
        }

        self.shared.ring.reset();
        self.shared.completed.store(false, Ordering::Release);

        let callback = Box::new(InputCallback {
            shared: Arc::clone(&self.shared),
        });
        let mut stream = self.driver.open_stream(&self.stream_parameters(), callback)?;

        // Raised before the driver starts so the first callback is accepted.
        self.shared.started.store(true, Ordering::Release);
        if let Err(e) = stream.start() {
            self.shared.started.store(false, Ordering::Release);
            if let Err(close_err) = stream.close() {
                log::warn!("Closing failed capture stream: {}", close_err);
            }
            return Err(e.into());
        }

        log::info!(
            "Started capture on {} ({} ch @ {} Hz, {} s, loop={})",
            self.config.device,
            self.config.channel_count,
            self.config.sample_rate,
            self.config.buffer_length_secs,
            self.config.loop_recording
        );
        self.stream = Some(stream);
        self.state = StreamState::Started;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), StreamError> {
        self.guard.check()?;
        if !self.state.is_started() {
            return Ok(());
        }
        self.state = StreamState::Stopped;
        self.teardown()
    }

    fn is_running(&self) -> bool {
        self.state.is_started()
    }

    fn dispose(&mut self) -> Result<(), StreamError> {
        self.guard.check()?;
        if self.state.is_disposed() {
            return Ok(());
        }
        self.shared.disposed.store(true, Ordering::Release);
        self.state = StreamState::Disposed;
        self.teardown()
    }

    fn state(&self) -> StreamState {
        self.state
    }
}

impl<D: AudioDriver> Drop for InputStreamController<D> {
    fn drop(&mut self) {
        if self.state.is_disposed() {
            return;
        }
        self.shared.disposed.store(true, Ordering::Release);
        self.state = StreamState::Disposed;
        if let Err(e) = self.teardown() {
            log::warn!("Dropping capture stream on {}: {}", self.config.device, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use approx::assert_relative_eq;

    use super::*;
    use crate::testing::MockDriver;

    fn controller(driver: &MockDriver, config: StreamConfig) -> InputStreamController<MockDriver> {
        InputStreamController::new(Arc::new(driver.clone()), config).unwrap()
    }

    fn mic_config(driver: &MockDriver) -> StreamConfig {
        let mut config = StreamConfig::new(driver.device(0).unwrap(), 4, 2);
        config.frames_per_period = 4;
        config
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let driver = MockDriver::new();
        let mut input = controller(&driver, mic_config(&driver));

        input.start().unwrap();
        input.start().unwrap();
        assert_eq!(driver.open_count(), 1);
        assert!(input.is_recording());

        input.stop().unwrap();
        input.stop().unwrap();
        assert_eq!(driver.close_count(), 1);
        assert_eq!(input.state(), StreamState::Stopped);
        assert!(!input.is_recording());
    }

    #[test]
    fn callback_records_into_the_ring() {
        let driver = MockDriver::new();
        let mut input = controller(&driver, mic_config(&driver));
        input.start().unwrap();

        let stream = driver.last_stream().unwrap();
        let signal = driver.fire(stream, &[0.1, -0.1, 0.2, -0.2], &mut []);
        assert_eq!(signal, Some(StreamSignal::Continue));
        assert_eq!(input.position(), 2);

        let mut left = [0.0f32; 2];
        input.recorded_samples(0, &mut left).unwrap();
        assert_eq!(left, [0.1, 0.2]);

        let mut all = [0.0f32; 4];
        input.all_recorded_samples(&mut all).unwrap();
        assert_eq!(all, [0.1, -0.1, 0.2, -0.2]);
    }

    #[test]
    fn samples_survive_stop_and_reset_on_restart() {
        let driver = MockDriver::new();
        let mut input = controller(&driver, mic_config(&driver));
        input.start().unwrap();
        driver.fire(0, &[0.5, 0.5], &mut []);
        input.stop().unwrap();

        let mut latest = [0.0f32; 1];
        input.recorded_samples(1, &mut latest).unwrap();
        assert_eq!(latest, [0.5]);

        input.start().unwrap();
        assert_eq!(input.position(), 0);
        input.recorded_samples(1, &mut latest).unwrap();
        assert_eq!(latest, [0.0]);
    }

    #[test]
    fn non_looping_recording_completes() {
        let driver = MockDriver::new();
        let mut config = mic_config(&driver);
        config.loop_recording = false;
        let mut input = controller(&driver, config);
        input.start().unwrap();

        // 8 frames of capacity, 2 channels.
        assert_eq!(driver.fire(0, &[0.1; 8], &mut []), Some(StreamSignal::Continue));
        assert_eq!(driver.fire(0, &[0.2; 8], &mut []), Some(StreamSignal::Complete));
        assert!(!input.is_recording());
        assert!(input.is_complete());
        assert!(input.is_running());
    }

    #[test]
    fn completed_recording_restarts_from_scratch() {
        let driver = MockDriver::new();
        let mut config = mic_config(&driver);
        config.loop_recording = false;
        let mut input = controller(&driver, config);
        input.start().unwrap();
        driver.fire(0, &[0.3; 16], &mut []);
        assert!(input.is_complete());
        assert!(!input.is_recording());

        input.start().unwrap();
        assert!(input.is_recording());
        assert!(!input.is_complete());
        assert_eq!(input.position(), 0);
        assert_eq!(driver.open_count(), 2);
        assert_eq!(driver.close_count(), 1);

        // The fresh stream records again.
        let stream = driver.last_stream().unwrap();
        assert_eq!(driver.fire(stream, &[0.1; 8], &mut []), Some(StreamSignal::Continue));
        assert_eq!(input.position(), 4);
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let driver = MockDriver::new();
        let mut input = controller(&driver, mic_config(&driver));
        assert!(input.stop().is_ok());
        assert_eq!(input.state(), StreamState::Created);
        assert!(driver.calls().is_empty());

        input.start().unwrap();
        assert!(input.is_recording());
    }

    #[test]
    fn monitor_output_is_mono_and_amplified() {
        let driver = MockDriver::new();
        let mut config = StreamConfig::new(driver.device(2).unwrap(), 4, 1);
        config.monitor_device = driver.device(2);
        config.output_amplification_factor = 2.0;
        let mut input = controller(&driver, config);
        input.start().unwrap();

        let params = driver.stream_parameters(0).unwrap();
        assert_eq!(params.output.map(|p| p.channel_count), Some(1));

        let mut out = [0.0f32; 4];
        driver.fire(0, &[0.2, -0.2, 0.2, -0.2], &mut out);
        for (actual, expected) in out.iter().zip([0.4, -0.4, 0.4, -0.4]) {
            assert_relative_eq!(*actual, expected);
        }

        input.set_amplification(0.5).unwrap();
        driver.fire(0, &[0.2, -0.2, 0.2, -0.2], &mut out);
        assert_relative_eq!(out[0], 0.1);
    }

    #[test]
    fn callback_after_dispose_aborts() {
        let driver = MockDriver::new();
        let mut input = controller(&driver, mic_config(&driver));
        input.start().unwrap();
        input.dispose().unwrap();
        drop(input);

        assert_eq!(driver.open_streams(), 0);
        assert_eq!(driver.fire(0, &[1.0, 1.0], &mut []), Some(StreamSignal::Abort));
    }

    #[test]
    fn callback_after_stop_aborts() {
        let driver = MockDriver::new();
        let mut input = controller(&driver, mic_config(&driver));
        input.start().unwrap();
        input.stop().unwrap();
        assert_eq!(driver.fire(0, &[1.0, 1.0], &mut []), Some(StreamSignal::Abort));
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn disposed_controller_ignores_everything() {
        let driver = MockDriver::new();
        let mut input = controller(&driver, mic_config(&driver));
        input.dispose().unwrap();
        input.dispose().unwrap();
        input.start().unwrap();
        assert_eq!(driver.open_count(), 0);

        let mut dest = [7.0f32; 2];
        input.recorded_samples(0, &mut dest).unwrap();
        assert_eq!(dest, [7.0, 7.0]);
    }

    #[test]
    fn failed_open_is_device_unavailable() {
        let driver = MockDriver::new();
        driver.fail_open("device busy");
        let mut input = controller(&driver, mic_config(&driver));

        let err = input.start().unwrap_err();
        assert!(matches!(err, StreamError::DeviceUnavailable(msg) if msg.contains("device busy")));
        assert_eq!(input.state(), StreamState::Created);
    }

    #[test]
    fn failed_start_closes_the_stream() {
        let driver = MockDriver::new();
        driver.fail_start("no clock");
        let mut input = controller(&driver, mic_config(&driver));

        assert!(input.start().is_err());
        assert_eq!(driver.open_count(), 1);
        assert_eq!(driver.close_count(), 1);
        assert!(!input.is_running());
    }

    #[test]
    fn drop_closes_a_running_stream() {
        let driver = MockDriver::new();
        let mut input = controller(&driver, mic_config(&driver));
        input.start().unwrap();
        drop(input);
        assert_eq!(driver.open_streams(), 0);
    }

    #[test]
    fn other_threads_are_rejected() {
        let driver = MockDriver::new();
        let mut input = controller(&driver, mic_config(&driver));
        let result = thread::spawn(move || input.start()).join().unwrap();
        assert_eq!(result, Err(StreamError::ThreadViolation));
    }

    #[test]
    fn oversized_read_is_rejected() {
        let driver = MockDriver::new();
        let input = controller(&driver, mic_config(&driver));
        let mut dest = vec![0.0f32; input.capacity_frames() + 1];
        assert!(matches!(
            input.recorded_samples(0, &mut dest),
            Err(StreamError::InvalidArgument(_))
        ));
    }
}
