//! Playback stream: pulls samples from a [`SampleProducer`] on every callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::models::config::PlaybackConfig;
use crate::models::error::StreamError;
use crate::models::state::StreamState;
use crate::processing::buffer_view::{InputBuffer, OutputBuffer};
use crate::session::thread_guard::ThreadGuard;
use crate::traits::audio_stream::AudioStream;
use crate::traits::driver::{
    AudioDriver, ChannelParameters, DriverStream, StreamCallback, StreamParameters, StreamSignal,
};
use crate::traits::sample_producer::SampleProducer;

struct OutputShared {
    started: AtomicBool,
    disposed: AtomicBool,
}

struct OutputCallback {
    shared: Arc<OutputShared>,
    producer: SampleProducer,
    scratch: Vec<f32>,
}

impl StreamCallback for OutputCallback {
    fn on_audio_buffer(&mut self, _input: InputBuffer<'_>, mut output: OutputBuffer<'_>) -> StreamSignal {
        let shared = &self.shared;
        if shared.disposed.load(Ordering::Acquire) || !shared.started.load(Ordering::Acquire) {
            output.silence();
            return StreamSignal::Abort;
        }

        // Scratch length is a whole number of frames, so every chunk is too.
        for chunk in output.interleaved_mut().chunks_mut(self.scratch.len()) {
            let scratch = &mut self.scratch[..chunk.len()];
            scratch.fill(0.0);
            (self.producer)(scratch);
            chunk.copy_from_slice(scratch);
        }
        StreamSignal::Continue
    }
}

/// Owns one playback stream on one device.
pub struct OutputStreamController<D: AudioDriver> {
    driver: Arc<D>,
    config: PlaybackConfig,
    producer: SampleProducer,
    shared: Arc<OutputShared>,
    stream: Option<D::Stream>,
    state: StreamState,
    guard: ThreadGuard,
}

impl<D: AudioDriver> OutputStreamController<D> {
    pub fn new(driver: Arc<D>, config: PlaybackConfig, producer: SampleProducer) -> Result<Self, StreamError> {
        config.validate()?;
        Ok(Self {
            driver,
            config,
            producer,
            shared: Arc::new(OutputShared {
                started: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
            }),
            stream: None,
            state: StreamState::Created,
            guard: ThreadGuard::current(),
        })
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn producer(&self) -> &SampleProducer {
        &self.producer
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_started()
    }

    fn stream_parameters(&self) -> StreamParameters {
        StreamParameters {
            input: None,
            output: Some(ChannelParameters {
                device: self.config.device.global_device_index,
                channel_count: self.config.channel_count,
                suggested_latency: self.config.device.default_low_output_latency,
            }),
            sample_rate: self.config.sample_rate,
            frames_per_period: self.config.frames_per_period,
        }
    }

    fn teardown(&mut self) -> Result<(), StreamError> {
        self.shared.started.store(false, Ordering::Release);
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let stopped = stream.stop();
        let closed = stream.close();
        log::info!("Closed playback stream on {}", self.config.device);
        stopped?;
        closed?;
        Ok(())
    }
}

impl<D: AudioDriver> AudioStream for OutputStreamController<D> {
    fn start(&mut self) -> Result<(), StreamError> {
        self.guard.check()?;
        if !self.state.can_start() {
            return Ok(());
        }

        let callback = Box::new(OutputCallback {
            shared: Arc::clone(&self.shared),
            producer: Arc::clone(&self.producer),
            scratch: vec![0.0; self.config.period_samples()],
        });
        let mut stream = self.driver.open_stream(&self.stream_parameters(), callback)?;

        self.shared.started.store(true, Ordering::Release);
        if let Err(e) = stream.start() {
            self.shared.started.store(false, Ordering::Release);
            if let Err(close_err) = stream.close() {
                log::warn!("Closing failed playback stream: {}", close_err);
            }
            return Err(e.into());
        }

        log::info!(
            "Started playback on {} ({} ch @ {} Hz)",
            self.config.device,
            self.config.channel_count,
            self.config.sample_rate
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

impl<D: AudioDriver> Drop for OutputStreamController<D> {
    fn drop(&mut self) {
        if self.state.is_disposed() {
            return;
        }
        self.shared.disposed.store(true, Ordering::Release);
        self.state = StreamState::Disposed;
        if let Err(e) = self.teardown() {
            log::warn!("Dropping playback stream on {}: {}", self.config.device, e);
        }
    }
}
