use crate::models::device::{DeviceDescriptor, HostApiId, HostApiInfo};
use crate::models::error::DriverError;
use crate::processing::buffer_view::{InputBuffer, OutputBuffer};

/// What a real-time callback tells the driver after each period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSignal {
    /// Keep calling back.
    Continue,
    /// The stream has finished its work (e.g. a non-looping recording is full).
    Complete,
    /// The owner stopped or disposed the stream; stop calling back at once.
    Abort,
}

/// One direction of a stream to open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelParameters {
    /// Global device index.
    pub device: usize,
    pub channel_count: u16,
    /// Suggested latency in seconds.
    pub suggested_latency: f64,
}

/// Everything a driver needs to open a stream.
///
/// At least one of `input` and `output` is set. Samples are always
/// interleaved `f32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamParameters {
    pub input: Option<ChannelParameters>,
    pub output: Option<ChannelParameters>,
    pub sample_rate: u32,
    pub frames_per_period: u32,
}

impl StreamParameters {
    pub fn input_channels(&self) -> usize {
        self.input.map(|p| p.channel_count as usize).unwrap_or(0)
    }

    pub fn output_channels(&self) -> usize {
        self.output.map(|p| p.channel_count as usize).unwrap_or(0)
    }
}

/// Real-time processing hook invoked by the driver on its own thread.
///
/// Implementations must not allocate, lock, log, or block.
pub trait StreamCallback: Send + 'static {
    fn on_audio_buffer(&mut self, input: InputBuffer<'_>, output: OutputBuffer<'_>) -> StreamSignal;
}

/// A stream opened by an [`AudioDriver`].
pub trait DriverStream {
    fn start(&mut self) -> Result<(), DriverError>;

    /// Stop the stream. Once this returns the driver makes no further callbacks.
    fn stop(&mut self) -> Result<(), DriverError>;

    /// Release the stream and its callback.
    fn close(self) -> Result<(), DriverError>;
}

/// Native audio driver boundary.
///
/// Implemented by:
/// - `CpalDriver` (audio-stream-cpal)
/// - `MockDriver` (tests, `testing` feature)
pub trait AudioDriver {
    type Stream: DriverStream;

    /// Global driver initialization. Called at most once per driver instance.
    fn initialize(&self) -> Result<(), DriverError>;

    /// Counterpart of a successful [`initialize`](Self::initialize).
    fn terminate(&self);

    fn host_apis(&self) -> Result<Vec<HostApiInfo>, DriverError>;

    fn default_host_api(&self) -> Result<HostApiId, DriverError>;

    /// Every device of every host API, ordered by global index.
    fn devices(&self) -> Result<Vec<DeviceDescriptor>, DriverError>;

    fn open_stream(
        &self,
        params: &StreamParameters,
        callback: Box<dyn StreamCallback>,
    ) -> Result<Self::Stream, DriverError>;
}
