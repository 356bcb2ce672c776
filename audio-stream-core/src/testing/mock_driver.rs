//! Scripted in-memory [`AudioDriver`].
//!
//! Records every driver call, can be told to fail, and keeps each stream's
//! callback around after close so tests can fire it the way a late driver
//! thread would.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::device::{DeviceDescriptor, HostApiId, HostApiInfo};
use crate::models::error::DriverError;
use crate::processing::buffer_view::{InputBuffer, OutputBuffer};
use crate::traits::driver::{
    AudioDriver, ChannelParameters, DriverStream, StreamCallback, StreamParameters, StreamSignal,
};

/// One call made against the mock, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Initialize,
    Terminate,
    Open(usize),
    Start(usize),
    Stop(usize),
    Close(usize),
}

struct StreamRecord {
    params: StreamParameters,
    callback: Arc<Mutex<Box<dyn StreamCallback>>>,
    open: bool,
    running: bool,
}

struct MockState {
    host_apis: Vec<HostApiInfo>,
    devices: Vec<DeviceDescriptor>,
    default_host_api: HostApiId,
    initialize_error: Option<String>,
    open_error: Option<String>,
    start_error: Option<String>,
    calls: Vec<DriverCall>,
    streams: Vec<StreamRecord>,
}

/// Cloning yields another handle onto the same scripted driver.
#[derive(Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Two host APIs:
    ///
    /// - `Mock Host` (default): `Mock Microphone` (2 in), `Mock Speakers`
    ///   (2 out), `Mock Headset` (1 in, 1 out)
    /// - `Other Host`: a second `Mock Microphone` (1 in)
    pub fn new() -> Self {
        let primary = HostApiId(0);
        let other = HostApiId(1);
        let devices = vec![
            mock_device(primary, 0, 0, "Mock Microphone", 2, 0, 48000.0),
            mock_device(primary, 1, 1, "Mock Speakers", 0, 2, 48000.0),
            mock_device(primary, 2, 2, "Mock Headset", 1, 1, 44100.0),
            mock_device(other, 0, 3, "Mock Microphone", 1, 0, 44100.0),
        ];
        let host_apis = vec![
            HostApiInfo {
                id: primary,
                name: "Mock Host".into(),
                device_count: 3,
                default_input_device: Some(0),
                default_output_device: Some(1),
            },
            HostApiInfo {
                id: other,
                name: "Other Host".into(),
                device_count: 1,
                default_input_device: Some(3),
                default_output_device: None,
            },
        ];
        Self::with_devices(host_apis, devices, primary)
    }

    pub fn with_devices(
        host_apis: Vec<HostApiInfo>,
        devices: Vec<DeviceDescriptor>,
        default_host_api: HostApiId,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                host_apis,
                devices,
                default_host_api,
                initialize_error: None,
                open_error: None,
                start_error: None,
                calls: Vec::new(),
                streams: Vec::new(),
            })),
        }
    }

    pub fn fail_initialize(&self, message: &str) {
        self.state.lock().initialize_error = Some(message.to_string());
    }

    /// Every later `open_stream` fails until [`clear_failures`](Self::clear_failures).
    pub fn fail_open(&self, message: &str) {
        self.state.lock().open_error = Some(message.to_string());
    }

    pub fn fail_start(&self, message: &str) {
        self.state.lock().start_error = Some(message.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.initialize_error = None;
        state.open_error = None;
        state.start_error = None;
    }

    /// Replace the device list, as if hardware had been plugged in or removed.
    pub fn set_devices(&self, devices: Vec<DeviceDescriptor>) {
        self.state.lock().devices = devices;
    }

    pub fn device(&self, global_index: usize) -> Option<DeviceDescriptor> {
        self.state.lock().devices.get(global_index).cloned()
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    pub fn count_calls(&self, matches: impl Fn(&DriverCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| matches(call)).count()
    }

    pub fn open_count(&self) -> usize {
        self.count_calls(|call| matches!(call, DriverCall::Open(_)))
    }

    pub fn close_count(&self) -> usize {
        self.count_calls(|call| matches!(call, DriverCall::Close(_)))
    }

    /// Streams opened and not yet closed.
    pub fn open_streams(&self) -> usize {
        self.state.lock().streams.iter().filter(|s| s.open).count()
    }

    /// Id of the most recently opened stream.
    pub fn last_stream(&self) -> Option<usize> {
        self.state.lock().streams.len().checked_sub(1)
    }

    pub fn stream_parameters(&self, stream: usize) -> Option<StreamParameters> {
        self.state.lock().streams.get(stream).map(|s| s.params)
    }

    pub fn is_running(&self, stream: usize) -> bool {
        self.state
            .lock()
            .streams
            .get(stream)
            .map(|s| s.running)
            .unwrap_or(false)
    }

    /// Invoke a stream's callback with `input` and `output`, as the driver thread would.
    ///
    /// Works on closed streams too. Returns `None` for an unknown stream id.
    pub fn fire(&self, stream: usize, input: &[f32], output: &mut [f32]) -> Option<StreamSignal> {
        let (params, callback) = {
            let state = self.state.lock();
            let record = state.streams.get(stream)?;
            (record.params, Arc::clone(&record.callback))
        };
        let mut callback = callback.lock();
        Some(callback.on_audio_buffer(
            InputBuffer::new(input, params.input_channels()),
            OutputBuffer::new(output, params.output_channels()),
        ))
    }

    fn check_channels(
        devices: &[DeviceDescriptor],
        params: Option<ChannelParameters>,
        available: impl Fn(&DeviceDescriptor) -> u16,
    ) -> Result<(), DriverError> {
        let Some(params) = params else {
            return Ok(());
        };
        let device = devices
            .get(params.device)
            .ok_or(DriverError::InvalidDevice(params.device))?;
        if params.channel_count == 0 || params.channel_count > available(device) {
            return Err(DriverError::OpenStream(format!(
                "{} channels not supported by {}",
                params.channel_count, device.name
            )));
        }
        Ok(())
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDriver for MockDriver {
    type Stream = MockStream;

    fn initialize(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::Initialize);
        match &state.initialize_error {
            Some(message) => Err(DriverError::Initialize(message.clone())),
            None => Ok(()),
        }
    }

    fn terminate(&self) {
        self.state.lock().calls.push(DriverCall::Terminate);
    }

    fn host_apis(&self) -> Result<Vec<HostApiInfo>, DriverError> {
        Ok(self.state.lock().host_apis.clone())
    }

    fn default_host_api(&self) -> Result<HostApiId, DriverError> {
        Ok(self.state.lock().default_host_api)
    }

    fn devices(&self) -> Result<Vec<DeviceDescriptor>, DriverError> {
        Ok(self.state.lock().devices.clone())
    }

    fn open_stream(
        &self,
        params: &StreamParameters,
        callback: Box<dyn StreamCallback>,
    ) -> Result<MockStream, DriverError> {
        let mut state = self.state.lock();
        if let Some(message) = &state.open_error {
            return Err(DriverError::OpenStream(message.clone()));
        }
        if params.input.is_none() && params.output.is_none() {
            return Err(DriverError::OpenStream("stream has no direction".into()));
        }
        Self::check_channels(&state.devices, params.input, |d| d.max_input_channels)?;
        Self::check_channels(&state.devices, params.output, |d| d.max_output_channels)?;

        let id = state.streams.len();
        state.streams.push(StreamRecord {
            params: *params,
            callback: Arc::new(Mutex::new(callback)),
            open: true,
            running: false,
        });
        state.calls.push(DriverCall::Open(id));
        Ok(MockStream {
            id,
            state: Arc::clone(&self.state),
        })
    }
}

/// Handle returned by [`MockDriver::open_stream`].
pub struct MockStream {
    id: usize,
    state: Arc<Mutex<MockState>>,
}

impl MockStream {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl DriverStream for MockStream {
    fn start(&mut self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if let Some(message) = &state.start_error {
            return Err(DriverError::StartStream(message.clone()));
        }
        state.calls.push(DriverCall::Start(self.id));
        state.streams[self.id].running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::Stop(self.id));
        state.streams[self.id].running = false;
        Ok(())
    }

    fn close(self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::Close(self.id));
        let record = &mut state.streams[self.id];
        record.running = false;
        record.open = false;
        Ok(())
    }
}

fn mock_device(
    host_api: HostApiId,
    host_api_device_index: usize,
    global_device_index: usize,
    name: &str,
    inputs: u16,
    outputs: u16,
    sample_rate: f64,
) -> DeviceDescriptor {
    DeviceDescriptor {
        host_api,
        host_api_device_index,
        global_device_index,
        name: name.to_string(),
        max_input_channels: inputs,
        max_output_channels: outputs,
        default_sample_rate: sample_rate,
        default_low_input_latency: if inputs > 0 { 0.01 } else { 0.0 },
        default_low_output_latency: if outputs > 0 { 0.01 } else { 0.0 },
        default_high_input_latency: if inputs > 0 { 0.1 } else { 0.0 },
        default_high_output_latency: if outputs > 0 { 0.1 } else { 0.0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl StreamCallback for Echo {
        fn on_audio_buffer(&mut self, input: InputBuffer<'_>, mut output: OutputBuffer<'_>) -> StreamSignal {
            output.interleaved_mut().copy_from_slice(input.interleaved());
            StreamSignal::Continue
        }
    }

    fn duplex() -> StreamParameters {
        StreamParameters {
            input: Some(ChannelParameters {
                device: 2,
                channel_count: 1,
                suggested_latency: 0.01,
            }),
            output: Some(ChannelParameters {
                device: 2,
                channel_count: 1,
                suggested_latency: 0.01,
            }),
            sample_rate: 44100,
            frames_per_period: 4,
        }
    }

    #[test]
    fn records_stream_lifecycle() {
        let driver = MockDriver::new();
        let mut stream = driver.open_stream(&duplex(), Box::new(Echo)).unwrap();
        stream.start().unwrap();
        assert!(driver.is_running(0));
        stream.stop().unwrap();
        stream.close().unwrap();

        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::Open(0),
                DriverCall::Start(0),
                DriverCall::Stop(0),
                DriverCall::Close(0)
            ]
        );
        assert_eq!(driver.open_streams(), 0);
    }

    #[test]
    fn fire_runs_the_stored_callback() {
        let driver = MockDriver::new();
        let _stream = driver.open_stream(&duplex(), Box::new(Echo)).unwrap();
        let mut out = [0.0f32; 3];
        let signal = driver.fire(0, &[0.1, 0.2, 0.3], &mut out);
        assert_eq!(signal, Some(StreamSignal::Continue));
        assert_eq!(out, [0.1, 0.2, 0.3]);
        assert_eq!(driver.fire(7, &[], &mut []), None);
    }

    #[test]
    fn rejects_unsupported_channel_counts() {
        let driver = MockDriver::new();
        let mut params = duplex();
        params.output = None;
        params.input = Some(ChannelParameters {
            device: 1,
            channel_count: 1,
            suggested_latency: 0.0,
        });
        assert!(matches!(
            driver.open_stream(&params, Box::new(Echo)),
            Err(DriverError::OpenStream(_))
        ));
    }

    #[test]
    fn scripted_failures() {
        let driver = MockDriver::new();
        driver.fail_initialize("no backend");
        assert_eq!(
            driver.initialize(),
            Err(DriverError::Initialize("no backend".into()))
        );
        driver.fail_open("busy");
        assert!(driver.open_stream(&duplex(), Box::new(Echo)).is_err());
        driver.clear_failures();
        assert!(driver.open_stream(&duplex(), Box::new(Echo)).is_ok());
    }
}
