//! [`AudioDriver`] over cpal.
//!
//! Every cpal host becomes a host API, numbered in `cpal::available_hosts()`
//! order. Devices are numbered globally across hosts.
//!
//! cpal opens one stream per direction, so a stream with both input and
//! output (capture with live monitoring) becomes two cpal streams joined by a
//! lock-free SPSC ring: the input callback runs the engine callback and
//! pushes the monitor signal, the output callback drains it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use audio_stream_core::models::device::{DeviceDescriptor, HostApiId, HostApiInfo};
use audio_stream_core::models::error::DriverError;
use audio_stream_core::processing::buffer_view::{InputBuffer, OutputBuffer};
use audio_stream_core::traits::driver::{
    AudioDriver, ChannelParameters, DriverStream, StreamCallback, StreamParameters, StreamSignal,
};

/// Periods of monitor audio the input-to-output bridge can hold.
const MONITOR_BRIDGE_PERIODS: usize = 8;

struct Enumeration {
    host_apis: Vec<HostApiInfo>,
    devices: Vec<DeviceDescriptor>,
    handles: Vec<cpal::Device>,
}

/// cpal-backed driver. Device handles from the latest enumeration are kept
/// so streams open on exactly the devices the caller was shown.
pub struct CpalDriver {
    enumeration: Mutex<Option<Enumeration>>,
}

impl CpalDriver {
    pub fn new() -> Self {
        Self {
            enumeration: Mutex::new(None),
        }
    }

    fn refresh(&self) -> Result<(), DriverError> {
        let enumeration = enumerate()?;
        *self.enumeration.lock() = Some(enumeration);
        Ok(())
    }

    fn device(&self, global_index: usize) -> Result<cpal::Device, DriverError> {
        self.enumeration
            .lock()
            .as_ref()
            .and_then(|e| e.handles.get(global_index).cloned())
            .ok_or(DriverError::InvalidDevice(global_index))
    }
}

impl Default for CpalDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDriver for CpalDriver {
    type Stream = CpalStream;

    fn initialize(&self) -> Result<(), DriverError> {
        if cpal::available_hosts().is_empty() {
            return Err(DriverError::Initialize("no audio host available".into()));
        }
        self.refresh()
            .map_err(|e| DriverError::Initialize(e.to_string()))
    }

    fn terminate(&self) {
        *self.enumeration.lock() = None;
    }

    fn host_apis(&self) -> Result<Vec<HostApiInfo>, DriverError> {
        self.refresh()?;
        Ok(self
            .enumeration
            .lock()
            .as_ref()
            .map(|e| e.host_apis.clone())
            .unwrap_or_default())
    }

    fn default_host_api(&self) -> Result<HostApiId, DriverError> {
        let default = cpal::default_host().id();
        let position = cpal::available_hosts()
            .iter()
            .position(|id| *id == default)
            .unwrap_or(0);
        Ok(HostApiId(position as u32))
    }

    fn devices(&self) -> Result<Vec<DeviceDescriptor>, DriverError> {
        self.refresh()?;
        Ok(self
            .enumeration
            .lock()
            .as_ref()
            .map(|e| e.devices.clone())
            .unwrap_or_default())
    }

    fn open_stream(
        &self,
        params: &StreamParameters,
        callback: Box<dyn StreamCallback>,
    ) -> Result<CpalStream, DriverError> {
        let finished = Arc::new(AtomicBool::new(false));
        let streams = match (params.input, params.output) {
            (Some(input), None) => {
                let device = self.device(input.device)?;
                vec![build_capture(&device, input, params, callback, None, &finished)?]
            }
            (None, Some(output)) => {
                let device = self.device(output.device)?;
                vec![build_playback(&device, output, params, callback, &finished)?]
            }
            (Some(input), Some(output)) => {
                let input_device = self.device(input.device)?;
                let output_device = self.device(output.device)?;
                let capacity = (params.frames_per_period as usize
                    * output.channel_count as usize
                    * MONITOR_BRIDGE_PERIODS)
                    .max(4096);
                let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
                let bridge = MonitorBridge {
                    producer,
                    scratch: vec![0.0; params.frames_per_period as usize * output.channel_count as usize],
                    channels: output.channel_count as usize,
                };
                let monitor = build_monitor(&output_device, output, params, consumer)?;
                let capture = build_capture(&input_device, input, params, callback, Some(bridge), &finished)?;
                vec![monitor, capture]
            }
            (None, None) => {
                return Err(DriverError::OpenStream("stream has no direction".into()));
            }
        };

        Ok(CpalStream { streams, finished })
    }
}

/// One engine stream: one cpal stream, or two for capture with monitoring.
pub struct CpalStream {
    streams: Vec<cpal::Stream>,
    finished: Arc<AtomicBool>,
}

impl CpalStream {
    /// Whether the engine callback returned `Complete` or `Abort` (or panicked).
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl DriverStream for CpalStream {
    fn start(&mut self) -> Result<(), DriverError> {
        // Monitor output first so the bridge is drained from the first period.
        for stream in &self.streams {
            stream
                .play()
                .map_err(|e| DriverError::StartStream(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        self.finished.store(true, Ordering::Release);
        let mut first_error = None;
        for stream in self.streams.iter().rev() {
            if let Err(e) = stream.pause() {
                first_error.get_or_insert(DriverError::StopStream(e.to_string()));
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn close(self) -> Result<(), DriverError> {
        // Dropping a cpal stream joins or detaches its callback thread.
        drop(self.streams);
        Ok(())
    }
}

struct MonitorBridge {
    producer: HeapProd<f32>,
    scratch: Vec<f32>,
    channels: usize,
}

impl MonitorBridge {
    /// Run the engine callback over `data` in period-sized chunks, pushing
    /// what it writes to the monitor output.
    fn process(&mut self, callback: &mut dyn StreamCallback, data: &[f32], input_channels: usize) -> StreamSignal {
        let frames_per_chunk = (self.scratch.len() / self.channels).max(1);
        let mut signal = StreamSignal::Continue;
        for chunk in data.chunks(frames_per_chunk * input_channels) {
            let frames = chunk.len() / input_channels;
            let out = &mut self.scratch[..frames * self.channels];
            out.fill(0.0);
            signal = callback.on_audio_buffer(
                InputBuffer::new(chunk, input_channels),
                OutputBuffer::new(out, self.channels),
            );
            // A full bridge means the output side stalled; drop the overflow.
            self.producer.push_slice(out);
            if signal != StreamSignal::Continue {
                break;
            }
        }
        signal
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Input,
    Output,
}

fn stream_config(device: &cpal::Device, side: Side, channels: u16, params: &StreamParameters) -> cpal::StreamConfig {
    let ranges = match side {
        Side::Input => device.supported_input_configs().map(|c| c.collect::<Vec<_>>()),
        Side::Output => device.supported_output_configs().map(|c| c.collect::<Vec<_>>()),
    }
    .unwrap_or_default();

    let buffer_size = buffer_size_for(&ranges, channels, params);
    if buffer_size == cpal::BufferSize::Default {
        log::debug!(
            "{} frames per period not supported by {} ({:?}), using the host default",
            params.frames_per_period,
            device_label(device),
            side
        );
    }
    cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(params.sample_rate),
        buffer_size,
    }
}

/// A fixed period of `frames_per_period` when some supported config with
/// matching channels and rate allows it, else the host default.
fn buffer_size_for(
    ranges: &[cpal::SupportedStreamConfigRange],
    channels: u16,
    params: &StreamParameters,
) -> cpal::BufferSize {
    let frames = params.frames_per_period;
    let fits = ranges.iter().any(|range| {
        range.channels() == channels
            && (range.min_sample_rate().0..=range.max_sample_rate().0).contains(&params.sample_rate)
            && matches!(
                range.buffer_size(),
                cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames)
            )
    });
    if fits {
        cpal::BufferSize::Fixed(frames)
    } else {
        cpal::BufferSize::Default
    }
}

fn device_label(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "unknown device".into())
}

fn build_capture(
    device: &cpal::Device,
    input: ChannelParameters,
    params: &StreamParameters,
    mut callback: Box<dyn StreamCallback>,
    mut monitor: Option<MonitorBridge>,
    finished: &Arc<AtomicBool>,
) -> Result<cpal::Stream, DriverError> {
    let channels = input.channel_count as usize;
    let finished = Arc::clone(finished);
    let label = device_label(device);

    device
        .build_input_stream(
            &stream_config(device, Side::Input, input.channel_count, params),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if finished.load(Ordering::Acquire) {
                    return;
                }
                let result = panic::catch_unwind(AssertUnwindSafe(|| match monitor.as_mut() {
                    Some(bridge) => bridge.process(callback.as_mut(), data, channels),
                    None => callback.on_audio_buffer(InputBuffer::new(data, channels), OutputBuffer::empty()),
                }));
                if result.unwrap_or(StreamSignal::Abort) != StreamSignal::Continue {
                    finished.store(true, Ordering::Release);
                }
            },
            move |err| log::warn!("Input stream error on {}: {}", label, err),
            None,
        )
        .map_err(|e| DriverError::OpenStream(e.to_string()))
}

fn build_playback(
    device: &cpal::Device,
    output: ChannelParameters,
    params: &StreamParameters,
    mut callback: Box<dyn StreamCallback>,
    finished: &Arc<AtomicBool>,
) -> Result<cpal::Stream, DriverError> {
    let channels = output.channel_count as usize;
    let finished = Arc::clone(finished);
    let label = device_label(device);

    device
        .build_output_stream(
            &stream_config(device, Side::Output, output.channel_count, params),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if finished.load(Ordering::Acquire) {
                    data.fill(0.0);
                    return;
                }
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    callback.on_audio_buffer(InputBuffer::empty(), OutputBuffer::new(data, channels))
                }));
                match result {
                    Ok(StreamSignal::Continue) => {}
                    Ok(_) => finished.store(true, Ordering::Release),
                    Err(_) => {
                        // Panic in callback: output silence from here on.
                        data.fill(0.0);
                        finished.store(true, Ordering::Release);
                    }
                }
            },
            move |err| log::warn!("Output stream error on {}: {}", label, err),
            None,
        )
        .map_err(|e| DriverError::OpenStream(e.to_string()))
}

fn build_monitor(
    device: &cpal::Device,
    output: ChannelParameters,
    params: &StreamParameters,
    mut consumer: HeapCons<f32>,
) -> Result<cpal::Stream, DriverError> {
    let label = device_label(device);

    device
        .build_output_stream(
            &stream_config(device, Side::Output, output.channel_count, params),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let read = consumer.pop_slice(data);
                data[read..].fill(0.0);
            },
            move |err| log::warn!("Monitor stream error on {}: {}", label, err),
            None,
        )
        .map_err(|e| DriverError::OpenStream(e.to_string()))
}

fn enumerate() -> Result<Enumeration, DriverError> {
    let mut host_apis = Vec::new();
    let mut devices = Vec::new();
    let mut handles = Vec::new();

    for (position, host_id) in cpal::available_hosts().into_iter().enumerate() {
        let id = HostApiId(position as u32);
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                log::warn!("Skipping host {}: {}", host_id.name(), e);
                continue;
            }
        };

        let default_input = host.default_input_device().and_then(|d| d.name().ok());
        let default_output = host.default_output_device().and_then(|d| d.name().ok());
        let mut info = HostApiInfo {
            id,
            name: host_id.name().to_string(),
            device_count: 0,
            default_input_device: None,
            default_output_device: None,
        };

        let host_devices = host
            .devices()
            .map_err(|e| DriverError::Enumeration(format!("{}: {}", host_id.name(), e)))?;
        for (host_index, device) in host_devices.enumerate() {
            let descriptor = describe(&device, id, host_index, devices.len());
            if info.default_input_device.is_none()
                && descriptor.is_input()
                && default_input.as_deref() == Some(descriptor.name.as_str())
            {
                info.default_input_device = Some(descriptor.global_device_index);
            }
            if info.default_output_device.is_none()
                && descriptor.is_output()
                && default_output.as_deref() == Some(descriptor.name.as_str())
            {
                info.default_output_device = Some(descriptor.global_device_index);
            }
            info.device_count += 1;
            devices.push(descriptor);
            handles.push(device);
        }
        host_apis.push(info);
    }

    log::debug!("cpal reports {} hosts, {} devices", host_apis.len(), devices.len());
    Ok(Enumeration {
        host_apis,
        devices,
        handles,
    })
}

fn describe(device: &cpal::Device, host_api: HostApiId, host_index: usize, global_index: usize) -> DeviceDescriptor {
    let max_input_channels = device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let max_output_channels = device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let input_default = device.default_input_config().ok();
    let output_default = device.default_output_config().ok();

    let default_sample_rate = input_default
        .as_ref()
        .or(output_default.as_ref())
        .map(|c| c.sample_rate().0 as f64)
        .unwrap_or(0.0);
    let (low_input, high_input) = latency_range(input_default.as_ref());
    let (low_output, high_output) = latency_range(output_default.as_ref());

    DeviceDescriptor {
        host_api,
        host_api_device_index: host_index,
        global_device_index: global_index,
        name: device
            .name()
            .unwrap_or_else(|_| format!("Device {}", global_index)),
        max_input_channels,
        max_output_channels,
        default_sample_rate,
        default_low_input_latency: low_input,
        default_low_output_latency: low_output,
        default_high_input_latency: high_input,
        default_high_output_latency: high_output,
    }
}

/// Latency bounds in seconds from the buffer sizes a config supports.
fn latency_range(config: Option<&cpal::SupportedStreamConfig>) -> (f64, f64) {
    let Some(config) = config else {
        return (0.0, 0.0);
    };
    let rate = config.sample_rate().0 as f64;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } if rate > 0.0 => {
            (*min as f64 / rate, (*max as f64 / rate).min(1.0))
        }
        _ => (0.0, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    impl StreamCallback for Doubler {
        fn on_audio_buffer(&mut self, input: InputBuffer<'_>, mut output: OutputBuffer<'_>) -> StreamSignal {
            for (out, frame) in output.frames_mut().zip(input.frames()) {
                out.fill(frame[0] * 2.0);
            }
            StreamSignal::Continue
        }
    }

    struct StopAfterFirst;

    impl StreamCallback for StopAfterFirst {
        fn on_audio_buffer(&mut self, _input: InputBuffer<'_>, _output: OutputBuffer<'_>) -> StreamSignal {
            StreamSignal::Complete
        }
    }

    fn bridge(frames: usize, channels: usize) -> (MonitorBridge, HeapCons<f32>) {
        let (producer, consumer) = HeapRb::<f32>::new(64).split();
        (
            MonitorBridge {
                producer,
                scratch: vec![0.0; frames * channels],
                channels,
            },
            consumer,
        )
    }

    #[test]
    fn bridge_forwards_monitor_output() {
        let (mut bridge, mut consumer) = bridge(2, 1);
        let signal = bridge.process(&mut Doubler, &[0.1, 0.2, 0.3], 1);
        assert_eq!(signal, StreamSignal::Continue);

        let mut out = [0.0f32; 4];
        assert_eq!(consumer.pop_slice(&mut out), 3);
        assert_eq!(&out[..3], &[0.2, 0.4, 0.6]);
    }

    #[test]
    fn bridge_stops_at_the_first_non_continue() {
        let (mut bridge, mut consumer) = bridge(1, 1);
        let signal = bridge.process(&mut StopAfterFirst, &[0.1, 0.2, 0.3], 1);
        assert_eq!(signal, StreamSignal::Complete);

        let mut out = [0.0f32; 4];
        assert_eq!(consumer.pop_slice(&mut out), 1);
    }

    fn range(channels: u16, buffer: cpal::SupportedBufferSize) -> cpal::SupportedStreamConfigRange {
        cpal::SupportedStreamConfigRange::new(
            channels,
            cpal::SampleRate(44100),
            cpal::SampleRate(48000),
            buffer,
            cpal::SampleFormat::F32,
        )
    }

    fn params(frames_per_period: u32, sample_rate: u32) -> StreamParameters {
        StreamParameters {
            input: None,
            output: None,
            sample_rate,
            frames_per_period,
        }
    }

    #[test]
    fn period_is_fixed_when_a_range_allows_it() {
        let ranges = [
            range(1, cpal::SupportedBufferSize::Range { min: 64, max: 128 }),
            range(2, cpal::SupportedBufferSize::Range { min: 128, max: 2048 }),
        ];
        assert_eq!(buffer_size_for(&ranges, 2, &params(256, 48000)), cpal::BufferSize::Fixed(256));
        assert_eq!(buffer_size_for(&ranges, 1, &params(64, 44100)), cpal::BufferSize::Fixed(64));
    }

    #[test]
    fn period_falls_back_to_the_host_default() {
        let ranges = [
            range(2, cpal::SupportedBufferSize::Range { min: 128, max: 2048 }),
            range(1, cpal::SupportedBufferSize::Unknown),
        ];
        // Outside the range, wrong channel count, unsupported rate, unknown sizes.
        assert_eq!(buffer_size_for(&ranges, 2, &params(4096, 48000)), cpal::BufferSize::Default);
        assert_eq!(buffer_size_for(&ranges, 6, &params(256, 48000)), cpal::BufferSize::Default);
        assert_eq!(buffer_size_for(&ranges, 2, &params(256, 96000)), cpal::BufferSize::Default);
        assert_eq!(buffer_size_for(&ranges, 1, &params(256, 48000)), cpal::BufferSize::Default);
        assert_eq!(buffer_size_for(&[], 2, &params(256, 48000)), cpal::BufferSize::Default);
    }

    #[test]
    fn latency_without_config_is_zero() {
        assert_eq!(latency_range(None), (0.0, 0.0));
    }
}
