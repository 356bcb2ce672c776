use serde::{Deserialize, Serialize};

use super::device::{DeviceDescriptor, HostApiId};
use super::error::StreamError;

/// Frames exchanged with the driver per real-time callback unless configured otherwise.
pub const DEFAULT_FRAMES_PER_PERIOD: u32 = 1024;

/// Configuration of a capture stream, optionally monitored on an output device.
///
/// `loop_recording` and `output_amplification_factor` are live settings: they
/// can change on a running controller. Every other field is fixed for the
/// controller's lifetime and a change forces the controller to be rebuilt.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub device: DeviceDescriptor,
    pub monitor_device: Option<DeviceDescriptor>,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub frames_per_period: u32,
    pub buffer_length_secs: u32,
    pub loop_recording: bool,
    pub output_amplification_factor: f32,
}

impl StreamConfig {
    /// Capture every input channel of `device`.
    pub fn new(device: DeviceDescriptor, sample_rate: u32, buffer_length_secs: u32) -> Self {
        Self {
            channel_count: device.max_input_channels,
            device,
            monitor_device: None,
            sample_rate,
            frames_per_period: DEFAULT_FRAMES_PER_PERIOD,
            buffer_length_secs,
            loop_recording: true,
            output_amplification_factor: 1.0,
        }
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.channel_count == 0 {
            return Err(StreamError::InvalidArgument(format!(
                "no input channels in {}",
                self.device
            )));
        }
        validate_common(self.sample_rate, self.frames_per_period, self.buffer_length_secs)?;
        if !self.output_amplification_factor.is_finite() {
            return Err(StreamError::InvalidArgument(
                "output amplification factor must be finite".into(),
            ));
        }
        Ok(())
    }

    /// Samples per channel the ring buffer holds.
    pub fn capacity_frames(&self) -> usize {
        self.sample_rate as usize * self.buffer_length_secs as usize
    }

    /// Monitoring output is always mono; zero when no monitor device is attached.
    pub fn monitor_channel_count(&self) -> u16 {
        match &self.monitor_device {
            Some(device) if device.is_output() => 1,
            _ => 0,
        }
    }

    /// Whether `other` can be served by the controller built for `self`
    /// without tearing down its stream.
    pub fn is_compatible_with(&self, other: &StreamConfig) -> bool {
        // Whole descriptors: a re-enumeration can hand an index to another device.
        self.device == other.device
            && self.monitor_device == other.monitor_device
            && self.channel_count == other.channel_count
            && self.sample_rate == other.sample_rate
            && self.frames_per_period == other.frames_per_period
            && self.buffer_length_secs == other.buffer_length_secs
    }
}

/// Configuration of a playback stream.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    pub device: DeviceDescriptor,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub frames_per_period: u32,
    pub buffer_length_secs: u32,
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.channel_count == 0 {
            return Err(StreamError::InvalidArgument(
                "output channel count cannot be zero".into(),
            ));
        }
        validate_common(self.sample_rate, self.frames_per_period, self.buffer_length_secs)
    }

    /// Length of the scratch buffer handed to the sample producer.
    pub fn period_samples(&self) -> usize {
        self.frames_per_period as usize * self.channel_count as usize
    }

    pub fn is_compatible_with(&self, other: &PlaybackConfig) -> bool {
        self.device == other.device
            && self.channel_count == other.channel_count
            && self.sample_rate == other.sample_rate
            && self.frames_per_period == other.frames_per_period
            && self.buffer_length_secs == other.buffer_length_secs
    }
}

fn validate_common(
    sample_rate: u32,
    frames_per_period: u32,
    buffer_length_secs: u32,
) -> Result<(), StreamError> {
    if sample_rate == 0 {
        return Err(StreamError::InvalidArgument(
            "sample rate cannot be zero".into(),
        ));
    }
    if frames_per_period == 0 {
        return Err(StreamError::InvalidArgument(
            "frames per period cannot be zero".into(),
        ));
    }
    if buffer_length_secs == 0 {
        return Err(StreamError::InvalidArgument(
            "buffer length cannot be zero".into(),
        ));
    }
    Ok(())
}

/// Settings of an [`AudioSubsystem`](crate::session::subsystem::AudioSubsystem).
///
/// Deserializable so the integration shell can hand settings over as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsystemConfig {
    /// Frames per real-time callback for streams opened from now on.
    pub frames_per_period: u32,

    /// Host API used to resolve device names, or `None` for the driver default.
    pub host_api: Option<HostApiId>,
}

impl SubsystemConfig {
    pub fn from_json(json: &str) -> Result<Self, StreamError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StreamError::InvalidArgument(format!("subsystem config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.frames_per_period == 0 {
            return Err(StreamError::InvalidArgument(
                "frames per period cannot be zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SubsystemConfig {
    fn default() -> Self {
        Self {
            frames_per_period: DEFAULT_FRAMES_PER_PERIOD,
            host_api: None,
        }
    }
}
