use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a host API (one native audio backend family) as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostApiId(pub u32);

impl fmt::Display for HostApiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host-api#{}", self.0)
    }
}

/// A host API available on this machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostApiInfo {
    pub id: HostApiId,
    pub name: String,
    pub device_count: usize,
    /// Global index of the host API's default input device.
    pub default_input_device: Option<usize>,
    /// Global index of the host API's default output device.
    pub default_output_device: Option<usize>,
}

impl fmt::Display for HostApiInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HostApiInfo(name: {}, id: {}, devices: {})",
            self.name, self.id, self.device_count
        )
    }
}

/// One physical or virtual device within one host API.
///
/// Immutable once enumerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub host_api: HostApiId,
    pub host_api_device_index: usize,
    pub global_device_index: usize,
    pub name: String,
    pub max_input_channels: u16,
    pub max_output_channels: u16,
    pub default_sample_rate: f64,
    pub default_low_input_latency: f64,
    pub default_low_output_latency: f64,
    pub default_high_input_latency: f64,
    pub default_high_output_latency: f64,
}

impl DeviceDescriptor {
    /// Whether the device can capture (microphone).
    pub fn is_input(&self) -> bool {
        self.max_input_channels > 0
    }

    /// Whether the device can play back (speaker).
    pub fn is_output(&self) -> bool {
        self.max_output_channels > 0
    }

    /// Capture capabilities as a game engine microphone API reports them.
    ///
    /// Drivers only expose a default rate, so min and max are both that rate.
    pub fn capabilities(&self) -> DeviceCapabilities {
        let rate = self.default_sample_rate.round() as u32;
        DeviceCapabilities {
            min_sample_rate: rate,
            max_sample_rate: rate,
            channel_count: self.max_input_channels,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeviceDescriptor(name: {}, hostApi: {}, host API device index: {}, global device index: {})",
            self.name, self.host_api, self.host_api_device_index, self.global_device_index
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    pub channel_count: u16,
}
