use std::collections::HashMap;
use std::sync::Arc;

use crate::models::config::{PlaybackConfig, StreamConfig, SubsystemConfig};
use crate::models::device::{DeviceCapabilities, DeviceDescriptor, HostApiId, HostApiInfo};
use crate::models::error::{DriverError, StreamError};
use crate::session::thread_guard::ThreadGuard;
use crate::stream::input::InputStreamController;
use crate::stream::output::OutputStreamController;
use crate::traits::audio_stream::AudioStream;
use crate::traits::driver::AudioDriver;
use crate::traits::sample_producer::SampleProducer;

#[derive(Debug, Clone, PartialEq, Eq)]
enum InitState {
    Pending,
    Ready,
    Failed(String),
    ShutDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Input,
    Output,
}

impl Direction {
    fn accepts(self, device: &DeviceDescriptor) -> bool {
        match self {
            Direction::Input => device.is_input(),
            Direction::Output => device.is_output(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Entry point for an embedding application: device discovery plus at most
/// one capture and one playback controller per device.
///
/// Owns the driver's global lifetime. The driver is initialized on the first
/// operation that needs it; if that fails the subsystem is unusable and every
/// later operation returns the same [`StreamError::InitializationFailure`]
/// without retrying. [`shutdown`](Self::shutdown), or dropping the
/// subsystem, disposes every controller and terminates the driver.
///
/// Pinned to the thread that created it: calls from any other thread fail
/// with [`StreamError::ThreadViolation`].
///
/// Devices are addressed by name within the selected host API, which
/// defaults to the driver's default host API.
pub struct AudioSubsystem<D: AudioDriver> {
    driver: Arc<D>,
    config: SubsystemConfig,
    guard: ThreadGuard,
    init: InitState,
    enumerated: bool,
    host_apis: Vec<HostApiInfo>,
    devices: Vec<DeviceDescriptor>,
    default_host_api: HostApiId,
    inputs: HashMap<usize, InputStreamController<D>>,
    outputs: HashMap<usize, OutputStreamController<D>>,
}

impl<D: AudioDriver> AudioSubsystem<D> {
    pub fn create(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
            config: SubsystemConfig::default(),
            guard: ThreadGuard::current(),
            init: InitState::Pending,
            enumerated: false,
            host_apis: Vec::new(),
            devices: Vec::new(),
            default_host_api: HostApiId(0),
            inputs: HashMap::new(),
            outputs: HashMap::new(),
        }
    }

    pub fn with_config(driver: D, config: SubsystemConfig) -> Result<Self, StreamError> {
        config.validate()?;
        let mut subsystem = Self::create(driver);
        subsystem.config = config;
        Ok(subsystem)
    }

    // -- Lifecycle --

    fn ready(&mut self) -> Result<(), StreamError> {
        self.guard.check()?;
        match &self.init {
            InitState::Ready => return Ok(()),
            InitState::Failed(message) => {
                return Err(StreamError::InitializationFailure(message.clone()))
            }
            InitState::ShutDown => {
                return Err(StreamError::InitializationFailure(
                    "audio subsystem has been shut down".into(),
                ))
            }
            InitState::Pending => {}
        }

        match self.driver.initialize() {
            Ok(()) => {
                log::info!("Audio driver initialized");
                self.init = InitState::Ready;
                Ok(())
            }
            Err(e) => {
                let message = match e {
                    DriverError::Initialize(message) => message,
                    other => other.to_string(),
                };
                log::error!("Audio driver initialization failed: {}", message);
                self.init = InitState::Failed(message.clone());
                Err(StreamError::InitializationFailure(message))
            }
        }
    }

    fn enumerate(&mut self) -> Result<(), StreamError> {
        self.ready()?;
        if !self.enumerated {
            self.load_devices()?;
        }
        Ok(())
    }

    fn load_devices(&mut self) -> Result<(), StreamError> {
        self.host_apis = self.driver.host_apis()?;
        self.devices = self.driver.devices()?;
        self.default_host_api = self.driver.default_host_api()?;
        self.enumerated = true;
        log::debug!(
            "Enumerated {} host APIs and {} devices",
            self.host_apis.len(),
            self.devices.len()
        );
        Ok(())
    }

    /// Dispose every controller and release the driver. Later operations
    /// fail with [`StreamError::InitializationFailure`].
    pub fn shutdown(&mut self) -> Result<(), StreamError> {
        self.guard.check()?;
        let disposed = self.dispose_all();
        self.terminate();
        disposed
    }

    fn terminate(&mut self) {
        // Controllers close their streams before the driver goes away.
        self.inputs.clear();
        self.outputs.clear();
        if self.init == InitState::Ready {
            self.driver.terminate();
            log::info!("Audio driver terminated");
        }
        self.init = InitState::ShutDown;
    }

    /// Stop and dispose every controller. Safe to call repeatedly.
    pub fn dispose_all(&mut self) -> Result<(), StreamError> {
        self.guard.check()?;
        let mut first_error = None;
        for (_, mut input) in self.inputs.drain() {
            if let Err(e) = input.dispose() {
                log::warn!("Disposing capture on {}: {}", input.config().device, e);
                first_error.get_or_insert(e);
            }
        }
        for (_, mut output) in self.outputs.drain() {
            if let Err(e) = output.dispose() {
                log::warn!("Disposing playback on {}: {}", output.config().device, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // -- Configuration --

    pub fn frames_per_period(&self) -> Result<u32, StreamError> {
        self.guard.check()?;
        Ok(self.config.frames_per_period)
    }

    /// Applies to streams created from now on.
    pub fn set_frames_per_period(&mut self, frames: u32) -> Result<(), StreamError> {
        self.guard.check()?;
        if frames == 0 {
            return Err(StreamError::InvalidArgument(
                "frames per period cannot be zero".into(),
            ));
        }
        self.config.frames_per_period = frames;
        Ok(())
    }

    // -- Discovery --

    pub fn host_apis(&mut self) -> Result<Vec<HostApiInfo>, StreamError> {
        self.enumerate()?;
        Ok(self.host_apis.clone())
    }

    pub fn host_api_info(&mut self, id: HostApiId) -> Result<Option<HostApiInfo>, StreamError> {
        self.enumerate()?;
        Ok(self.host_apis.iter().find(|api| api.id == id).cloned())
    }

    pub fn default_host_api(&mut self) -> Result<HostApiInfo, StreamError> {
        self.enumerate()?;
        let id = self.default_host_api;
        self.host_api_info(id)?
            .ok_or_else(|| StreamError::DeviceUnavailable(format!("default {} not enumerated", id)))
    }

    /// The host API device names are resolved in.
    pub fn host_api(&mut self) -> Result<HostApiInfo, StreamError> {
        self.enumerate()?;
        let id = self.selected_host_api();
        self.host_api_info(id)?
            .ok_or_else(|| StreamError::DeviceUnavailable(format!("{} not enumerated", id)))
    }

    pub fn set_host_api(&mut self, id: HostApiId) -> Result<(), StreamError> {
        let info = self
            .host_api_info(id)?
            .ok_or_else(|| StreamError::InvalidArgument(format!("unknown {}", id)))?;
        log::info!("Selected {}", info);
        self.config.host_api = Some(id);
        Ok(())
    }

    fn selected_host_api(&self) -> HostApiId {
        self.config.host_api.unwrap_or(self.default_host_api)
    }

    /// Every device of every host API.
    pub fn devices(&mut self) -> Result<Vec<DeviceDescriptor>, StreamError> {
        self.enumerate()?;
        Ok(self.devices.clone())
    }

    pub fn list_devices(&mut self, host_api: HostApiId) -> Result<Vec<DeviceDescriptor>, StreamError> {
        self.enumerate()?;
        Ok(self
            .devices
            .iter()
            .filter(|d| d.host_api == host_api)
            .cloned()
            .collect())
    }

    /// Names of the capture devices in the selected host API.
    pub fn input_device_names(&mut self) -> Result<Vec<String>, StreamError> {
        self.device_names(Direction::Input)
    }

    /// Names of the playback devices in the selected host API.
    pub fn output_device_names(&mut self) -> Result<Vec<String>, StreamError> {
        self.device_names(Direction::Output)
    }

    fn device_names(&mut self, direction: Direction) -> Result<Vec<String>, StreamError> {
        self.enumerate()?;
        let host_api = self.selected_host_api();
        Ok(self
            .devices
            .iter()
            .filter(|d| d.host_api == host_api && direction.accepts(d))
            .map(|d| d.name.clone())
            .collect())
    }

    pub fn device_info(&mut self, global_index: usize) -> Result<Option<DeviceDescriptor>, StreamError> {
        self.enumerate()?;
        Ok(self
            .devices
            .iter()
            .find(|d| d.global_device_index == global_index)
            .cloned())
    }

    /// First device called `name` in the selected host API.
    pub fn find_device(&mut self, name: &str) -> Result<Option<DeviceDescriptor>, StreamError> {
        self.enumerate()?;
        let host_api = self.selected_host_api();
        Ok(self
            .devices
            .iter()
            .find(|d| d.host_api == host_api && d.name == name)
            .cloned())
    }

    pub fn default_input_device(&mut self) -> Result<Option<DeviceDescriptor>, StreamError> {
        let index = self.host_api()?.default_input_device;
        Ok(index.and_then(|i| self.cached_device(i)))
    }

    pub fn default_output_device(&mut self) -> Result<Option<DeviceDescriptor>, StreamError> {
        let index = self.host_api()?.default_output_device;
        Ok(index.and_then(|i| self.cached_device(i)))
    }

    pub fn device_caps(&mut self, name: &str) -> Result<DeviceCapabilities, StreamError> {
        Ok(self.resolve(name, Direction::Input)?.capabilities())
    }

    /// Enumerate again, picking up hot-plugged devices. Running streams keep
    /// the descriptors they were created with.
    pub fn refresh_devices(&mut self) -> Result<(), StreamError> {
        self.ready()?;
        self.load_devices()
    }

    fn cached_device(&self, global_index: usize) -> Option<DeviceDescriptor> {
        self.devices
            .iter()
            .find(|d| d.global_device_index == global_index)
            .cloned()
    }

    fn lookup(&self, name: &str, direction: Direction) -> Option<DeviceDescriptor> {
        let host_api = self.selected_host_api();
        self.devices
            .iter()
            .find(|d| d.host_api == host_api && d.name == name && direction.accepts(d))
            .cloned()
    }

    fn resolve(&mut self, name: &str, direction: Direction) -> Result<DeviceDescriptor, StreamError> {
        self.enumerate()?;
        self.lookup(name, direction).ok_or_else(|| {
            StreamError::DeviceUnavailable(format!(
                "no {} device named {:?} in {}",
                direction.label(),
                name,
                self.selected_host_api()
            ))
        })
    }

    // -- Recording --

    /// Record every input channel of `device`, optionally monitoring it live
    /// in mono on `monitor_device`.
    ///
    /// A monitor device that cannot be found is skipped with a warning.
    pub fn start_recording(
        &mut self,
        device: &str,
        loop_recording: bool,
        buffer_length_secs: u32,
        sample_rate: u32,
        monitor_device: Option<&str>,
        amplification: f32,
    ) -> Result<(), StreamError> {
        let device = self.resolve(device, Direction::Input)?;
        let monitor = monitor_device.and_then(|name| {
            let found = self.lookup(name, Direction::Output);
            if found.is_none() {
                log::warn!(
                    "Monitor device {:?} not found in {}, recording without monitoring",
                    name,
                    self.selected_host_api()
                );
            }
            found
        });

        let mut config = StreamConfig::new(device, sample_rate, buffer_length_secs);
        config.monitor_device = monitor;
        config.frames_per_period = self.config.frames_per_period;
        config.loop_recording = loop_recording;
        config.output_amplification_factor = amplification;
        self.start_recording_with(config)
    }

    /// Start (or keep) capture with an explicit configuration.
    ///
    /// A controller already registered for the device is restarted in place
    /// when only live settings differ, and rebuilt otherwise. When starting
    /// fails no controller is left registered for the device.
    pub fn start_recording_with(&mut self, config: StreamConfig) -> Result<(), StreamError> {
        self.ready()?;
        config.validate()?;
        let key = config.device.global_device_index;

        if let Some(existing) = self.inputs.get_mut(&key) {
            if existing.config().is_compatible_with(&config) {
                log::debug!("Reusing capture controller for {}", config.device);
                let restarted = existing
                    .set_loop(config.loop_recording)
                    .and_then(|_| existing.set_amplification(config.output_amplification_factor))
                    .and_then(|_| existing.start());
                if restarted.is_err() {
                    self.inputs.remove(&key);
                }
                return restarted;
            }
            log::info!("Capture settings changed for {}, recreating stream", config.device);
            if let Some(mut previous) = self.inputs.remove(&key) {
                previous.dispose()?;
            }
        }

        let mut controller = InputStreamController::new(Arc::clone(&self.driver), config)?;
        controller.start()?;
        self.inputs.insert(key, controller);
        Ok(())
    }

    /// No-op when nothing is recording on `device`.
    pub fn stop_recording(&mut self, device: &str) -> Result<(), StreamError> {
        let key = self.resolve(device, Direction::Input)?.global_device_index;
        match self.inputs.get_mut(&key) {
            Some(input) => input.stop(),
            None => Ok(()),
        }
    }

    pub fn is_recording(&mut self, device: &str) -> Result<bool, StreamError> {
        Ok(self.input(device)?.is_some_and(|input| input.is_recording()))
    }

    /// Write position in frames, 0 when nothing was recorded on `device`.
    pub fn position(&mut self, device: &str) -> Result<usize, StreamError> {
        Ok(self.input(device)?.map_or(0, |input| input.position()))
    }

    /// Latest samples of one channel, oldest first. `destination` is left
    /// untouched when nothing was recorded on `device`.
    pub fn recorded_samples(
        &mut self,
        device: &str,
        channel: usize,
        destination: &mut [f32],
    ) -> Result<(), StreamError> {
        match self.input(device)? {
            Some(input) => input.recorded_samples(channel, destination),
            None => Ok(()),
        }
    }

    /// Latest interleaved samples of every channel, oldest first.
    pub fn all_recorded_samples(&mut self, device: &str, destination: &mut [f32]) -> Result<(), StreamError> {
        match self.input(device)? {
            Some(input) => input.all_recorded_samples(destination),
            None => Ok(()),
        }
    }

    pub fn set_amplification(&mut self, device: &str, factor: f32) -> Result<(), StreamError> {
        let key = self.resolve(device, Direction::Input)?.global_device_index;
        match self.inputs.get_mut(&key) {
            Some(input) => input.set_amplification(factor),
            None => Ok(()),
        }
    }

    fn input(&mut self, device: &str) -> Result<Option<&InputStreamController<D>>, StreamError> {
        let key = self.resolve(device, Direction::Input)?.global_device_index;
        Ok(self.inputs.get(&key))
    }

    // -- Playback --

    /// Play what `producer` generates on `device`.
    pub fn start_playback(
        &mut self,
        device: &str,
        channel_count: u16,
        buffer_length_secs: u32,
        sample_rate: u32,
        producer: SampleProducer,
    ) -> Result<(), StreamError> {
        let device = self.resolve(device, Direction::Output)?;
        let config = PlaybackConfig {
            device,
            channel_count,
            sample_rate,
            frames_per_period: self.config.frames_per_period,
            buffer_length_secs,
        };
        self.start_playback_with(config, producer)
    }

    /// Like [`start_recording_with`](Self::start_recording_with); a different
    /// producer also forces a rebuild.
    pub fn start_playback_with(&mut self, config: PlaybackConfig, producer: SampleProducer) -> Result<(), StreamError> {
        self.ready()?;
        config.validate()?;
        let key = config.device.global_device_index;

        if let Some(existing) = self.outputs.get_mut(&key) {
            if existing.config().is_compatible_with(&config) && Arc::ptr_eq(existing.producer(), &producer) {
                log::debug!("Reusing playback controller for {}", config.device);
                let restarted = existing.start();
                if restarted.is_err() {
                    self.outputs.remove(&key);
                }
                return restarted;
            }
            log::info!("Playback settings changed for {}, recreating stream", config.device);
            if let Some(mut previous) = self.outputs.remove(&key) {
                previous.dispose()?;
            }
        }

        let mut controller = OutputStreamController::new(Arc::clone(&self.driver), config, producer)?;
        controller.start()?;
        self.outputs.insert(key, controller);
        Ok(())
    }

    pub fn stop_playback(&mut self, device: &str) -> Result<(), StreamError> {
        let key = self.resolve(device, Direction::Output)?.global_device_index;
        match self.outputs.get_mut(&key) {
            Some(output) => output.stop(),
            None => Ok(()),
        }
    }

    pub fn is_playing(&mut self, device: &str) -> Result<bool, StreamError> {
        let key = self.resolve(device, Direction::Output)?.global_device_index;
        Ok(self.outputs.get(&key).is_some_and(|output| output.is_playing()))
    }
}

impl<D: AudioDriver> Drop for AudioSubsystem<D> {
    fn drop(&mut self) {
        if self.init != InitState::ShutDown {
            self.terminate();
        }
    }
}
