//! # audio-stream-core
//!
//! Driver-agnostic audio stream engine.
//!
//! Records device input into fixed-size ring buffers that the host
//! application samples for visualization, optionally monitors the input live
//! on an output device, and plays audio pulled from a user-supplied sample
//! producer. Driver bindings (cpal, or the mock under `testing`) implement
//! the `AudioDriver` trait and plug into the generic `AudioSubsystem`.
//!
//! ## Architecture
//!
//! ```text
//! audio-stream-core (this crate)
//! ├── traits/       ← AudioDriver, DriverStream, StreamCallback, AudioStream, SampleProducer
//! ├── models/       ← StreamError, StreamState, StreamConfig, DeviceDescriptor, etc.
//! ├── processing/   ← RingBuffer, buffer views, monitor mixing, waveform envelopes
//! ├── stream/       ← InputStreamController, OutputStreamController
//! ├── session/      ← AudioSubsystem (device registry), ThreadGuard
//! └── testing/      ← MockDriver (feature = "testing")
//! ```
//!
//! ## Threads
//!
//! Control calls happen on the thread that created the `AudioSubsystem`.
//! Each running stream adds one driver thread that runs its
//! `StreamCallback`; the two sides share only atomics.

pub mod models;
pub mod processing;
pub mod session;
pub mod stream;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export key types at crate root for convenience.
pub use models::config::{PlaybackConfig, StreamConfig, SubsystemConfig, DEFAULT_FRAMES_PER_PERIOD};
pub use models::device::{DeviceCapabilities, DeviceDescriptor, HostApiId, HostApiInfo};
pub use models::error::{DriverError, StreamError};
pub use models::state::StreamState;
pub use processing::buffer_view::{InputBuffer, OutputBuffer};
pub use processing::ring_buffer::{RingBuffer, WriteOutcome};
pub use processing::waveform::MinMax;
pub use session::subsystem::AudioSubsystem;
pub use stream::input::InputStreamController;
pub use stream::output::OutputStreamController;
pub use traits::audio_stream::AudioStream;
pub use traits::driver::{AudioDriver, ChannelParameters, DriverStream, StreamCallback, StreamParameters, StreamSignal};
pub use traits::sample_producer::SampleProducer;
