//! # audio-stream-cpal
//!
//! cpal driver binding for audio-stream.
//!
//! Provides `CpalDriver`, an `AudioDriver` over every host cpal supports on
//! the platform (WASAPI/ASIO on Windows, CoreAudio on macOS, ALSA/JACK on
//! Linux).
//!
//! ## Usage
//! ```ignore
//! use audio_stream_core::AudioSubsystem;
//! use audio_stream_cpal::CpalDriver;
//!
//! let mut audio = AudioSubsystem::create(CpalDriver::new());
//! for name in audio.input_device_names()? {
//!     println!("{}", name);
//! }
//! ```

pub mod driver;

pub use driver::{CpalDriver, CpalStream};
