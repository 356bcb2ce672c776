use thiserror::Error;

/// Errors surfaced by the control plane (subsystem and stream controllers).
///
/// Real-time callbacks never produce these; they report through
/// [`StreamSignal`](crate::traits::driver::StreamSignal) instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The driver's global initialization failed. Terminal for the subsystem:
    /// initialization is never retried.
    #[error("audio driver initialization failed: {0}")]
    InitializationFailure(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("must be called from the thread that created the audio subsystem")]
    ThreadViolation,
}

/// Errors reported by a driver binding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("initialize failed: {0}")]
    Initialize(String),

    #[error("device enumeration failed: {0}")]
    Enumeration(String),

    #[error("no device with global index {0}")]
    InvalidDevice(usize),

    #[error("open stream failed: {0}")]
    OpenStream(String),

    #[error("start stream failed: {0}")]
    StartStream(String),

    #[error("stop stream failed: {0}")]
    StopStream(String),
}

impl From<DriverError> for StreamError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Initialize(msg) => StreamError::InitializationFailure(msg),
            other => StreamError::DeviceUnavailable(other.to_string()),
        }
    }
}
