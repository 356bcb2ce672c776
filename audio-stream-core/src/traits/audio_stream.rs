use crate::models::error::StreamError;
use crate::models::state::StreamState;

/// Capabilities shared by the input and output stream controllers.
pub trait AudioStream {
    /// Open and start the driver stream. No-op when already started or disposed.
    fn start(&mut self) -> Result<(), StreamError>;

    /// Stop and close the driver stream. No-op unless started.
    fn stop(&mut self) -> Result<(), StreamError>;

    /// Whether the driver is currently delivering callbacks for this stream.
    fn is_running(&self) -> bool;

    /// Stop for good. Every later call is a no-op.
    fn dispose(&mut self) -> Result<(), StreamError>;

    fn state(&self) -> StreamState;
}
