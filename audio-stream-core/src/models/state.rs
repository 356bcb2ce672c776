/// Lifecycle of a stream controller.
///
/// State transitions:
/// ```text
/// created → started ⇄ stopped
///    ↓         ↓         ↓
///    └──────→ disposed ←─┘
/// ```
///
/// `Disposed` is terminal; every operation on a disposed controller is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Created,
    Started,
    Stopped,
    Disposed,
}

impl StreamState {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }

    /// Whether `start()` would open a new driver stream.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Created | Self::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_created_and_stopped_can_start() {
        assert!(StreamState::Created.can_start());
        assert!(StreamState::Stopped.can_start());
        assert!(!StreamState::Started.can_start());
        assert!(!StreamState::Disposed.can_start());
    }
}
