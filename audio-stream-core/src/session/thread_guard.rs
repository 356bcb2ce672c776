use std::thread::{self, ThreadId};

use crate::models::error::StreamError;

/// Pins an object to the thread that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadGuard {
    owner: ThreadId,
}

impl ThreadGuard {
    /// Owned by the calling thread.
    pub fn current() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    pub fn check(&self) -> Result<(), StreamError> {
        if thread::current().id() == self.owner {
            Ok(())
        } else {
            Err(StreamError::ThreadViolation)
        }
    }
}
