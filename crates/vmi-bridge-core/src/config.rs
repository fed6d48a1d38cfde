use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration of a [`VmiSession`].
///
/// [`VmiSession`]: crate::VmiSession
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmiConfig {
    /// How long a single wait of the run loop blocks before reporting a
    /// timeout. Zero waits indefinitely.
    pub wait_timeout: Duration,

    /// Install `SIGINT`, `SIGTERM` and `SIGHUP` handlers that cancel the
    /// session.
    pub handle_signals: bool,
}

impl Default for VmiConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(1),
            handle_signals: false,
        }
    }
}

impl VmiConfig {
    /// Sets the wait timeout of the run loop.
    pub fn with_wait_timeout(self, wait_timeout: Duration) -> Self {
        Self {
            wait_timeout,
            ..self
        }
    }

    /// Enables or disables the signal handlers.
    pub fn with_signal_handling(self, handle_signals: bool) -> Self {
        Self {
            handle_signals,
            ..self
        }
    }

    /// Returns the timeout in the form the driver expects.
    pub fn timeout(&self) -> Option<Duration> {
        if self.wait_timeout.is_zero() {
            return None;
        }

        Some(self.wait_timeout)
    }
}
