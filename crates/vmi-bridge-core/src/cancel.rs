use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};

/// A cancellation flag shared between the session and whoever wants to
/// interrupt it.
///
/// The flag is safe to set from a signal handler. A cancelled wait reports
/// [`VmiError::Interrupted`] and clears the flag.
///
/// [`VmiError::Interrupted`]: crate::VmiError::Interrupted
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Checks whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears the flag and returns whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    /// Cancels the token when `signal` arrives.
    pub fn register_signal(&self, signal: i32) -> Result<(), std::io::Error> {
        signal_hook::flag::register(signal, self.0.clone())?;
        Ok(())
    }

    /// Cancels the token on `SIGINT`, `SIGTERM` and `SIGHUP`.
    pub fn register_termination_signals(&self) -> Result<(), std::io::Error> {
        for signal in [SIGHUP, SIGINT, SIGTERM] {
            self.register_signal(signal)?;
        }

        Ok(())
    }
}
