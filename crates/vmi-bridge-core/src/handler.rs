use crate::{VmiDriver, VmiError, VmiEvent, VmiSession};

/// A trait for handling VMI events.
///
/// A handler is passed to [`VmiSession::run`], which dispatches every
/// decoded event to [`handle_event`] exactly once.
///
/// [`handle_event`]: Self::handle_event
pub trait VmiHandler<Driver>
where
    Driver: VmiDriver,
{
    /// The output type of the handler.
    type Output;

    /// Handles a decoded event.
    ///
    /// Register proxies obtained from the session are valid until this
    /// method returns.
    fn handle_event(
        &mut self,
        session: &VmiSession<Driver>,
        event: &VmiEvent<<Driver as VmiDriver>::Architecture>,
    ) -> Result<(), VmiError>;

    /// Handles a wait that timed out.
    fn handle_timeout(&mut self, _session: &VmiSession<Driver>) {}

    /// Called right before the VM is resumed.
    fn before_resume(&mut self, _session: &VmiSession<Driver>) -> Result<(), VmiError> {
        Ok(())
    }

    /// Checks if the handler has completed.
    ///
    /// This method is called before each wait. If the handler has completed,
    /// this method should return the output of the handler. Otherwise, it
    /// should return `None`.
    fn check_completion(&self) -> Option<Self::Output> {
        None
    }
}

