use std::{cell::Cell, rc::Rc, time::Duration};

use crate::{
    Architecture, CancellationToken, CpuRegistry, Feature as _, FeatureScope, MemoryAccess, Pa,
    RawEvent, Registers as _, VcpuId, VmiConfig, VmiDriver, VmiError, VmiEvent, VmiHandler,
    VmiInfo, WaitError, WaitStatus,
};

/// The register proxy type of a driver's architecture.
pub type DriverRegisters<Driver> =
    <<Driver as VmiDriver>::Architecture as Architecture>::Registers;

/// The feature request type of a driver's architecture.
pub type DriverFeature<Driver> = <<Driver as VmiDriver>::Architecture as Architecture>::Feature;

/// Lifecycle state of a [`VmiSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// The bridge is not registered with the hypervisor.
    Idle,

    /// The bridge is registered and the VM may run.
    Running,

    /// The bridge was unregistered.
    Stopped,
}

/// The central VMI session.
///
/// Owns the driver and provides the typed surface over it: event decoding,
/// register proxies, physical and virtual memory access, feature
/// configuration and the run loop.
pub struct VmiSession<Driver>
where
    Driver: VmiDriver,
{
    driver: Driver,
    config: VmiConfig,
    registry: CpuRegistry<DriverRegisters<Driver>>,
    cancellation: CancellationToken,
    state: Cell<SessionState>,
    waiting: Cell<bool>,
}

impl<Driver> VmiSession<Driver>
where
    Driver: VmiDriver,
{
    /// Creates a new session.
    ///
    /// Registers the termination signal handlers if the configuration asks
    /// for them.
    pub fn new(driver: Driver, config: VmiConfig) -> Result<Self, VmiError> {
        let cancellation = CancellationToken::new();

        if config.handle_signals {
            cancellation.register_termination_signals()?;
        }

        Ok(Self {
            driver,
            config,
            registry: CpuRegistry::new(),
            cancellation,
            state: Cell::new(SessionState::Idle),
            waiting: Cell::new(false),
        })
    }

    /// Returns the driver.
    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Returns the configuration.
    pub fn config(&self) -> &VmiConfig {
        &self.config
    }

    /// Returns the cancellation token of the session.
    ///
    /// Cancelling the token makes the current (or next) wait fail with
    /// [`VmiError::Interrupted`].
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Returns static properties of the VM.
    pub fn info(&self) -> VmiInfo {
        self.driver.info()
    }

    /// Returns the current resume epoch.
    ///
    /// The epoch advances every time the VM is resumed.
    pub fn epoch(&self) -> u64 {
        self.registry.epoch()
    }

    /// Registers the bridge with the hypervisor.
    pub fn start(&self) {
        if self.state.get() == SessionState::Running {
            tracing::trace!("session already running");
            return;
        }

        tracing::debug!("starting session");
        self.driver.start();
        self.state.set(SessionState::Running);
    }

    /// Unregisters the bridge from the hypervisor.
    pub fn stop(&self) {
        if self.state.get() != SessionState::Running {
            tracing::trace!(state = ?self.state.get(), "session not running");
            return;
        }

        tracing::debug!("stopping session");
        self.driver.stop();
        self.state.set(SessionState::Stopped);
    }

    /// Resumes the VM and waits until it pauses, stops, or the timeout
    /// expires. `None` waits indefinitely.
    ///
    /// Every register proxy handed out before the call becomes stale.
    pub fn wait_event(&self, timeout: Option<Duration>) -> Result<WaitStatus, VmiError> {
        if self.waiting.replace(true) {
            return Err(VmiError::WaitInProgress);
        }

        let _guard = WaitGuard(&self.waiting);

        self.registry.invalidate();
        tracing::trace!(?timeout, epoch = self.registry.epoch(), "waiting for event");
        let result = self.driver.wait_event(timeout);

        if self.cancellation.take() {
            tracing::warn!("wait cancelled");
            return Err(VmiError::Interrupted);
        }

        match result {
            Ok(status) => Ok(status),
            Err(WaitError::Interrupted) => {
                tracing::warn!("wait interrupted");
                Err(VmiError::Interrupted)
            }
            Err(WaitError::Failed(code)) => Err(VmiError::Native {
                operation: "wait_event",
                code,
            }),
        }
    }

    /// Returns the raw pending event record, if any.
    pub fn raw_event(&self) -> Option<RawEvent> {
        let ptr = self.driver.event()?;

        // SAFETY: The driver keeps the record valid until the next wait.
        Some(unsafe { ptr.read() })
    }

    /// Decodes the pending event record, if any.
    pub fn event(&self) -> Result<Option<VmiEvent<Driver::Architecture>>, VmiError> {
        let Some(raw) = self.raw_event() else {
            return Ok(None);
        };

        match VmiEvent::decode(&raw) {
            Ok(event) => Ok(Some(event)),
            Err(err) => {
                tracing::warn!(%err, typ = raw.typ, subtype = raw.subtype, "failed to decode event");
                Err(err)
            }
        }
    }

    /// Returns the register proxy of a vCPU, bound to the current pause.
    ///
    /// The proxy is rebound (and its dirty flag cleared) on every call.
    pub fn registers(&self, vcpu_id: VcpuId) -> Result<Rc<DriverRegisters<Driver>>, VmiError> {
        let ptr = self
            .driver
            .registers(vcpu_id)
            .ok_or(VmiError::InvalidVcpu(vcpu_id))?;

        tracing::trace!(%vcpu_id, epoch = self.registry.epoch(), "binding registers");

        // SAFETY: The driver keeps the block valid and unaliased until the
        //         next wait, which advances the epoch.
        Ok(unsafe { self.registry.bind(vcpu_id, ptr) })
    }

    /// Returns the register proxy of a vCPU, reusing the current binding if
    /// there is one.
    pub fn bound_registers(
        &self,
        vcpu_id: VcpuId,
    ) -> Result<Rc<DriverRegisters<Driver>>, VmiError> {
        match self.registry.get(vcpu_id) {
            Some(registers) if registers.is_bound() => Ok(registers),
            _ => self.registers(vcpu_id),
        }
    }

    /// Enables or disables a trap category.
    ///
    /// The request is validated before any native call is issued.
    pub fn update_feature(&self, feature: &DriverFeature<Driver>) -> Result<(), VmiError> {
        feature.validate()?;

        let request = feature.to_raw();
        let scope = feature.scope();
        tracing::debug!(feature = feature.name(), ?scope, "updating feature");

        let code = match scope {
            FeatureScope::All => self.driver.update_feature(&request),
            FeatureScope::Vcpu(vcpu_id) => self.driver.update_feature_vcpu(vcpu_id, &request),
        };

        if code < 0 {
            return Err(VmiError::Feature {
                feature: feature.name(),
                code,
            });
        }

        Ok(())
    }

    /// Changes the second-level paging permissions of the page containing
    /// `pa`, on every vCPU or on a single one.
    pub fn update_slp(
        &self,
        pa: Pa,
        access: MemoryAccess,
        vcpu_id: Option<VcpuId>,
    ) -> Result<(), VmiError> {
        tracing::debug!(%pa, %access, ?vcpu_id, "updating SLP permissions");

        let code = match vcpu_id {
            Some(vcpu_id) => self.driver.update_slp_vcpu(vcpu_id, pa, access),
            None => self.driver.update_slp(pa, access),
        };

        if code < 0 {
            return Err(VmiError::SlpUpdate { pa, code });
        }

        Ok(())
    }

    /// Asks the hypervisor to pause the VM.
    pub fn request_stop(&self) {
        tracing::debug!("requesting stop");
        self.driver.request_stop();
    }

    /// Asks the hypervisor to shut the VM down.
    pub fn request_shutdown(&self) {
        tracing::debug!("requesting shutdown");
        self.driver.request_shutdown();
    }

    /// Releases the mouse cursor from the VM display.
    pub fn mouse_cursor_leave(&self) {
        self.driver.mouse_cursor_leave();
    }

    /// Runs the event loop until the VM stops or the handler completes.
    ///
    /// Each iteration calls [`VmiHandler::before_resume`], waits with the
    /// configured timeout and dispatches a decoded event to the handler
    /// exactly once. Errors, including [`VmiError::Interrupted`], are
    /// returned without stopping the session.
    pub fn run<Handler>(&self, handler: &mut Handler) -> Result<Option<Handler::Output>, VmiError>
    where
        Handler: VmiHandler<Driver>,
    {
        let timeout = self.config.timeout();
        let mut result;

        self.start();

        loop {
            result = handler.check_completion();

            if result.is_some() {
                tracing::trace!("handler completed");
                break;
            }

            handler.before_resume(self)?;

            match self.wait_event(timeout)? {
                WaitStatus::Stopped => {
                    tracing::debug!("vm stopped");
                    break;
                }
                WaitStatus::Timeout => {
                    tracing::trace!("timeout");
                    handler.handle_timeout(self);
                }
                WaitStatus::Paused => match self.event()? {
                    Some(event) => {
                        tracing::debug!(%event, "event");
                        handler.handle_event(self, &event)?;
                    }
                    None => tracing::trace!("paused without event"),
                },
            }
        }

        self.stop();
        Ok(result)
    }
}

impl<Driver> std::fmt::Debug for VmiSession<Driver>
where
    Driver: VmiDriver,
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("VmiSession")
            .field("config", &self.config)
            .field("state", &self.state.get())
            .field("epoch", &self.registry.epoch())
            .finish_non_exhaustive()
    }
}

struct WaitGuard<'a>(&'a Cell<bool>);

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
