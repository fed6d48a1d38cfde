use std::{ptr::NonNull, time::Duration};

use crate::{
    Architecture, MemoryAccess, Pa, RawEvent, RawFeatureRequest, RawRegisters, Va, VcpuId,
    VmiInfo,
};

/// Returned by [`VmiDriver::translate`] when no mapping exists.
pub const TRANSLATION_FAILED: u64 = u64::MAX;

/// Outcome of a wait for the next event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitStatus {
    /// The VM paused. An event record may be available.
    Paused,

    /// The timeout expired without the VM pausing.
    Timeout,

    /// The VM stopped for good.
    Stopped,
}

/// Failure of a wait for the next event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitError {
    /// A host signal interrupted the wait.
    Interrupted,

    /// The wait failed with a raw status code.
    Failed(i32),
}

/// The raw surface of a hypervisor's introspection interface.
///
/// Status-returning methods follow the native convention: a negative value
/// is an error code, anything else is success.
///
/// # Safety
///
/// Pointers returned by [`event`] and [`registers`] must stay valid, and must
/// not be accessed by anyone else, until the next call to [`wait_event`].
///
/// [`event`]: Self::event
/// [`registers`]: Self::registers
/// [`wait_event`]: Self::wait_event
pub unsafe trait VmiDriver {
    /// The architecture of the guest.
    type Architecture: Architecture;

    /// Returns static properties of the VM.
    fn info(&self) -> VmiInfo;

    /// Registers the bridge with the hypervisor.
    fn start(&self);

    /// Unregisters the bridge from the hypervisor.
    fn stop(&self);

    /// Resumes the VM and waits until it pauses, stops, or the timeout
    /// expires. `None` waits indefinitely.
    fn wait_event(&self, timeout: Option<Duration>) -> Result<WaitStatus, WaitError>;

    /// Returns the pending event record, if any.
    fn event(&self) -> Option<NonNull<RawEvent>>;

    /// Returns the register block of a vCPU.
    fn registers(
        &self,
        vcpu_id: VcpuId,
    ) -> Option<NonNull<RawRegisters<Self::Architecture>>>;

    /// Reads guest physical memory.
    fn read_physical(&self, pa: Pa, buffer: &mut [u8]) -> i32;

    /// Writes guest physical memory.
    fn write_physical(&self, pa: Pa, buffer: &[u8]) -> i32;

    /// Translates a virtual address using the page tables at `root`.
    ///
    /// Returns [`TRANSLATION_FAILED`] if no mapping exists.
    fn translate(&self, va: Va, root: Pa) -> u64;

    /// Applies a feature request to every vCPU.
    fn update_feature(&self, request: &RawFeatureRequest) -> i32;

    /// Applies a feature request to a single vCPU.
    fn update_feature_vcpu(&self, vcpu_id: VcpuId, request: &RawFeatureRequest) -> i32;

    /// Changes the second-level paging permissions of a page on every vCPU.
    fn update_slp(&self, pa: Pa, access: MemoryAccess) -> i32;

    /// Changes the second-level paging permissions of a page on a single
    /// vCPU.
    fn update_slp_vcpu(&self, vcpu_id: VcpuId, pa: Pa, access: MemoryAccess) -> i32;

    /// Asks the hypervisor to pause the VM.
    fn request_stop(&self);

    /// Asks the hypervisor to shut the VM down.
    fn request_shutdown(&self);

    /// Releases the mouse cursor from the VM display.
    fn mouse_cursor_leave(&self) {}
}
