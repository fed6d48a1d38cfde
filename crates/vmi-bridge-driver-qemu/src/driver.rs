use std::{
    marker::PhantomData,
    ptr::NonNull,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use libc::{c_uint, c_void};
use vmi_bridge_arch_amd64::{Amd64, LbrDriver, raw::RawLbrState};
use vmi_bridge_core::{
    Architecture, MemoryAccess, Pa, RawEvent, RawFeatureRequest, RawRegisters, Va, VcpuId,
    VmiDriver, VmiInfo, WaitError, WaitStatus,
};

use crate::{Error, ffi};

/// Set while a driver holds the native interface.
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// VMI driver for a QEMU process with the introspection interface built in.
///
/// Only one driver may exist per process. The interface is initialized in
/// [`QemuDriver::new`] and torn down when the driver is dropped.
pub struct QemuDriver<Arch>
where
    Arch: Architecture,
{
    _marker: PhantomData<*const Arch>,
}

impl<Arch> Drop for QemuDriver<Arch>
where
    Arch: Architecture,
{
    fn drop(&mut self) {
        tracing::debug!(arch = Arch::NAME, "releasing introspection interface");

        // SAFETY: The interface was initialized in `new`.
        unsafe { ffi::vmi_api_uninit() };
        INITIALIZED.store(false, Ordering::Release);
    }
}

impl<Arch> QemuDriver<Arch>
where
    Arch: Architecture,
{
    /// Initializes the introspection interface of the hypervisor.
    pub fn new() -> Result<Self, Error> {
        if INITIALIZED.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyInitialized);
        }

        // SAFETY: Guarded by `INITIALIZED`.
        let code = unsafe { ffi::vmi_api_init() };
        if code < 0 {
            INITIALIZED.store(false, Ordering::Release);
            return Err(Error::Init(code));
        }

        tracing::debug!(arch = Arch::NAME, "introspection interface ready");

        Ok(Self {
            _marker: PhantomData,
        })
    }
}

fn cpu(vcpu_id: VcpuId) -> c_uint {
    c_uint::from(vcpu_id.0)
}

fn timeout_ms(timeout: Option<Duration>) -> u64 {
    match timeout {
        // Zero waits indefinitely on the native side.
        Some(timeout) => (timeout.as_millis() as u64).max(1),
        None => 0,
    }
}

unsafe impl<Arch> VmiDriver for QemuDriver<Arch>
where
    Arch: Architecture,
{
    type Architecture = Arch;

    fn info(&self) -> VmiInfo {
        // SAFETY: Plain queries on an initialized interface.
        unsafe {
            VmiInfo {
                page_size: ffi::vmi_api_get_page_size(),
                page_shift: ffi::vmi_api_get_page_shift(),
                ram_size: ffi::vmi_api_get_ram_size(),
                vcpus: ffi::vmi_api_get_num_cpus() as u16,
            }
        }
    }

    fn start(&self) {
        // SAFETY: The interface is initialized.
        unsafe { ffi::vmi_api_start_vm() }
    }

    fn stop(&self) {
        // SAFETY: The interface is initialized.
        unsafe { ffi::vmi_api_stop_vm() }
    }

    fn wait_event(&self, timeout: Option<Duration>) -> Result<WaitStatus, WaitError> {
        let timeout_ms = timeout_ms(timeout);

        // SAFETY: The session guarantees a single outstanding wait.
        let code = unsafe { ffi::vmi_api_wait_event(timeout_ms) };
        tracing::trace!(timeout_ms, code, "wait returned");

        match code {
            ffi::WAIT_EVENT => Ok(WaitStatus::Paused),
            ffi::WAIT_TIMEOUT => Ok(WaitStatus::Timeout),
            ffi::WAIT_STOPPED => Ok(WaitStatus::Stopped),
            code if code == -libc::EINTR => Err(WaitError::Interrupted),
            code => Err(WaitError::Failed(code)),
        }
    }

    fn event(&self) -> Option<NonNull<RawEvent>> {
        // SAFETY: The record is owned by the hypervisor and valid until the
        //         next wait.
        NonNull::new(unsafe { ffi::vmi_api_get_event() })
    }

    fn registers(&self, vcpu_id: VcpuId) -> Option<NonNull<RawRegisters<Arch>>> {
        // SAFETY: The hypervisor rejects unknown vCPUs with a null pointer.
        let ptr = unsafe { ffi::vmi_api_get_cpu_state(cpu(vcpu_id)) };
        NonNull::new(ptr.cast())
    }

    fn read_physical(&self, pa: Pa, buffer: &mut [u8]) -> i32 {
        tracing::trace!(%pa, len = buffer.len(), "read_phys_mem");

        // SAFETY: `buffer` is valid for `buffer.len()` bytes of writes.
        unsafe {
            ffi::vmi_api_read_phys_mem(pa.0, buffer.as_mut_ptr().cast::<c_void>(), buffer.len())
        }
    }

    fn write_physical(&self, pa: Pa, buffer: &[u8]) -> i32 {
        tracing::trace!(%pa, len = buffer.len(), "write_phys_mem");

        // SAFETY: `buffer` is valid for `buffer.len()` bytes of reads.
        unsafe {
            ffi::vmi_api_write_phys_mem(pa.0, buffer.as_ptr().cast::<c_void>(), buffer.len())
        }
    }

    fn translate(&self, va: Va, root: Pa) -> u64 {
        // SAFETY: Plain value call.
        unsafe { ffi::vmi_api_vtop(va.0, root.0) }
    }

    fn update_feature(&self, request: &RawFeatureRequest) -> i32 {
        // SAFETY: The hypervisor copies the request before returning.
        unsafe { ffi::vmi_api_update_feature(request) }
    }

    fn update_feature_vcpu(&self, vcpu_id: VcpuId, request: &RawFeatureRequest) -> i32 {
        // SAFETY: The hypervisor copies the request before returning.
        unsafe { ffi::vmi_api_update_feature_cpu(cpu(vcpu_id), request) }
    }

    fn update_slp(&self, pa: Pa, access: MemoryAccess) -> i32 {
        let (r, w, x) = rwx(access);

        // SAFETY: Plain value call.
        unsafe { ffi::vmi_api_slp_update(pa.0, r, w, x) }
    }

    fn update_slp_vcpu(&self, vcpu_id: VcpuId, pa: Pa, access: MemoryAccess) -> i32 {
        let (r, w, x) = rwx(access);

        // SAFETY: Plain value call.
        unsafe { ffi::vmi_api_slp_update_cpu(cpu(vcpu_id), pa.0, r, w, x) }
    }

    fn request_stop(&self) {
        // SAFETY: The interface is initialized.
        unsafe { ffi::vmi_api_request_stop() }
    }

    fn request_shutdown(&self) {
        // SAFETY: The interface is initialized.
        unsafe { ffi::vmi_api_request_shutdown() }
    }

    fn mouse_cursor_leave(&self) {
        // SAFETY: The interface is initialized.
        unsafe { ffi::vmi_api_mouse_out() }
    }
}

impl LbrDriver for QemuDriver<Amd64> {
    fn lbr(&self, vcpu_id: VcpuId, state: &mut RawLbrState) -> i32 {
        // SAFETY: `state` is valid for writes of a whole snapshot.
        unsafe { ffi::vmi_api_lbr_get(cpu(vcpu_id), state) }
    }
}

fn rwx(access: MemoryAccess) -> (u8, u8, u8) {
    (
        access.contains(MemoryAccess::R) as u8,
        access.contains(MemoryAccess::W) as u8,
        access.contains(MemoryAccess::X) as u8,
    )
}
