//! Symbols exported by the hypervisor process.

use libc::{c_int, c_uint, c_void};
use vmi_bridge_arch_amd64::raw::RawLbrState;
use vmi_bridge_core::{RawEvent, RawFeatureRequest};

/// [`vmi_api_wait_event`] returned with a pending event.
pub const WAIT_EVENT: c_int = 0;
/// [`vmi_api_wait_event`] timed out.
pub const WAIT_TIMEOUT: c_int = 1;
/// [`vmi_api_wait_event`] returned because the VM stopped.
pub const WAIT_STOPPED: c_int = 2;

unsafe extern "C" {
    pub fn vmi_api_init() -> c_int;
    pub fn vmi_api_uninit();

    pub fn vmi_api_start_vm();
    pub fn vmi_api_stop_vm();

    /// Resumes the VM and blocks until it pauses. A zero timeout blocks
    /// indefinitely.
    pub fn vmi_api_wait_event(timeout_ms: u64) -> c_int;
    pub fn vmi_api_get_event() -> *mut RawEvent;
    pub fn vmi_api_get_cpu_state(cpu: c_uint) -> *mut c_void;

    pub fn vmi_api_get_page_size() -> u64;
    pub fn vmi_api_get_page_shift() -> u64;
    pub fn vmi_api_get_ram_size() -> u64;
    pub fn vmi_api_get_num_cpus() -> c_uint;

    pub fn vmi_api_read_phys_mem(pa: u64, buffer: *mut c_void, len: usize) -> c_int;
    pub fn vmi_api_write_phys_mem(pa: u64, buffer: *const c_void, len: usize) -> c_int;
    pub fn vmi_api_vtop(va: u64, root: u64) -> u64;

    pub fn vmi_api_update_feature(request: *const RawFeatureRequest) -> c_int;
    pub fn vmi_api_update_feature_cpu(cpu: c_uint, request: *const RawFeatureRequest) -> c_int;
    pub fn vmi_api_slp_update(pa: u64, r: u8, w: u8, x: u8) -> c_int;
    pub fn vmi_api_slp_update_cpu(cpu: c_uint, pa: u64, r: u8, w: u8, x: u8) -> c_int;

    pub fn vmi_api_lbr_get(cpu: c_uint, state: *mut RawLbrState) -> c_int;

    pub fn vmi_api_request_stop();
    pub fn vmi_api_request_shutdown();
    pub fn vmi_api_mouse_out();
}
