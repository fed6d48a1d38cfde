//! Wire layouts shared with the hypervisor.

use vmi_bridge_core::{RAW_EVENT_PAYLOAD_SIZE, RAW_FEATURE_PAYLOAD_SIZE};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Index of the stack pointer alias in [`RawRegisters::xregs`].
pub const SP: usize = 31;

/// The register block of a vCPU as stored by the hypervisor.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawRegisters {
    /// General purpose registers `X0`..`X30`, followed by the current stack
    /// pointer.
    pub xregs: [u64; 32],

    /// Program counter.
    pub pc: u64,

    /// Stack pointers of exception levels 0 to 3.
    pub sp_el: [u64; 4],

    /// `TTBR0` of exception levels 0 to 3.
    pub ttbr0_el: [u64; 4],

    /// `TTBR1` of exception levels 0 to 3.
    pub ttbr1_el: [u64; 4],

    /// `TCR` of exception levels 0 to 3.
    pub tcr_el: [u64; 4],
}

/// Event subtype of a task switch.
pub const EVENT_TASK_SWITCH: u32 = 0;
/// Event subtype of a second-level paging violation.
pub const EVENT_SLP: u32 = 1;
/// Event subtype of a debug trap.
pub const EVENT_DEBUG: u32 = 2;

/// Register selector of `TTBR0_EL1`.
pub const REG_TTBR0: u32 = 0;
/// Register selector of `TTBR1_EL1`.
pub const REG_TTBR1: u32 = 1;
/// Register selector of `TCR_EL1`.
pub const REG_TCR: u32 = 2;

/// Payload of a task switch event.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawTaskSwitchEvent {
    /// The vCPU that wrote the register.
    pub cpu_num: u32,

    /// Register selector.
    pub reg: u32,

    /// Value before the write.
    pub old_val: u64,

    /// Value after the write.
    pub new_val: u64,
}

/// Payload of a second-level paging violation event.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawSlpEvent {
    /// The vCPU that caused the violation.
    pub cpu_num: u32,

    /// Non-zero if a read triggered the violation.
    pub r: u8,

    /// Non-zero if a write triggered the violation.
    pub w: u8,

    /// Non-zero if an execution triggered the violation.
    pub x: u8,

    /// Non-zero if a read was attempted.
    pub attempted_r: u8,

    /// Non-zero if a write was attempted.
    pub attempted_w: u8,

    /// Non-zero if an execution was attempted.
    pub attempted_x: u8,

    /// Reserved.
    pub _reserved: [u8; 6],

    /// Faulting virtual address.
    pub gva: u64,

    /// Faulting physical address.
    pub gpa: u64,
}

/// Payload of a debug event.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawDebugEvent {
    /// The vCPU that trapped.
    pub cpu_num: u32,

    /// Non-zero for a single-step.
    pub single_step: u8,

    /// Non-zero for a watchpoint hit.
    pub watchpoint: u8,

    /// Non-zero for a breakpoint hit.
    pub breakpoint: u8,

    /// Reserved.
    pub _reserved: u8,

    /// Virtual address of the breakpoint.
    pub gva: u64,

    /// Physical address of the breakpoint.
    pub gpa: u64,
}

/// Feature identifier of the task switch trap.
pub const FEATURE_TASK_SWITCH: u32 = 0;
/// Feature identifier of the second-level paging trap.
pub const FEATURE_SLP: u32 = 1;
/// Feature identifier of the debug trap.
pub const FEATURE_DEBUG: u32 = 2;

/// Payload of a task switch trap request.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawTaskSwitchFeature {
    /// Non-zero to enable.
    pub enable: u8,

    /// Reserved.
    pub _reserved: [u8; 3],

    /// Register selector.
    pub reg: u32,
}

const _: () = assert!(size_of::<RawTaskSwitchEvent>() <= RAW_EVENT_PAYLOAD_SIZE);
const _: () = assert!(size_of::<RawSlpEvent>() <= RAW_EVENT_PAYLOAD_SIZE);
const _: () = assert!(size_of::<RawDebugEvent>() <= RAW_EVENT_PAYLOAD_SIZE);
const _: () = assert!(size_of::<RawTaskSwitchFeature>() <= RAW_FEATURE_PAYLOAD_SIZE);
