//! Wire layouts shared with the hypervisor.

use vmi_bridge_core::{RAW_EVENT_PAYLOAD_SIZE, RAW_FEATURE_PAYLOAD_SIZE};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Index of `RAX` in [`RawRegisters::regs`].
pub const RAX: usize = 0;
/// Index of `RCX` in [`RawRegisters::regs`].
pub const RCX: usize = 1;
/// Index of `RDX` in [`RawRegisters::regs`].
pub const RDX: usize = 2;
/// Index of `RBX` in [`RawRegisters::regs`].
pub const RBX: usize = 3;
/// Index of `RSP` in [`RawRegisters::regs`].
pub const RSP: usize = 4;
/// Index of `RBP` in [`RawRegisters::regs`].
pub const RBP: usize = 5;
/// Index of `RSI` in [`RawRegisters::regs`].
pub const RSI: usize = 6;
/// Index of `RDI` in [`RawRegisters::regs`].
pub const RDI: usize = 7;

/// Index of `ES` in [`RawRegisters::segs`].
pub const ES: usize = 0;
/// Index of `CS` in [`RawRegisters::segs`].
pub const CS: usize = 1;
/// Index of `SS` in [`RawRegisters::segs`].
pub const SS: usize = 2;
/// Index of `DS` in [`RawRegisters::segs`].
pub const DS: usize = 3;
/// Index of `FS` in [`RawRegisters::segs`].
pub const FS: usize = 4;
/// Index of `GS` in [`RawRegisters::segs`].
pub const GS: usize = 5;

/// A cached segment register as stored by the hypervisor.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawSegment {
    /// Segment selector.
    pub selector: u32,

    /// Reserved.
    pub _reserved: u32,

    /// Segment base.
    pub base: u64,

    /// Segment limit.
    pub limit: u32,

    /// Attribute flags.
    pub flags: u32,
}

/// The register block of a vCPU as stored by the hypervisor.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawRegisters {
    /// General purpose registers, in encoding order (`RAX`, `RCX`, `RDX`,
    /// `RBX`, `RSP`, `RBP`, `RSI`, `RDI`, `R8`..`R15`).
    pub regs: [u64; 16],

    /// Instruction pointer.
    pub rip: u64,

    /// Flags register.
    pub rflags: u64,

    /// Segment registers (`ES`, `CS`, `SS`, `DS`, `FS`, `GS`).
    pub segs: [RawSegment; 6],

    /// Local descriptor table register.
    pub ldt: RawSegment,

    /// Task register.
    pub tr: RawSegment,

    /// Global descriptor table register. Only base and limit are used.
    pub gdt: RawSegment,

    /// Interrupt descriptor table register. Only base and limit are used.
    pub idt: RawSegment,

    /// Control registers `CR0`..`CR4`. `CR1` is reserved.
    pub cr: [u64; 5],
}

/// Event subtype of a task switch.
pub const EVENT_TASK_SWITCH: u32 = 0;
/// Event subtype of a second-level paging violation.
pub const EVENT_SLP: u32 = 1;
/// Event subtype of a debug trap.
pub const EVENT_DEBUG: u32 = 2;
/// Event subtype of a monitor trap flag single-step.
pub const EVENT_MTF: u32 = 3;

/// Payload of a task switch event.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawTaskSwitchEvent {
    /// The vCPU that switched tasks.
    pub cpu_num: u32,

    /// Reserved.
    pub _reserved: u32,

    /// `CR3` of the outgoing task.
    pub old_cr3: u64,

    /// `CR3` of the incoming task.
    pub new_cr3: u64,
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

    /// Faulting virtual address, or [`GVA_UNKNOWN`].
    pub gva: u64,

    /// Faulting physical address.
    pub gpa: u64,
}

/// Faulting virtual address reported when the hypervisor does not know it.
pub const GVA_UNKNOWN: u64 = u64::MAX;

/// Payload of a debug or monitor trap flag event.
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
/// Feature identifier of the last branch record.
pub const FEATURE_LBR: u32 = 3;
/// Feature identifier of the monitor trap flag.
pub const FEATURE_MTF: u32 = 4;

/// Payload of a task switch trap request.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawTaskSwitchFeature {
    /// Non-zero to enable.
    pub enable: u8,

    /// Non-zero to trap switches to `cr3`.
    pub incoming: u8,

    /// Non-zero to trap switches away from `cr3`.
    pub outgoing: u8,

    /// Non-zero if `cr3` is valid.
    pub has_cr3: u8,

    /// Reserved.
    pub _reserved: [u8; 4],

    /// The address space to trap.
    pub cr3: u64,
}

/// Payload of a last branch record request.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawLbrFeature {
    /// Non-zero to enable.
    pub enable: u8,

    /// Reserved.
    pub _reserved: [u8; 7],

    /// Value of the `LBR_SELECT` MSR.
    pub select: u64,
}

/// Payload of a monitor trap flag request.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawMtfFeature {
    /// Non-zero to enable.
    pub enable: u8,

    /// Reserved.
    pub _reserved: [u8; 7],
}

/// The maximum number of entries of a last branch record stack.
pub const LBR_MAX: usize = 32;

/// A last branch record snapshot as returned by the hypervisor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawLbrState {
    /// Top of stack.
    pub tos: u32,

    /// Number of valid entries.
    pub size: u32,

    /// Branch sources.
    pub from: [u64; LBR_MAX],

    /// Branch targets.
    pub to: [u64; LBR_MAX],
}

impl Default for RawLbrState {
    fn default() -> Self {
        Self {
            tos: 0,
            size: 0,
            from: [0; LBR_MAX],
            to: [0; LBR_MAX],
        }
    }
}

const _: () = assert!(size_of::<RawTaskSwitchEvent>() <= RAW_EVENT_PAYLOAD_SIZE);
const _: () = assert!(size_of::<RawSlpEvent>() <= RAW_EVENT_PAYLOAD_SIZE);
const _: () = assert!(size_of::<RawDebugEvent>() <= RAW_EVENT_PAYLOAD_SIZE);
const _: () = assert!(size_of::<RawTaskSwitchFeature>() <= RAW_FEATURE_PAYLOAD_SIZE);
const _: () = assert!(size_of::<RawLbrFeature>() <= RAW_FEATURE_PAYLOAD_SIZE);
const _: () = assert!(size_of::<RawMtfFeature>() <= RAW_FEATURE_PAYLOAD_SIZE);
