use vmi_bridge_core::{
    DecodeError, EventBreakpoint, EventSingleStep, EventSlp, MemoryAccess, Pa, RawEvent,
    SingleStepMethod, Va, VcpuId, VmiError,
};

use crate::{
    Cr3,
    raw::{
        EVENT_DEBUG, EVENT_MTF, EVENT_SLP, EVENT_TASK_SWITCH, GVA_UNKNOWN, RawDebugEvent,
        RawSlpEvent, RawTaskSwitchEvent,
    },
};

/// Event generated when a vCPU switches address spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTaskSwitch {
    /// The vCPU that switched tasks.
    pub vcpu_id: VcpuId,

    /// `CR3` of the outgoing task.
    pub old_cr3: Cr3,

    /// `CR3` of the incoming task.
    pub new_cr3: Cr3,
}

impl std::fmt::Display for EventTaskSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "TaskSwitch: cpu={}, outgoing_cr3={:#x}, incoming_cr3={:#x}",
            self.vcpu_id, self.old_cr3, self.new_cr3
        )
    }
}

/// Reason for a guest CPU trap on AMD64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventReason {
    /// The vCPU switched address spaces.
    TaskSwitch(EventTaskSwitch),

    /// A second-level paging permission was violated.
    Slp(EventSlp),

    /// The vCPU executed a single instruction, either via the debug trap or
    /// via the monitor trap flag.
    SingleStep(EventSingleStep),

    /// The vCPU hit a breakpoint.
    Breakpoint(EventBreakpoint),
}

impl EventReason {
    /// Returns the task switch event, if any.
    pub fn as_task_switch(&self) -> Option<&EventTaskSwitch> {
        match self {
            Self::TaskSwitch(event) => Some(event),
            _ => None,
        }
    }

    /// Decodes the payload of a guest CPU trap.
    pub fn decode(raw: &RawEvent) -> Result<Self, VmiError> {
        match raw.subtype {
            EVENT_TASK_SWITCH => {
                let payload = raw.payload::<RawTaskSwitchEvent>()?;

                Ok(Self::TaskSwitch(EventTaskSwitch {
                    vcpu_id: VcpuId::try_from(payload.cpu_num)?,
                    old_cr3: Cr3(payload.old_cr3),
                    new_cr3: Cr3(payload.new_cr3),
                }))
            }
            EVENT_SLP => {
                let payload = raw.payload::<RawSlpEvent>()?;

                let va = match payload.gva {
                    GVA_UNKNOWN => None,
                    gva => Some(Va(gva)),
                };

                Ok(Self::Slp(EventSlp {
                    vcpu_id: VcpuId::try_from(payload.cpu_num)?,
                    va,
                    pa: Pa(payload.gpa),
                    access: MemoryAccess::from_rwx(payload.r != 0, payload.w != 0, payload.x != 0),
                    attempted: MemoryAccess::from_rwx(
                        payload.attempted_r != 0,
                        payload.attempted_w != 0,
                        payload.attempted_x != 0,
                    ),
                }))
            }
            EVENT_DEBUG => {
                let payload = raw.payload::<RawDebugEvent>()?;
                let vcpu_id = VcpuId::try_from(payload.cpu_num)?;

                if payload.single_step != 0 {
                    return Ok(Self::SingleStep(EventSingleStep {
                        vcpu_id,
                        method: SingleStepMethod::Debug,
                    }));
                }

                if payload.watchpoint != 0 {
                    return Err(VmiError::NotImplemented {
                        what: "watchpoint event",
                        vcpu_id,
                    });
                }

                Ok(Self::Breakpoint(EventBreakpoint {
                    vcpu_id,
                    va: Va(payload.gva),
                    pa: Pa(payload.gpa),
                }))
            }
            EVENT_MTF => {
                let payload = raw.payload::<RawDebugEvent>()?;

                Ok(Self::SingleStep(EventSingleStep {
                    vcpu_id: VcpuId::try_from(payload.cpu_num)?,
                    method: SingleStepMethod::Mtf,
                }))
            }
            subtype => Err(DecodeError::UnknownEventSubtype {
                arch: "amd64",
                subtype,
            }
            .into()),
        }
    }
}

impl std::fmt::Display for EventReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::TaskSwitch(event) => std::fmt::Display::fmt(event, f),
            Self::Slp(event) => std::fmt::Display::fmt(event, f),
            Self::SingleStep(event) => std::fmt::Display::fmt(event, f),
            Self::Breakpoint(event) => std::fmt::Display::fmt(event, f),
        }
    }
}

impl vmi_bridge_core::EventReason for EventReason {
    type Architecture = crate::Amd64;

    fn vcpu_id(&self) -> VcpuId {
        match self {
            Self::TaskSwitch(event) => event.vcpu_id,
            Self::Slp(event) => event.vcpu_id,
            Self::SingleStep(event) => event.vcpu_id,
            Self::Breakpoint(event) => event.vcpu_id,
        }
    }

    fn as_slp(&self) -> Option<&EventSlp> {
        match self {
            Self::Slp(event) => Some(event),
            _ => None,
        }
    }

    fn as_single_step(&self) -> Option<&EventSingleStep> {
        match self {
            Self::SingleStep(event) => Some(event),
            _ => None,
        }
    }

    fn as_breakpoint(&self) -> Option<&EventBreakpoint> {
        match self {
            Self::Breakpoint(event) => Some(event),
            _ => None,
        }
    }
}
