use vmi_bridge_core::{
    DecodeError, EventBreakpoint, EventSingleStep, EventSlp, MemoryAccess, Pa, RawEvent,
    SingleStepMethod, Va, VcpuId, VmiError,
};

use crate::raw::{
    EVENT_DEBUG, EVENT_SLP, EVENT_TASK_SWITCH, REG_TCR, REG_TTBR0, REG_TTBR1,
    RawDebugEvent, RawSlpEvent, RawTaskSwitchEvent,
};

/// The translation control register whose write is reported as a task
/// switch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskSwitchRegister {
    /// `TTBR0_EL1`.
    #[default]
    Ttbr0,

    /// `TTBR1_EL1`.
    Ttbr1,

    /// `TCR_EL1`.
    Tcr,
}

impl TaskSwitchRegister {
    /// Returns the wire selector of the register.
    pub fn selector(self) -> u32 {
        match self {
            Self::Ttbr0 => REG_TTBR0,
            Self::Ttbr1 => REG_TTBR1,
            Self::Tcr => REG_TCR,
        }
    }
}

impl TryFrom<u32> for TaskSwitchRegister {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            REG_TTBR0 => Ok(Self::Ttbr0),
            REG_TTBR1 => Ok(Self::Ttbr1),
            REG_TCR => Ok(Self::Tcr),
            _ => Err(DecodeError::UnknownRegister(value)),
        }
    }
}

impl std::fmt::Display for TaskSwitchRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Ttbr0 => f.write_str("TTBR0"),
            Self::Ttbr1 => f.write_str("TTBR1"),
            Self::Tcr => f.write_str("TCR"),
        }
    }
}

/// Event generated when a vCPU writes a translation control register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTaskSwitch {
    /// The vCPU that wrote the register.
    pub vcpu_id: VcpuId,

    /// The register that was written.
    pub register: TaskSwitchRegister,

    /// Value before the write.
    pub old_value: u64,

    /// Value after the write.
    pub new_value: u64,
}

impl std::fmt::Display for EventTaskSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "TaskSwitch: cpu={}, reg={}, old_val={:#x}, new_val={:#x}",
            self.vcpu_id, self.register, self.old_value, self.new_value
        )
    }
}

/// Reason for a guest CPU trap on AArch64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventReason {
    /// The vCPU wrote a translation control register.
    TaskSwitch(EventTaskSwitch),

    /// A second-level paging permission was violated.
    Slp(EventSlp),

    /// The vCPU executed a single instruction.
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
                    register: TaskSwitchRegister::try_from(payload.reg)?,
                    old_value: payload.old_val,
                    new_value: payload.new_val,
                }))
            }
            EVENT_SLP => {
                let payload = raw.payload::<RawSlpEvent>()?;

                Ok(Self::Slp(EventSlp {
                    vcpu_id: VcpuId::try_from(payload.cpu_num)?,
                    va: Some(Va(payload.gva)),
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
            subtype => Err(DecodeError::UnknownEventSubtype {
                arch: "aarch64",
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
    type Architecture = crate::Aarch64;

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
