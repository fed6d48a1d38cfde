use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Architecture, DecodeError, EventReason as _, MemoryAccess, Pa, Va, VcpuId, VmiError};

/// Size of the payload area of a [`RawEvent`].
pub const RAW_EVENT_PAYLOAD_SIZE: usize = 48;

/// The event record shared with the hypervisor.
///
/// The record is a tagged union. `typ` selects between the hypervisor
/// control events and a guest CPU trap. For traps, `subtype` selects the
/// architecture-specific payload layout stored in `payload`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawEvent {
    /// Top-level event type.
    pub typ: u32,

    /// Architecture-specific trap type. Only meaningful for [`RawEvent::VMI`].
    pub subtype: u32,

    /// Trap payload.
    pub payload: [u8; RAW_EVENT_PAYLOAD_SIZE],
}

impl RawEvent {
    /// The VM was paused.
    pub const VM_STOP: u32 = 0;

    /// The VM is ready to run.
    pub const VM_READY: u32 = 1;

    /// The VM is about to be destroyed.
    pub const VM_SHUTDOWN: u32 = 2;

    /// A guest CPU trap.
    pub const VMI: u32 = 3;

    /// Creates a record with an empty payload.
    pub fn new(typ: u32, subtype: u32) -> Self {
        Self {
            typ,
            subtype,
            payload: [0; RAW_EVENT_PAYLOAD_SIZE],
        }
    }

    /// Creates a guest CPU trap record carrying `payload`.
    ///
    /// # Panics
    ///
    /// Panics if `payload` is larger than [`RAW_EVENT_PAYLOAD_SIZE`].
    pub fn trap<T>(subtype: u32, payload: &T) -> Self
    where
        T: IntoBytes + Immutable,
    {
        let mut result = Self::new(Self::VMI, subtype);
        let bytes = payload.as_bytes();
        result.payload[..bytes.len()].copy_from_slice(bytes);
        result
    }

    /// Reads the payload as `T`.
    pub fn payload<T>(&self) -> Result<T, DecodeError>
    where
        T: FromBytes,
    {
        T::read_from_prefix(&self.payload)
            .map(|(value, _)| value)
            .map_err(|_| DecodeError::Truncated {
                expected: size_of::<T>(),
                actual: RAW_EVENT_PAYLOAD_SIZE,
            })
    }
}

/// A control-plane event of the hypervisor.
///
/// System events carry no payload and are not tied to a guest CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemEvent {
    /// The VM was paused.
    VmStop,

    /// The VM is ready to run. This is the last chance to configure traps
    /// before guest execution begins.
    VmReady,

    /// The VM finished execution and is about to be destroyed.
    VmShutdown,
}

impl std::fmt::Display for SystemEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::VmStop => f.write_str("VmStop"),
            Self::VmReady => f.write_str("VmReady"),
            Self::VmShutdown => f.write_str("VmShutdown"),
        }
    }
}

/// A decoded event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VmiEvent<Arch>
where
    Arch: Architecture,
{
    /// A hypervisor control event.
    System(SystemEvent),

    /// A guest CPU trap.
    Cpu(Arch::EventReason),
}

impl<Arch> VmiEvent<Arch>
where
    Arch: Architecture,
{
    /// Decodes a raw event record.
    ///
    /// Decoding is a pure function of the record.
    pub fn decode(raw: &RawEvent) -> Result<Self, VmiError> {
        match raw.typ {
            RawEvent::VM_STOP => Ok(Self::System(SystemEvent::VmStop)),
            RawEvent::VM_READY => Ok(Self::System(SystemEvent::VmReady)),
            RawEvent::VM_SHUTDOWN => Ok(Self::System(SystemEvent::VmShutdown)),
            RawEvent::VMI => Ok(Self::Cpu(Arch::decode_event(raw)?)),
            typ => Err(DecodeError::UnknownEventType(typ).into()),
        }
    }

    /// Returns the system event, if any.
    pub fn as_system(&self) -> Option<SystemEvent> {
        match self {
            Self::System(event) => Some(*event),
            Self::Cpu(_) => None,
        }
    }

    /// Returns the CPU trap, if any.
    pub fn as_cpu(&self) -> Option<&Arch::EventReason> {
        match self {
            Self::System(_) => None,
            Self::Cpu(reason) => Some(reason),
        }
    }

    /// Returns the vCPU that caused the event, if any.
    pub fn vcpu_id(&self) -> Option<VcpuId> {
        self.as_cpu().map(|reason| reason.vcpu_id())
    }
}

impl<Arch> std::fmt::Display for VmiEvent<Arch>
where
    Arch: Architecture,
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::System(event) => std::fmt::Display::fmt(event, f),
            Self::Cpu(reason) => std::fmt::Display::fmt(reason, f),
        }
    }
}

/// Event generated when a second-level paging permission is violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSlp {
    /// The vCPU that caused the violation.
    pub vcpu_id: VcpuId,

    /// Faulting virtual address, if the hypervisor knows it.
    pub va: Option<Va>,

    /// Faulting physical address.
    pub pa: Pa,

    /// The accesses that triggered the violation.
    pub access: MemoryAccess,

    /// The accesses the guest actually attempted.
    pub attempted: MemoryAccess,
}

impl EventSlp {
    /// Checks whether the guest attempted a combined read, write and execute
    /// access.
    pub fn is_rwx(&self) -> bool {
        self.attempted == MemoryAccess::RWX
    }
}

impl std::fmt::Display for EventSlp {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "SLP: cpu={}, gva=", self.vcpu_id)?;

        match self.va {
            Some(va) => write!(f, "{va:#x}")?,
            None => f.write_str("-")?,
        }

        write!(
            f,
            ", gpa={:#x}, r={}, w={}, x={}",
            self.pa,
            self.access.contains(MemoryAccess::R),
            self.access.contains(MemoryAccess::W),
            self.access.contains(MemoryAccess::X),
        )?;

        if self.is_rwx() {
            f.write_str(" RWX")?;
        }

        Ok(())
    }
}

/// The mechanism that produced a single-step notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SingleStepMethod {
    /// Debug-register (trap flag) single-stepping.
    Debug,

    /// Monitor trap flag single-stepping.
    Mtf,
}

/// Event generated after a single instruction was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSingleStep {
    /// The vCPU that executed the instruction.
    pub vcpu_id: VcpuId,

    /// The mechanism that produced the event.
    pub method: SingleStepMethod,
}

impl std::fmt::Display for EventSingleStep {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "SingleStep: {:?}: cpu={}", self.method, self.vcpu_id)
    }
}

/// Event generated when a breakpoint is hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventBreakpoint {
    /// The vCPU that hit the breakpoint.
    pub vcpu_id: VcpuId,

    /// Virtual address of the breakpoint.
    pub va: Va,

    /// Physical address of the breakpoint.
    pub pa: Pa,
}

impl std::fmt::Display for EventBreakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Breakpoint: cpu={}, gva={:#x}, gpa={:#x}",
            self.vcpu_id, self.va, self.pa
        )
    }
}
