use crate::{Pa, Va, VcpuId};

/// An error that can occur when working with the bridge.
#[derive(thiserror::Error, Debug)]
pub enum VmiError {
    /// The raw event record could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The event payload is recognized, but handling it is not implemented.
    #[error("{what} is not implemented (vcpu {vcpu_id})")]
    NotImplemented {
        /// What is missing.
        what: &'static str,

        /// The virtual CPU that reported the event.
        vcpu_id: VcpuId,
    },

    /// A feature request is missing a required parameter combination.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The hypervisor rejected a feature update.
    #[error("failed to update feature {feature}: error {code}")]
    Feature {
        /// The feature that was being updated.
        feature: &'static str,

        /// The raw status code returned by the hypervisor.
        code: i32,
    },

    /// The hypervisor failed to access guest physical memory.
    #[error("failed to {operation} {len} bytes at {pa}: error {code}")]
    Memory {
        /// The memory operation (`read` or `write`).
        operation: &'static str,

        /// The guest physical address of the access.
        pa: Pa,

        /// The number of bytes requested.
        len: usize,

        /// The raw status code returned by the hypervisor.
        code: i32,
    },

    /// The hypervisor could not translate a virtual address.
    #[error("failed to translate {va:#x} with page table base {root:#x}")]
    Translation {
        /// The virtual address that was translated.
        va: Va,

        /// The page table base used for the translation.
        root: Pa,
    },

    /// The hypervisor rejected a second-level paging permission update.
    #[error("failed to update SLP permissions at {pa}: error {code}")]
    SlpUpdate {
        /// The guest physical address of the page.
        pa: Pa,

        /// The raw status code returned by the hypervisor.
        code: i32,
    },

    /// Any other native call failed.
    #[error("{operation} failed: error {code}")]
    Native {
        /// The native operation.
        operation: &'static str,

        /// The raw status code returned by the hypervisor.
        code: i32,
    },

    /// A host interrupt was observed during a blocking wait.
    #[error("Interrupted while waiting for an event")]
    Interrupted,

    /// A register proxy was used outside of its binding window.
    #[error("Registers of vcpu {0} are not bound to the current pause")]
    StaleRegisters(VcpuId),

    /// The hypervisor did not provide a register block for the vCPU.
    #[error("Invalid vcpu {0}")]
    InvalidVcpu(VcpuId),

    /// A wait was started while another one is outstanding.
    #[error("Another wait is already in progress")]
    WaitInProgress,

    /// The LBR was never enabled for the vCPU.
    #[error("LBR is not enabled on vcpu {0}")]
    LbrNotEnabled(VcpuId),

    /// The given address has invalid width.
    #[error("Invalid address width")]
    InvalidAddressWidth,

    /// A virtual access wraps past the end of the address space.
    #[error("access of {len} bytes at {va} is out of bounds")]
    OutOfBounds {
        /// First address of the access.
        va: Va,

        /// Length of the access.
        len: usize,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A raw event record could not be interpreted.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The top-level event type is not recognized.
    #[error("Unknown event type {0}")]
    UnknownEventType(u32),

    /// The architecture-specific event subtype is not recognized.
    #[error("Unknown {arch} event subtype {subtype}")]
    UnknownEventSubtype {
        /// The architecture that decoded the event.
        arch: &'static str,

        /// The raw subtype.
        subtype: u32,
    },

    /// The CPU index in the payload does not fit a vCPU id.
    #[error("Invalid vcpu index {0}")]
    InvalidVcpu(u32),

    /// A register selector in the payload is not recognized.
    #[error("Unknown register selector {0}")]
    UnknownRegister(u32),

    /// The payload is shorter than the record it should contain.
    #[error("Event payload too short ({actual} < {expected} bytes)")]
    Truncated {
        /// The size of the expected record.
        expected: usize,

        /// The size of the payload.
        actual: usize,
    },
}

/// A feature request is missing a required parameter combination.
///
/// Validation happens before any native call is issued.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// The feature can only be configured on a single vCPU.
    #[error("{feature} requires an explicit vcpu")]
    VcpuRequired {
        /// The feature being configured.
        feature: &'static str,
    },

    /// A debug request names neither single-step, watchpoint, nor an address.
    #[error("debug requires single-step, a watchpoint or an address")]
    DebugTargetMissing,
}
