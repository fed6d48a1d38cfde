//! Architecture abstraction.
//!
//! Each supported instruction-set architecture provides the layout of its
//! register block, a register proxy over it, a decoder for its trap payloads
//! and the set of features (trap categories) it can configure.

use std::fmt::{Debug, Display};

use crate::{
    EventBreakpoint, EventSingleStep, EventSlp, FeatureScope, Gfn, Pa, RawEvent,
    RawFeatureRequest, RegisterBlock, Va, ValidationError, VcpuId, VmiError,
};

/// Defines an interface for architecture-specific operations and constants.
pub trait Architecture
where
    Self: Debug + Clone + Copy + PartialEq + Sized + 'static,
{
    /// Human readable name of the architecture.
    const NAME: &'static str;

    /// The size of a memory page in bytes.
    const PAGE_SIZE: u64;

    /// The number of bits to shift when converting between page numbers and
    /// physical addresses.
    const PAGE_SHIFT: u64;

    /// A bitmask used to isolate the page number from a full address.
    const PAGE_MASK: u64;

    /// Register proxy over the hypervisor-owned register block.
    type Registers: Registers<Architecture = Self>;

    /// Architecture-specific guest CPU trap.
    type EventReason: EventReason<Architecture = Self>;

    /// Architecture-specific feature request.
    type Feature: Feature<Architecture = Self>;

    /// Converts a guest physical address to a guest frame number.
    fn gfn_from_pa(pa: Pa) -> Gfn {
        Gfn(pa.0 >> Self::PAGE_SHIFT)
    }

    /// Converts a guest frame number to a guest physical address.
    fn pa_from_gfn(gfn: Gfn) -> Pa {
        Pa(gfn.0 << Self::PAGE_SHIFT)
    }

    /// Extracts the offset within a page from a physical address.
    fn pa_offset(pa: Pa) -> u64 {
        pa.0 & !Self::PAGE_MASK
    }

    /// Extracts the offset within a page from a virtual address.
    fn va_offset(va: Va) -> u64 {
        va.0 & !Self::PAGE_MASK
    }

    /// Decodes the payload of a guest CPU trap.
    ///
    /// Only called for records whose type is [`RawEvent::VMI`].
    fn decode_event(raw: &RawEvent) -> Result<Self::EventReason, VmiError>;
}

/// The layout of the register block of an architecture.
pub type RawRegisters<Arch> = <<Arch as Architecture>::Registers as Registers>::Raw;

/// Register proxy of a single vCPU.
///
/// A proxy does not own register values. Every accessor reads from, or
/// writes to, the hypervisor-owned block it is bound to, and fails with
/// [`VmiError::StaleRegisters`] once the VM has resumed since the last bind.
pub trait Registers
where
    Self: Debug + Sized,
{
    /// The specific CPU architecture implementation.
    type Architecture: Architecture;

    /// The layout of the hypervisor-owned register block.
    type Raw;

    /// Wraps a register block binding.
    fn new(block: RegisterBlock<Self::Raw>) -> Self;

    /// Returns the underlying binding.
    fn block(&self) -> &RegisterBlock<Self::Raw>;

    /// Returns the vCPU this proxy belongs to.
    fn vcpu_id(&self) -> VcpuId {
        self.block().vcpu_id()
    }

    /// Checks whether the proxy is bound to the current pause.
    fn is_bound(&self) -> bool {
        self.block().is_bound()
    }

    /// Checks whether a register was written since the last bind.
    fn is_dirty(&self) -> bool {
        self.block().is_dirty()
    }

    /// Returns the current value of the instruction pointer.
    fn instruction_pointer(&self) -> Result<u64, VmiError>;

    /// Sets the value of the instruction pointer.
    fn set_instruction_pointer(&self, ip: u64) -> Result<(), VmiError>;

    /// Returns the current value of the stack pointer.
    fn stack_pointer(&self) -> Result<u64, VmiError>;

    /// Sets the value of the stack pointer.
    fn set_stack_pointer(&self, sp: u64) -> Result<(), VmiError>;

    /// Returns the current value of the result register.
    fn result(&self) -> Result<u64, VmiError>;

    /// Sets the value of the result register.
    fn set_result(&self, result: u64) -> Result<(), VmiError>;

    /// Returns the effective pointer width of the vCPU in bytes.
    fn address_width(&self) -> Result<usize, VmiError>;

    /// Returns the page table base that translates `va`.
    fn page_table_base(&self, va: Va) -> Result<Pa, VmiError>;

    /// Renders every register as text.
    ///
    /// The output is a pure function of the bound register values.
    fn dump(&self) -> Result<String, VmiError>;
}

/// A guest CPU trap.
pub trait EventReason
where
    Self: Debug + Display + Clone + Copy + PartialEq,
{
    /// The specific CPU architecture implementation.
    type Architecture: Architecture;

    /// Returns the vCPU that caused the trap.
    fn vcpu_id(&self) -> VcpuId;

    /// If the trap is a second-level paging violation, returns its details.
    fn as_slp(&self) -> Option<&EventSlp>;

    /// If the trap is a single-step notification, returns its details.
    fn as_single_step(&self) -> Option<&EventSingleStep>;

    /// If the trap is a breakpoint, returns its details.
    fn as_breakpoint(&self) -> Option<&EventBreakpoint>;
}

/// A request enabling or disabling a trap category.
pub trait Feature
where
    Self: Debug,
{
    /// The specific CPU architecture implementation.
    type Architecture: Architecture;

    /// Name of the feature, used in errors and logs.
    fn name(&self) -> &'static str;

    /// The vCPUs the request applies to.
    fn scope(&self) -> FeatureScope;

    /// Checks the parameter combination of the request.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Builds the wire request.
    fn to_raw(&self) -> RawFeatureRequest;
}
