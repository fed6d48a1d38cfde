//! AArch64 architecture definitions for the VMI bridge.
//!
//! Provides the register proxy, event decoder and feature requests of ARM64
//! guests.

mod event;
mod feature;
mod filter;
pub mod raw;
mod registers;
mod tcr;

#[cfg(test)]
mod event_tests;
#[cfg(test)]
mod mock_tests;

use vmi_bridge_core::{Architecture, RawEvent, VmiError};

pub use self::{
    event::{EventReason, EventTaskSwitch, TaskSwitchRegister},
    feature::{Aarch64Features, Feature, TaskSwitchFeature},
    filter::TaskSwitchFilter,
    raw::RawRegisters,
    registers::{RegisterDump, Registers},
    tcr::Tcr,
};

/// AArch64 architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aarch64;

impl Architecture for Aarch64 {
    const NAME: &'static str = "aarch64";
    const PAGE_SIZE: u64 = 0x1000;
    const PAGE_SHIFT: u64 = 12;
    const PAGE_MASK: u64 = 0xFFFFFFFFFFFFF000;

    type Registers = Registers;
    type EventReason = EventReason;
    type Feature = Feature;

    fn decode_event(raw: &RawEvent) -> Result<EventReason, VmiError> {
        let reason = EventReason::decode(raw)?;
        tracing::trace!(%reason, "decoded trap");
        Ok(reason)
    }
}
