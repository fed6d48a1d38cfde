//! AMD64 architecture definitions for the VMI bridge.
//!
//! Provides the register proxy, event decoder and feature requests of
//! x86_64 guests, plus reference-counted last branch record control.

mod cr;
mod event;
mod feature;
mod filter;
mod lbr;
pub mod raw;
mod registers;
mod rflags;
mod segment;

#[cfg(test)]
mod event_tests;
#[cfg(test)]
mod lbr_tests;
#[cfg(test)]
mod registers_tests;

use vmi_bridge_core::{Architecture, RawEvent, VmiError};

pub use self::{
    cr::{Cr0, Cr2, Cr3, Cr4},
    event::{EventReason, EventTaskSwitch},
    feature::{Amd64Features, Feature, LbrFeature, MtfFeature, TaskSwitchFeature},
    filter::TaskSwitchFilter,
    lbr::{LbrDriver, LbrMonitor, LbrSelect, LbrState},
    raw::{RawRegisters, RawSegment},
    registers::{RegisterDump, Registers},
    rflags::Rflags,
    segment::{DescriptorTable, SegmentDescriptor, SegmentFlags, Selector},
};

/// AMD64 architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amd64;

impl Architecture for Amd64 {
    const NAME: &'static str = "amd64";
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
