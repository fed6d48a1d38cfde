//! Core of the VMI bridge.
//!
//! Turns the raw, pointer-based introspection interface of a hypervisor
//! into typed events, bounded register proxies, checked memory accessors and
//! validated feature requests. The raw surface is abstracted by the
//! [`VmiDriver`] trait. Architecture specifics (register layouts, trap
//! payloads, feature identifiers) are provided by [`Architecture`]
//! implementations in separate crates.

mod arch;
mod cancel;
mod config;
mod core;
mod driver;
mod error;
mod event;
mod feature;
mod filter;
mod handler;
mod memory;
mod registers;
mod session;


pub use self::{
    arch::{Architecture, EventReason, Feature, RawRegisters, Registers},
    cancel::CancellationToken,
    config::VmiConfig,
    core::{Gfn, MemoryAccess, Pa, Va, VcpuId, VmiInfo},
    driver::{TRANSLATION_FAILED, VmiDriver, WaitError, WaitStatus},
    error::{DecodeError, ValidationError, VmiError},
    event::{
        EventBreakpoint, EventSingleStep, EventSlp, RAW_EVENT_PAYLOAD_SIZE, RawEvent,
        SingleStepMethod, SystemEvent, VmiEvent,
    },
    feature::{
        DebugFeature, FeatureScope, RAW_FEATURE_PAYLOAD_SIZE, RawDebugFeature,
        RawFeatureRequest, RawSlpFeature, SlpFeature,
    },
    filter::{BreakpointFilter, SlpFilter},
    handler::VmiHandler,
    registers::{CpuRegistry, RegisterBlock},
    session::{DriverFeature, DriverRegisters, SessionState, VmiSession},
};
