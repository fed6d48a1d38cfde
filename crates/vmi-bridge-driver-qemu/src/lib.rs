//! VMI driver for QEMU.
//!
//! Binds to the introspection interface exported by a QEMU process that
//! embeds the bridge. The symbols are resolved when the bridge is loaded
//! into the hypervisor.

mod driver;
mod error;
mod ffi;

pub use self::{driver::QemuDriver, error::Error};

/// QEMU driver for AMD64 guests.
pub type QemuDriverAmd64 = QemuDriver<vmi_bridge_arch_amd64::Amd64>;

/// QEMU driver for AArch64 guests.
pub type QemuDriverAarch64 = QemuDriver<vmi_bridge_arch_aarch64::Aarch64>;
