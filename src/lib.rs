//! Typed, architecture-neutral bridge over a hypervisor's raw introspection
//! interface.
//!
//! The core types live at the crate root. Architecture definitions are
//! re-exported under [`arch`], drivers under `driver`.

pub use vmi_bridge_core::*;

/// Architecture definitions.
pub mod arch {
    #[cfg(feature = "arch-aarch64")]
    pub use vmi_bridge_arch_aarch64 as aarch64;
    #[cfg(feature = "arch-amd64")]
    pub use vmi_bridge_arch_amd64 as amd64;
}

/// Hypervisor drivers.
#[cfg(feature = "driver-qemu")]
pub mod driver {
    pub use vmi_bridge_driver_qemu as qemu;
}
