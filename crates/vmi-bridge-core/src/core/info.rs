use serde::{Deserialize, Serialize};

/// Static properties of the introspected virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmiInfo {
    /// The size of a page in bytes.
    pub page_size: u64,

    /// The shift value to convert a page number to a page address.
    pub page_shift: u64,

    /// The size of guest RAM in bytes.
    pub ram_size: u64,

    /// The number of virtual CPUs.
    pub vcpus: u16,
}
