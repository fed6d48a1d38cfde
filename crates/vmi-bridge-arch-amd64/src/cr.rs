macro_rules! impl_control_register {
    ($name:ident) => {
        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl std::fmt::LowerHex for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::LowerHex::fmt(&self.0, f)
            }
        }
    };
}

/// `CR0` control register.
///
/// Controls the operating mode and state of the processor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cr0(pub u64);

impl Cr0 {
    /// Checks if protected mode is enabled (CR0.PE).
    pub fn protection_enable(self) -> bool {
        self.0 & 1 != 0
    }

    /// Checks if supervisor writes to read-only pages fault (CR0.WP).
    pub fn write_protect(self) -> bool {
        self.0 >> 16 & 1 != 0
    }

    /// Checks if paging is enabled (CR0.PG).
    pub fn paging(self) -> bool {
        self.0 >> 31 & 1 != 0
    }
}

impl_control_register!(Cr0);

/// `CR2` control register.
///
/// Holds the linear address that caused the last page fault.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cr2(pub u64);

impl_control_register!(Cr2);

/// `CR3` control register.
///
/// Holds the physical address of the top-level page table, which identifies
/// the address space of the running task.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct Cr3(pub u64);

impl Cr3 {
    /// Returns the Process Context Identifier (PCID).
    pub fn pcid(self) -> u16 {
        (self.0 & 0xfff) as _
    }

    /// Returns the page frame number of the top-level page table.
    pub fn page_frame_number(self) -> u64 {
        self.0 >> 12 & 0x000f_ffff_ffff_ffff
    }
}

impl std::fmt::Debug for Cr3 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Cr3({:#x})", self.0)
    }
}

impl_control_register!(Cr3);

/// `CR4` control register.
///
/// Enables architectural extensions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cr4(pub u64);

impl Cr4 {
    /// Checks if physical address extension is enabled (CR4.PAE).
    pub fn physical_address_extension(self) -> bool {
        self.0 >> 5 & 1 != 0
    }

    /// Checks if 5-level paging is enabled (CR4.LA57).
    pub fn linear_address_57_bit(self) -> bool {
        self.0 >> 12 & 1 != 0
    }

    /// Checks if supervisor-mode execution prevention is enabled (CR4.SMEP).
    pub fn supervisor_mode_execution_prevention(self) -> bool {
        self.0 >> 20 & 1 != 0
    }

    /// Checks if supervisor-mode access prevention is enabled (CR4.SMAP).
    pub fn supervisor_mode_access_prevention(self) -> bool {
        self.0 >> 21 & 1 != 0
    }
}

impl_control_register!(Cr4);
