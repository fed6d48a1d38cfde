use crate::RawSegment;

/// A segment selector.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Selector(pub u16);

impl Selector {
    /// Returns the Requested Privilege Level (RPL).
    pub fn request_privilege_level(self) -> u8 {
        (self.0 & 0b11) as _
    }

    /// Checks if the selector refers to the LDT (TI flag).
    pub fn local(self) -> bool {
        (self.0 >> 2) & 1 != 0
    }

    /// Returns the index of the descriptor in the GDT or LDT.
    pub fn index(self) -> u16 {
        self.0 >> 3
    }
}

/// Attribute flags of a cached segment descriptor.
///
/// The flags use the layout of the high doubleword of an in-memory segment
/// descriptor (type at bit 8, S at 12, DPL at 13, P at 15, AVL at 20, L at
/// 21, D/B at 22 and G at 23).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SegmentFlags(pub u32);

impl SegmentFlags {
    /// Returns the segment or gate type.
    pub fn typ(self) -> u8 {
        ((self.0 >> 8) & 0b1111) as _
    }

    /// Checks if the descriptor is a code or data descriptor (S flag).
    pub fn code_or_data(self) -> bool {
        (self.0 >> 12) & 1 != 0
    }

    /// Returns the Descriptor Privilege Level (DPL).
    pub fn descriptor_privilege_level(self) -> u8 {
        ((self.0 >> 13) & 0b11) as _
    }

    /// Checks if the segment is present (P flag).
    pub fn present(self) -> bool {
        (self.0 >> 15) & 1 != 0
    }

    /// Checks if a code segment contains native 64-bit code (L flag).
    pub fn long_mode(self) -> bool {
        (self.0 >> 21) & 1 != 0
    }

    /// Checks if the segment uses 32-bit default operation size (D/B flag).
    pub fn default_big(self) -> bool {
        (self.0 >> 22) & 1 != 0
    }

    /// Checks if the limit is scaled by 4 KiB (G flag).
    pub fn granularity(self) -> bool {
        (self.0 >> 23) & 1 != 0
    }
}

/// A cached segment register.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// The selector of the segment.
    pub selector: Selector,

    /// Linear address of byte 0 of the segment.
    pub base: u64,

    /// The segment limit.
    pub limit: u32,

    /// Attribute flags.
    pub flags: SegmentFlags,
}

impl From<RawSegment> for SegmentDescriptor {
    fn from(value: RawSegment) -> Self {
        Self {
            selector: Selector(value.selector as u16),
            base: value.base,
            limit: value.limit,
            flags: SegmentFlags(value.flags),
        }
    }
}

impl From<SegmentDescriptor> for RawSegment {
    fn from(value: SegmentDescriptor) -> Self {
        Self {
            selector: value.selector.0 as u32,
            _reserved: 0,
            base: value.base,
            limit: value.limit,
            flags: value.flags.0,
        }
    }
}

/// A descriptor table register (GDTR or IDTR).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorTable {
    /// Linear address of the table.
    pub base: u64,

    /// The size of the table.
    pub limit: u32,
}

impl From<RawSegment> for DescriptorTable {
    fn from(value: RawSegment) -> Self {
        Self {
            base: value.base,
            limit: value.limit,
        }
    }
}
