/// Translation Control Register (`TCR_ELx`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tcr(pub u64);

impl Tcr {
    /// Returns the size offset of the region addressed by `TTBR0` (T0SZ).
    ///
    /// The region spans `2^(64 - T0SZ)` bytes.
    pub fn t0sz(self) -> u8 {
        (self.0 & 0x3f) as _
    }

    /// Returns the size offset of the region addressed by `TTBR1` (T1SZ).
    pub fn t1sz(self) -> u8 {
        ((self.0 >> 16) & 0x3f) as _
    }

    /// Returns the mask of the upper address bits that select `TTBR1`.
    ///
    /// Empty when T0SZ is zero.
    pub fn ttbr1_mask(self) -> u64 {
        u64::MAX
            .checked_shl(64 - u32::from(self.t0sz()))
            .unwrap_or(0)
    }
}

impl From<u64> for Tcr {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Tcr> for u64 {
    fn from(value: Tcr) -> Self {
        value.0
    }
}
