macro_rules! flags {
    ($($name:ident => $bit:expr, $doc:expr;)*) => {
        $(
            #[doc = concat!("Checks if ", $doc, " is set.")]
            pub fn $name(self) -> bool {
                (self.0 >> $bit) & 1 != 0
            }
        )*
    };
}

/// The `RFLAGS` register.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Rflags(pub u64);

impl Rflags {
    flags! {
        carry => 0, "CF";
        zero => 6, "ZF";
        sign => 7, "SF";
        trap => 8, "TF (single-stepping)";
        interrupt_enable => 9, "IF";
        direction => 10, "DF";
        overflow => 11, "OF";
    }

    /// Returns the I/O privilege level.
    pub fn io_privilege_level(self) -> u8 {
        ((self.0 >> 12) & 0b11) as _
    }
}

impl From<u64> for Rflags {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Rflags> for u64 {
    fn from(value: Rflags) -> Self {
        value.0
    }
}
