use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Memory access permission flags.
    ///
    /// Used both for the accesses a second-level paging trap watches for and
    /// for the accesses reported by a violation.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MemoryAccess: u8 {
        /// Read access.
        const R = 0b00000001;

        /// Write access.
        const W = 0b00000010;

        /// Execute access.
        const X = 0b00000100;

        /// Combined Read and Write.
        const RW = Self::R.bits() | Self::W.bits();

        /// Combined Read and Execute.
        const RX = Self::R.bits() | Self::X.bits();

        /// Read, Write and Execute.
        const RWX = Self::R.bits() | Self::W.bits() | Self::X.bits();
    }
}

impl MemoryAccess {
    /// Builds the access set from three wire booleans.
    pub fn from_rwx(read: bool, write: bool, execute: bool) -> Self {
        let mut access = Self::empty();
        access.set(Self::R, read);
        access.set(Self::W, write);
        access.set(Self::X, execute);
        access
    }
}

impl std::fmt::Display for MemoryAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for (flag, c) in [(Self::R, 'r'), (Self::W, 'w'), (Self::X, 'x')] {
            f.write_char(if self.contains(flag) { c } else { '-' })?;
        }

        Ok(())
    }
}
