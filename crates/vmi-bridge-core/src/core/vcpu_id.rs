use serde::{Deserialize, Serialize};

use crate::DecodeError;

/// Index of a virtual CPU.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VcpuId(pub u16);

impl From<u16> for VcpuId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl TryFrom<u32> for VcpuId {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        u16::try_from(value)
            .map(Self)
            .map_err(|_| DecodeError::InvalidVcpu(value))
    }
}

impl From<VcpuId> for u16 {
    fn from(value: VcpuId) -> Self {
        value.0
    }
}

impl From<VcpuId> for u32 {
    fn from(value: VcpuId) -> Self {
        value.0 as u32
    }
}

impl std::fmt::Display for VcpuId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
