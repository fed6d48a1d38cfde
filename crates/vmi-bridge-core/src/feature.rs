use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Gfn, MemoryAccess, Pa, SlpFilter, ValidationError, VcpuId};

/// Size of the payload area of a [`RawFeatureRequest`].
pub const RAW_FEATURE_PAYLOAD_SIZE: usize = 32;

/// The feature request record shared with the hypervisor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawFeatureRequest {
    /// Architecture-specific feature identifier.
    pub feature: u32,

    /// Reserved.
    pub _reserved: u32,

    /// Feature payload.
    pub payload: [u8; RAW_FEATURE_PAYLOAD_SIZE],
}

impl RawFeatureRequest {
    /// Creates a request carrying `payload`.
    ///
    /// # Panics
    ///
    /// Panics if `payload` is larger than [`RAW_FEATURE_PAYLOAD_SIZE`].
    pub fn new<T>(feature: u32, payload: &T) -> Self
    where
        T: IntoBytes + Immutable,
    {
        let mut result = Self {
            feature,
            _reserved: 0,
            payload: [0; RAW_FEATURE_PAYLOAD_SIZE],
        };

        let bytes = payload.as_bytes();
        result.payload[..bytes.len()].copy_from_slice(bytes);
        result
    }

    /// Reads the payload as `T`.
    pub fn payload<T>(&self) -> Option<T>
    where
        T: FromBytes,
    {
        T::read_from_prefix(&self.payload)
            .ok()
            .map(|(value, _)| value)
    }
}

/// The vCPUs a feature request applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureScope {
    /// Every vCPU of the VM.
    All,

    /// A single vCPU.
    Vcpu(VcpuId),
}

impl From<Option<VcpuId>> for FeatureScope {
    fn from(value: Option<VcpuId>) -> Self {
        match value {
            Some(vcpu_id) => Self::Vcpu(vcpu_id),
            None => Self::All,
        }
    }
}

/// Second-level paging trap request.
///
/// Either applies to all of guest memory (`global`), or to `num_pages`
/// pages starting at `gfn`. Missing range parts are encoded as zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SlpFeature {
    /// Enables or disables the trap.
    pub enable: bool,

    /// Trap accesses anywhere in guest memory.
    pub global: bool,

    /// First page of the trapped range.
    pub gfn: Option<Gfn>,

    /// Number of pages of the trapped range.
    pub num_pages: Option<u64>,

    /// The accesses to trap.
    pub access: MemoryAccess,

    /// Restricts the request to a single vCPU.
    pub vcpu_id: Option<VcpuId>,
}

/// Wire layout of [`SlpFeature`].
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawSlpFeature {
    /// Non-zero to enable.
    pub enable: u8,

    /// Non-zero to trap all of guest memory.
    pub global: u8,

    /// Non-zero to trap reads.
    pub read: u8,

    /// Non-zero to trap writes.
    pub write: u8,

    /// Non-zero to trap execution.
    pub execute: u8,

    /// Reserved.
    pub _reserved: [u8; 3],

    /// First page of the range, or zero.
    pub gfn: u64,

    /// Number of pages of the range, or zero.
    pub num_pages: u64,
}

impl SlpFeature {
    /// Builds the wire payload.
    pub fn to_raw(&self) -> RawSlpFeature {
        RawSlpFeature {
            enable: self.enable as u8,
            global: self.global as u8,
            read: self.access.contains(MemoryAccess::R) as u8,
            write: self.access.contains(MemoryAccess::W) as u8,
            execute: self.access.contains(MemoryAccess::X) as u8,
            _reserved: [0; 3],
            gfn: self.gfn.map(u64::from).unwrap_or_default(),
            num_pages: self.num_pages.unwrap_or_default(),
        }
    }

    /// Returns a filter that matches the violations this request produces.
    pub fn filter(&self) -> SlpFilter {
        SlpFilter {
            global: self.global,
            gfn: self.gfn,
            num_pages: self.num_pages,
            access: self.access,
        }
    }
}

/// Debug trap request.
///
/// Enables single-stepping, a watchpoint, or a breakpoint at a physical
/// address.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DebugFeature {
    /// Enables or disables the trap.
    pub enable: bool,

    /// Single-step the vCPU.
    pub single_step: bool,

    /// Use a watchpoint instead of a breakpoint.
    pub watchpoint: bool,

    /// Physical address of the breakpoint or watchpoint.
    pub pa: Option<Pa>,

    /// Restricts the request to a single vCPU.
    pub vcpu_id: Option<VcpuId>,
}

/// Wire layout of [`DebugFeature`].
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawDebugFeature {
    /// Non-zero to enable.
    pub enable: u8,

    /// Non-zero to single-step.
    pub single_step: u8,

    /// Non-zero for a watchpoint.
    pub watchpoint: u8,

    /// Non-zero if `pa` is valid.
    pub has_address: u8,

    /// Reserved.
    pub _reserved: [u8; 4],

    /// Physical address of the breakpoint or watchpoint.
    pub pa: u64,
}

impl DebugFeature {
    /// Checks the parameter combination.
    ///
    /// At least one target must be given, and single-stepping needs an
    /// explicit vCPU.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.single_step && !self.watchpoint && self.pa.is_none() {
            return Err(ValidationError::DebugTargetMissing);
        }

        if self.single_step && self.vcpu_id.is_none() {
            return Err(ValidationError::VcpuRequired {
                feature: "single-step",
            });
        }

        Ok(())
    }

    /// Builds the wire payload.
    pub fn to_raw(&self) -> RawDebugFeature {
        RawDebugFeature {
            enable: self.enable as u8,
            single_step: self.single_step as u8,
            watchpoint: self.watchpoint as u8,
            has_address: self.pa.is_some() as u8,
            _reserved: [0; 4],
            pa: self.pa.map(u64::from).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_requires_target() {
        let feature = DebugFeature {
            enable: true,
            ..Default::default()
        };

        assert_eq!(feature.validate(), Err(ValidationError::DebugTargetMissing));
    }

    #[test]
    fn single_step_requires_vcpu() {
        let feature = DebugFeature {
            enable: true,
            single_step: true,
            ..Default::default()
        };

        assert_eq!(
            feature.validate(),
            Err(ValidationError::VcpuRequired {
                feature: "single-step"
            })
        );

        let feature = DebugFeature {
            vcpu_id: Some(VcpuId(1)),
            ..feature
        };

        assert_eq!(feature.validate(), Ok(()));
    }

    #[test]
    fn breakpoint_without_vcpu() {
        let feature = DebugFeature {
            enable: true,
            pa: Some(Pa(0x1000)),
            ..Default::default()
        };

        assert_eq!(feature.validate(), Ok(()));
        assert_eq!(feature.to_raw().has_address, 1);
        assert_eq!(feature.to_raw().pa, 0x1000);
    }

    #[test]
    fn slp_missing_range_is_zero() {
        let feature = SlpFeature {
            enable: true,
            global: true,
            access: MemoryAccess::W,
            ..Default::default()
        };

        let raw = feature.to_raw();
        assert_eq!(raw.gfn, 0);
        assert_eq!(raw.num_pages, 0);
        assert_eq!((raw.read, raw.write, raw.execute), (0, 1, 0));

        let request = RawFeatureRequest::new(1, &raw);
        assert_eq!(request.payload::<RawSlpFeature>(), Some(raw));
    }
}
