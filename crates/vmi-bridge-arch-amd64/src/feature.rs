use vmi_bridge_core::{
    DebugFeature, FeatureScope, RawFeatureRequest, SlpFeature, ValidationError, VcpuId,
    VmiDriver, VmiError, VmiSession,
};

use crate::{
    Amd64, Cr3, LbrSelect,
    raw::{
        FEATURE_DEBUG, FEATURE_LBR, FEATURE_MTF, FEATURE_SLP, FEATURE_TASK_SWITCH, RawLbrFeature,
        RawMtfFeature, RawTaskSwitchFeature,
    },
};

/// Task switch trap request.
///
/// Without `cr3`, every address space switch is trapped. With `cr3`, only
/// switches to (`incoming`) or away from (`outgoing`) that address space
/// are trapped. Always applies to every vCPU.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSwitchFeature {
    /// Enables or disables the trap.
    pub enable: bool,

    /// The address space to trap.
    pub cr3: Option<Cr3>,

    /// Trap switches to `cr3`.
    pub incoming: bool,

    /// Trap switches away from `cr3`.
    pub outgoing: bool,
}

/// Last branch record request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LbrFeature {
    /// Enables or disables recording.
    pub enable: bool,

    /// Branch types to suppress.
    pub select: LbrSelect,

    /// Restricts the request to a single vCPU.
    pub vcpu_id: Option<VcpuId>,
}

/// Monitor trap flag request. Requires an explicit vCPU.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MtfFeature {
    /// Enables or disables the trap.
    pub enable: bool,

    /// The vCPU to single-step.
    pub vcpu_id: Option<VcpuId>,
}

/// A feature request on AMD64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Task switch trap.
    TaskSwitch(TaskSwitchFeature),

    /// Second-level paging trap.
    Slp(SlpFeature),

    /// Debug trap.
    Debug(DebugFeature),

    /// Last branch record.
    Lbr(LbrFeature),

    /// Monitor trap flag.
    Mtf(MtfFeature),
}

impl vmi_bridge_core::Feature for Feature {
    type Architecture = Amd64;

    fn name(&self) -> &'static str {
        match self {
            Self::TaskSwitch(_) => "task-switch",
            Self::Slp(_) => "slp",
            Self::Debug(_) => "debug",
            Self::Lbr(_) => "lbr",
            Self::Mtf(_) => "mtf",
        }
    }

    fn scope(&self) -> FeatureScope {
        match self {
            Self::TaskSwitch(_) => FeatureScope::All,
            Self::Slp(feature) => feature.vcpu_id.into(),
            Self::Debug(feature) => feature.vcpu_id.into(),
            Self::Lbr(feature) => feature.vcpu_id.into(),
            Self::Mtf(feature) => feature.vcpu_id.into(),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Debug(feature) => feature.validate(),
            Self::Mtf(feature) if feature.vcpu_id.is_none() => {
                Err(ValidationError::VcpuRequired { feature: "mtf" })
            }
            _ => Ok(()),
        }
    }

    fn to_raw(&self) -> RawFeatureRequest {
        match self {
            Self::TaskSwitch(feature) => RawFeatureRequest::new(
                FEATURE_TASK_SWITCH,
                &RawTaskSwitchFeature {
                    enable: feature.enable as u8,
                    incoming: feature.incoming as u8,
                    outgoing: feature.outgoing as u8,
                    has_cr3: feature.cr3.is_some() as u8,
                    _reserved: [0; 4],
                    cr3: feature.cr3.map(u64::from).unwrap_or_default(),
                },
            ),
            Self::Slp(feature) => RawFeatureRequest::new(FEATURE_SLP, &feature.to_raw()),
            Self::Debug(feature) => RawFeatureRequest::new(FEATURE_DEBUG, &feature.to_raw()),
            Self::Lbr(feature) => RawFeatureRequest::new(
                FEATURE_LBR,
                &RawLbrFeature {
                    enable: feature.enable as u8,
                    _reserved: [0; 7],
                    select: feature.select.bits(),
                },
            ),
            Self::Mtf(feature) => RawFeatureRequest::new(
                FEATURE_MTF,
                &RawMtfFeature {
                    enable: feature.enable as u8,
                    _reserved: [0; 7],
                },
            ),
        }
    }
}

impl From<TaskSwitchFeature> for Feature {
    fn from(value: TaskSwitchFeature) -> Self {
        Self::TaskSwitch(value)
    }
}

impl From<SlpFeature> for Feature {
    fn from(value: SlpFeature) -> Self {
        Self::Slp(value)
    }
}

impl From<DebugFeature> for Feature {
    fn from(value: DebugFeature) -> Self {
        Self::Debug(value)
    }
}

impl From<LbrFeature> for Feature {
    fn from(value: LbrFeature) -> Self {
        Self::Lbr(value)
    }
}

impl From<MtfFeature> for Feature {
    fn from(value: MtfFeature) -> Self {
        Self::Mtf(value)
    }
}

/// Per-feature configuration on an AMD64 session.
pub trait Amd64Features {
    /// Enables or disables the task switch trap.
    fn update_feature_task_switch(&self, feature: TaskSwitchFeature) -> Result<(), VmiError>;

    /// Enables or disables a second-level paging trap.
    fn update_feature_slp(&self, feature: SlpFeature) -> Result<(), VmiError>;

    /// Enables or disables a debug trap.
    fn update_feature_debug(&self, feature: DebugFeature) -> Result<(), VmiError>;

    /// Enables or disables last branch recording.
    fn update_feature_lbr(&self, feature: LbrFeature) -> Result<(), VmiError>;

    /// Enables or disables monitor trap flag single-stepping.
    fn update_feature_mtf(&self, feature: MtfFeature) -> Result<(), VmiError>;
}

impl<Driver> Amd64Features for VmiSession<Driver>
where
    Driver: VmiDriver<Architecture = Amd64>,
{
    fn update_feature_task_switch(&self, feature: TaskSwitchFeature) -> Result<(), VmiError> {
        self.update_feature(&feature.into())
    }

    fn update_feature_slp(&self, feature: SlpFeature) -> Result<(), VmiError> {
        self.update_feature(&feature.into())
    }

    fn update_feature_debug(&self, feature: DebugFeature) -> Result<(), VmiError> {
        self.update_feature(&feature.into())
    }

    fn update_feature_lbr(&self, feature: LbrFeature) -> Result<(), VmiError> {
        self.update_feature(&feature.into())
    }

    fn update_feature_mtf(&self, feature: MtfFeature) -> Result<(), VmiError> {
        self.update_feature(&feature.into())
    }
}
