use vmi_bridge_core::{
    DebugFeature, FeatureScope, RawFeatureRequest, SlpFeature, ValidationError, VmiDriver,
    VmiError, VmiSession,
};

use crate::{
    Aarch64, TaskSwitchRegister,
    raw::{FEATURE_DEBUG, FEATURE_SLP, FEATURE_TASK_SWITCH, RawTaskSwitchFeature},
};

/// Task switch trap request. Always applies to every vCPU.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSwitchFeature {
    /// Enables or disables the trap.
    pub enable: bool,

    /// The register whose writes are trapped.
    pub register: TaskSwitchRegister,
}

/// A feature request on AArch64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Task switch trap.
    TaskSwitch(TaskSwitchFeature),

    /// Second-level paging trap.
    Slp(SlpFeature),

    /// Debug trap.
    Debug(DebugFeature),
}

impl vmi_bridge_core::Feature for Feature {
    type Architecture = Aarch64;

    fn name(&self) -> &'static str {
        match self {
            Self::TaskSwitch(_) => "task-switch",
            Self::Slp(_) => "slp",
            Self::Debug(_) => "debug",
        }
    }

    fn scope(&self) -> FeatureScope {
        match self {
            Self::TaskSwitch(_) => FeatureScope::All,
            Self::Slp(feature) => feature.vcpu_id.into(),
            Self::Debug(feature) => feature.vcpu_id.into(),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Debug(feature) => feature.validate(),
            _ => Ok(()),
        }
    }

    fn to_raw(&self) -> RawFeatureRequest {
        match self {
            Self::TaskSwitch(feature) => RawFeatureRequest::new(
                FEATURE_TASK_SWITCH,
                &RawTaskSwitchFeature {
                    enable: feature.enable as u8,
                    _reserved: [0; 3],
                    reg: feature.register.selector(),
                },
            ),
            Self::Slp(feature) => RawFeatureRequest::new(FEATURE_SLP, &feature.to_raw()),
            Self::Debug(feature) => RawFeatureRequest::new(FEATURE_DEBUG, &feature.to_raw()),
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

/// Per-feature configuration on an AArch64 session.
pub trait Aarch64Features {
    /// Enables or disables the task switch trap.
    fn update_feature_task_switch(&self, feature: TaskSwitchFeature) -> Result<(), VmiError>;

    /// Enables or disables a second-level paging trap.
    fn update_feature_slp(&self, feature: SlpFeature) -> Result<(), VmiError>;

    /// Enables or disables a debug trap.
    fn update_feature_debug(&self, feature: DebugFeature) -> Result<(), VmiError>;
}

impl<Driver> Aarch64Features for VmiSession<Driver>
where
    Driver: VmiDriver<Architecture = Aarch64>,
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
}
