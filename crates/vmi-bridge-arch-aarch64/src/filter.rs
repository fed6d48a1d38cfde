use crate::{EventTaskSwitch, TaskSwitchFeature, TaskSwitchRegister};

/// Matches task switch events against a task switch request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSwitchFilter {
    /// The register of interest.
    pub register: TaskSwitchRegister,
}

impl TaskSwitchFilter {
    /// Checks whether the event belongs to this filter.
    pub fn matches(&self, event: &EventTaskSwitch) -> bool {
        event.register == self.register
    }
}

impl From<TaskSwitchFeature> for TaskSwitchFilter {
    fn from(value: TaskSwitchFeature) -> Self {
        Self {
            register: value.register,
        }
    }
}
