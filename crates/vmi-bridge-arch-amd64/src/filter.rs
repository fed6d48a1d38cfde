use crate::{Cr3, EventTaskSwitch, TaskSwitchFeature};

/// Matches task switch events against a task switch request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSwitchFilter {
    /// The address space of interest. Matches every switch if `None`.
    pub cr3: Option<Cr3>,

    /// Match switches to `cr3`.
    pub incoming: bool,

    /// Match switches away from `cr3`.
    pub outgoing: bool,
}

impl TaskSwitchFilter {
    /// Checks whether the event belongs to this filter.
    pub fn matches(&self, event: &EventTaskSwitch) -> bool {
        match self.cr3 {
            Some(cr3) => {
                (self.incoming && event.new_cr3 == cr3) || (self.outgoing && event.old_cr3 == cr3)
            }
            None => true,
        }
    }
}

impl From<TaskSwitchFeature> for TaskSwitchFilter {
    fn from(value: TaskSwitchFeature) -> Self {
        Self {
            cr3: value.cr3,
            incoming: value.incoming,
            outgoing: value.outgoing,
        }
    }
}
