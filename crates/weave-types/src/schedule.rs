use serde::{Deserialize, Serialize};

use crate::ExecutionMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTaskGroup {
    pub wave: usize,
    pub mode: ExecutionMode,
    pub task_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSchedule {
    pub groups: Vec<ScheduledTaskGroup>,
    pub ordered_task_ids: Vec<String>,
    pub has_cycle: bool,
    /// Tasks left unplaceable when a cycle remains, in insertion order.
    #[serde(default)]
    pub residual_task_ids: Vec<String>,
}

impl ExecutionSchedule {
    pub fn wave_of(&self, task_id: &str) -> Option<usize> {
        self.groups
            .iter()
            .find(|g| g.task_ids.iter().any(|id| id == task_id))
            .map(|g| g.wave)
    }
}
