use serde::{Deserialize, Serialize};

use crate::TaskPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionResult {
    pub task_id: String,
    pub phase: TaskPhase,
    pub status: TaskStatus,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default)]
    pub tool_calls: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl TaskExecutionResult {
    pub fn completed(task_id: impl Into<String>, phase: TaskPhase) -> Self {
        Self {
            task_id: task_id.into(),
            phase,
            status: TaskStatus::Completed,
            files_changed: Vec::new(),
            tool_calls: 0,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn failed(task_id: impl Into<String>, phase: TaskPhase, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            phase,
            status: TaskStatus::Failed,
            files_changed: Vec::new(),
            tool_calls: 0,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionIssue {
    pub severity: IssueSeverity,
    pub category: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Component scores all live in [0, 100].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reflection {
    pub score: u32,
    pub demand_match: u32,
    pub consistency: u32,
    pub code_quality: u32,
    pub best_practice: u32,
    pub should_iterate: bool,
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<ReflectionIssue>,
}
