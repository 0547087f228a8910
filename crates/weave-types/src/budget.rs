use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunBudget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_calls: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_score: Option<u32>,
}

impl RunBudget {
    pub fn is_empty(&self) -> bool {
        self.max_steps.is_none()
            && self.max_tool_calls.is_none()
            && self.max_duration_ms.is_none()
            && self.target_score.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    Ok,
    Warning,
    Exhausted,
}

/// Warning once no more than a fifth of the limit remains.
pub fn budget_status(used: u64, limit: u64) -> BudgetStatus {
    if limit == 0 || used >= limit {
        return BudgetStatus::Exhausted;
    }
    let remaining = limit - used;
    if (remaining as f64) / (limit as f64) <= 0.2 {
        BudgetStatus::Warning
    } else {
        BudgetStatus::Ok
    }
}
