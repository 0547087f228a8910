use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use weave_types::ExecutionPlan;

pub const KEY_ANALYSIS_DOCUMENTS: &str = "analysis.documents";
pub const KEY_PLAN: &str = "plan";
pub const KEY_EXECUTION_SUMMARY: &str = "execution.summary";

/// In-run shared store for session documents and the execution plan. Each
/// stage persists its output here before the next stage starts.
#[derive(Clone, Default)]
pub struct Blackboard {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, key: &str, value: Value) {
        self.entries.write().await.insert(key.to_string(), value);
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn set_plan(&self, plan: &ExecutionPlan) {
        if let Ok(value) = serde_json::to_value(plan) {
            self.put(KEY_PLAN, value).await;
        }
    }

    pub async fn plan(&self) -> Option<ExecutionPlan> {
        let value = self.get(KEY_PLAN).await?;
        serde_json::from_value(value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn documents_round_trip() {
        let blackboard = Blackboard::new();
        blackboard
            .put(KEY_ANALYSIS_DOCUMENTS, json!({"requirements": "doc"}))
            .await;
        let value = blackboard.get(KEY_ANALYSIS_DOCUMENTS).await.expect("value");
        assert_eq!(value["requirements"], "doc");
        assert!(blackboard.get(KEY_PLAN).await.is_none());
    }
}
