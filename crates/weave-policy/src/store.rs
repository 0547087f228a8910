use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{ReadBudgetTracker, SessionContractPolicy};

/// Capability handle for per-session policy records. Implementations keep the
/// records under a per-session lock and clear them on session deletion.
#[async_trait]
pub trait SessionPolicyStore: Send + Sync {
    async fn contract(&self, session_id: &str) -> SessionContractPolicy;
    async fn set_contract(&self, session_id: &str, policy: SessionContractPolicy);
    async fn clear_session(&self, session_id: &str);
    fn read_budget(&self) -> &ReadBudgetTracker;
}

#[derive(Clone, Default)]
pub struct MemoryPolicyStore {
    contracts: Arc<RwLock<HashMap<String, SessionContractPolicy>>>,
    read_budget: ReadBudgetTracker,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionPolicyStore for MemoryPolicyStore {
    async fn contract(&self, session_id: &str) -> SessionContractPolicy {
        self.contracts
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn set_contract(&self, session_id: &str, policy: SessionContractPolicy) {
        self.contracts
            .write()
            .await
            .insert(session_id.to_string(), policy);
    }

    async fn clear_session(&self, session_id: &str) {
        self.contracts.write().await.remove(session_id);
        self.read_budget.clear_session(session_id);
    }

    fn read_budget(&self) -> &ReadBudgetTracker {
        &self.read_budget
    }
}
