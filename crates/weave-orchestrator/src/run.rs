use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use weave_events::{EventBus, RunEmitter};

/// One pipeline execution. Components take the run as an explicit parameter:
/// it owns the cancellation token, the sequenced emitter, and nothing else is
/// ambient.
#[derive(Clone)]
pub struct Run {
    pub session_id: String,
    pub run_id: String,
    pub cancel: CancellationToken,
    pub emitter: RunEmitter,
}

impl Run {
    pub fn new(session_id: impl Into<String>, bus: EventBus) -> Self {
        Self::with_cancel(session_id, bus, CancellationToken::new())
    }

    pub fn with_cancel(
        session_id: impl Into<String>,
        bus: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        let session_id = session_id.into();
        let run_id = format!("run_{}", Uuid::new_v4().simple());
        let emitter = RunEmitter::new(session_id.clone(), run_id.clone(), bus, cancel.clone());
        Self {
            session_id,
            run_id,
            cancel,
            emitter,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Per-session cancellation handles so a transport can abort a running
/// session. Creating a new token for a session cancels the previous one.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, session_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self
            .tokens
            .write()
            .await
            .insert(session_id.to_string(), token.clone())
        {
            previous.cancel();
        }
        token
    }

    pub async fn cancel(&self, session_id: &str) -> bool {
        match self.tokens.read().await.get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, session_id: &str) {
        self.tokens.write().await.remove(session_id);
    }
}
