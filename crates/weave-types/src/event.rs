use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod kind {
    pub const RENDER_PIPELINE_STAGE: &str = "render.pipeline.stage";
    pub const ASSISTANT_DELTA: &str = "assistant.delta";
    pub const TOOL_CALL_STARTED: &str = "tool.call.started";
    pub const TOOL_CALL_PROGRESS: &str = "tool.call.progress";
    pub const TOOL_CALL_COMPLETED: &str = "tool.call.completed";
    pub const TOOL_CALL_FAILED: &str = "tool.call.failed";
    pub const ARTIFACT_FILE_CHANGED: &str = "artifact.file.changed";
    pub const AGENT_TASK_STARTED: &str = "agent.task.started";
    pub const AGENT_TASK_PROGRESS: &str = "agent.task.progress";
    pub const AGENT_TASK_BLOCKED: &str = "agent.task.blocked";
    pub const AGENT_TASK_COMPLETED: &str = "agent.task.completed";
    pub const AUTONOMY_BUDGET: &str = "autonomy.budget";
    pub const RUN_COMPLETED: &str = "run.completed";
    pub const RUN_ERROR: &str = "run.error";
}

pub fn is_terminal(event_type: &str) -> bool {
    event_type == kind::RUN_COMPLETED || event_type == kind::RUN_ERROR
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEvent {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "runId")]
    pub run_id: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "durationMs", default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl RuntimeEvent {
    /// Payload envelope before the emitter stamps identity and sequence.
    pub fn new(event_type: impl Into<String>, properties: Value) -> Self {
        let properties = match properties {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            session_id: String::new(),
            run_id: String::new(),
            sequence: 0,
            timestamp: Utc::now(),
            duration_ms: None,
            event_type: event_type.into(),
            properties,
        }
    }

    pub fn is_terminal(&self) -> bool {
        is_terminal(&self.event_type)
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_flattens_payload() {
        let mut event = RuntimeEvent::new(kind::ASSISTANT_DELTA, json!({"delta": "hi"}));
        event.session_id = "ses_1".to_string();
        event.run_id = "run_1".to_string();
        event.sequence = 3;
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["sessionId"], "ses_1");
        assert_eq!(value["type"], "assistant.delta");
        assert_eq!(value["delta"], "hi");
        assert_eq!(value["sequence"], 3);
    }

    #[test]
    fn terminal_kinds_are_exactly_two() {
        assert!(is_terminal(kind::RUN_COMPLETED));
        assert!(is_terminal(kind::RUN_ERROR));
        assert!(!is_terminal(kind::AGENT_TASK_COMPLETED));
        assert!(!is_terminal(kind::AUTONOMY_BUDGET));
    }
}
