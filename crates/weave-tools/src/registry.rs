use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use weave_policy::SessionPolicyStore;
use weave_store::FileStore;
use weave_types::{SessionMode, ToolResult, ToolSchema};

use crate::{ApplyDiffTool, ReadFileTool, WriteFileTool};

/// Everything a tool needs to act inside one execution iteration.
#[derive(Clone)]
pub struct ToolInvocation {
    pub session_id: String,
    pub iteration: u32,
    pub agent_id: String,
    pub call_id: String,
    pub session_mode: SessionMode,
    pub args: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    async fn execute(&self, invocation: ToolInvocation) -> anyhow::Result<ToolResult>;
}

#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(files: Arc<dyn FileStore>, policies: Arc<dyn SessionPolicyStore>) -> Self {
        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        tools.insert(
            "read_file".to_string(),
            Arc::new(ReadFileTool::new(files.clone(), policies.clone())),
        );
        tools.insert(
            "write_file".to_string(),
            Arc::new(WriteFileTool::new(files.clone(), policies.clone())),
        );
        tools.insert(
            "apply_diff".to_string(),
            Arc::new(ApplyDiffTool::new(files, policies)),
        );
        Self { tools }
    }

    pub fn list(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub async fn execute(&self, name: &str, invocation: ToolInvocation) -> anyhow::Result<ToolResult> {
        let Some(tool) = self.tools.get(name) else {
            return Ok(ToolResult::ok("unknown tool", format!("Unknown tool: {name}"))
                .with_metadata(json!({"code": "UNKNOWN_TOOL"})));
        };
        tool.execute(invocation).await
    }
}
