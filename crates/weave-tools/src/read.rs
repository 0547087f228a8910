use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use weave_policy::SessionPolicyStore;
use weave_store::FileStore;
use weave_types::{ToolResult, ToolSchema};

use crate::{Tool, ToolInvocation};

pub struct ReadFileTool {
    files: Arc<dyn FileStore>,
    policies: Arc<dyn SessionPolicyStore>,
}

impl ReadFileTool {
    pub fn new(files: Arc<dyn FileStore>, policies: Arc<dyn SessionPolicyStore>) -> Self {
        Self { files, policies }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "read_file".to_string(),
            description: "Read a session file".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, invocation: ToolInvocation) -> anyhow::Result<ToolResult> {
        let path = invocation.args["path"].as_str().unwrap_or("").to_string();
        if path.trim().is_empty() {
            return Ok(ToolResult::ok("read_file", "missing path argument")
                .with_metadata(json!({"code": "MISSING_ARGUMENT"})));
        }

        // the budget gate runs before any store access
        let has_artifacts = !self
            .files
            .get_all_files(&invocation.session_id)
            .await
            .is_empty();
        if let Err(violation) = self.policies.read_budget().register_read(
            &invocation.session_id,
            invocation.iteration,
            &path,
            has_artifacts,
        ) {
            return Ok(ToolResult::ok("read_file", violation.to_string())
                .with_metadata(json!({"code": violation.code, "path": path})));
        }

        match self.files.get_file(&invocation.session_id, &path).await {
            Some(file) => Ok(ToolResult::ok("read_file", file.content).with_metadata(json!({
                "path": path,
                "language": file.language,
                "size": file.size,
            }))),
            None => Ok(ToolResult::ok("read_file", format!("file not found: {path}"))
                .with_metadata(json!({"code": "FILE_NOT_FOUND", "path": path}))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_policy::{MemoryPolicyStore, READ_BUDGET_EXCEEDED};
    use weave_store::MemoryFileStore;
    use weave_types::{FileWrite, SessionMode};

    fn invocation(args: serde_json::Value) -> ToolInvocation {
        ToolInvocation {
            session_id: "ses_1".to_string(),
            iteration: 1,
            agent_id: "frontend-pages".to_string(),
            call_id: "call-1".to_string(),
            session_mode: SessionMode::Implementer,
            args,
        }
    }

    #[tokio::test]
    async fn reads_back_stored_content() {
        let files = Arc::new(MemoryFileStore::new());
        files
            .save_files("ses_1", vec![FileWrite::new("src/App.tsx", "hello")])
            .await;
        let tool = ReadFileTool::new(files, Arc::new(MemoryPolicyStore::new()));
        let result = tool
            .execute(invocation(json!({"path": "src/App.tsx"})))
            .await
            .expect("result");
        assert_eq!(result.output, "hello");
    }

    #[tokio::test]
    async fn budget_exhaustion_blocks_without_store_access() {
        let files = Arc::new(MemoryFileStore::new());
        files
            .save_files("ses_1", vec![FileWrite::new("src/App.tsx", "hello")])
            .await;
        let policies = Arc::new(MemoryPolicyStore::new());
        let tool = ReadFileTool::new(files, policies);

        for i in 0..24 {
            let path = format!("src/file{}.ts", i % 12);
            tool.execute(invocation(json!({"path": path})))
                .await
                .expect("result");
        }
        let result = tool
            .execute(invocation(json!({"path": "src/file0.ts"})))
            .await
            .expect("result");
        assert_eq!(result.blocked_code(), Some(READ_BUDGET_EXCEEDED));
    }
}
