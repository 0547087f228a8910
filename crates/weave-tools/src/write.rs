use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use weave_policy::{
    evaluate_artifact_path, overwrite_allowed, PolicyViolation, SessionPolicyStore, WriteMode,
};
use weave_store::FileStore;
use weave_types::{FileWrite, ToolResult, ToolSchema};

use crate::{apply_patch, Tool, ToolInvocation};

pub struct WriteFileTool {
    files: Arc<dyn FileStore>,
    policies: Arc<dyn SessionPolicyStore>,
}

impl WriteFileTool {
    pub fn new(files: Arc<dyn FileStore>, policies: Arc<dyn SessionPolicyStore>) -> Self {
        Self { files, policies }
    }
}

async fn gate_write_target(
    files: &Arc<dyn FileStore>,
    policies: &Arc<dyn SessionPolicyStore>,
    invocation: &ToolInvocation,
    path: &str,
    mode: WriteMode,
) -> Result<(String, bool), PolicyViolation> {
    let existing: Vec<String> = files
        .get_all_files(&invocation.session_id)
        .await
        .into_iter()
        .map(|f| f.path)
        .collect();

    let decision = evaluate_artifact_path(path, &existing);
    if !decision.allowed {
        return Err(PolicyViolation::path_blocked(
            path,
            decision.reason.as_deref().unwrap_or("path rejected"),
        ));
    }
    let normalized = decision.normalized_path;

    let contract = policies.contract(&invocation.session_id).await;
    contract.check_write(&normalized)?;

    let exists = existing.iter().any(|p| p == &normalized);
    if !overwrite_allowed(mode, &invocation.agent_id, invocation.session_mode, exists) {
        return Err(PolicyViolation::overwrite_blocked(&normalized));
    }

    Ok((normalized, exists))
}

fn blocked_result(tool: &str, path: &str, violation: PolicyViolation) -> ToolResult {
    ToolResult::ok(tool, violation.to_string()).with_metadata(json!({
        "code": violation.code,
        "path": path,
    }))
}

fn parse_write_mode(args: &serde_json::Value) -> WriteMode {
    match args["mode"].as_str() {
        Some("allow_full_overwrite") => WriteMode::AllowFullOverwrite,
        _ => WriteMode::Standard,
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "write_file".to_string(),
            description: "Write a session file through the runtime-artifact policies".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"},
                    "mode": {"type": "string", "enum": ["standard", "allow_full_overwrite"]}
                },
                "required": ["path", "content"]
            }),
        }
    }

    async fn execute(&self, invocation: ToolInvocation) -> anyhow::Result<ToolResult> {
        let path = invocation.args["path"].as_str().unwrap_or("").to_string();
        let content = invocation.args["content"].as_str().unwrap_or("").to_string();
        let mode = parse_write_mode(&invocation.args);

        let (normalized, existed) =
            match gate_write_target(&self.files, &self.policies, &invocation, &path, mode).await {
                Ok(target) => target,
                Err(violation) => return Ok(blocked_result("write_file", &path, violation)),
            };

        let outcome = self
            .files
            .save_files(
                &invocation.session_id,
                vec![FileWrite::new(normalized.clone(), content.clone())],
            )
            .await;
        if let Some(error) = outcome.errors.first() {
            return Ok(
                ToolResult::ok("write_file", format!("write failed: {}", error.message))
                    .with_metadata(json!({"code": "WRITE_FAILED", "path": normalized})),
            );
        }

        Ok(
            ToolResult::ok("write_file", format!("wrote {normalized}")).with_metadata(json!({
                "path": normalized,
                "bytes": content.len(),
                "overwrote": existed,
            })),
        )
    }
}

pub struct ApplyDiffTool {
    files: Arc<dyn FileStore>,
    policies: Arc<dyn SessionPolicyStore>,
}

impl ApplyDiffTool {
    pub fn new(files: Arc<dyn FileStore>, policies: Arc<dyn SessionPolicyStore>) -> Self {
        Self { files, policies }
    }
}

#[async_trait]
impl Tool for ApplyDiffTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "apply_diff".to_string(),
            description: "Apply SEARCH/REPLACE patch blocks to a session file".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "patch": {"type": "string"},
                    "normalizeWhitespace": {"type": "boolean"}
                },
                "required": ["path", "patch"]
            }),
        }
    }

    async fn execute(&self, invocation: ToolInvocation) -> anyhow::Result<ToolResult> {
        let path = invocation.args["path"].as_str().unwrap_or("").to_string();
        let patch = invocation.args["patch"].as_str().unwrap_or("").to_string();
        let normalize_whitespace = invocation.args["normalizeWhitespace"]
            .as_bool()
            .unwrap_or(true);

        // diff edits always rewrite an existing file, so the overwrite gate
        // does not apply here; path and contract policies still do
        let (normalized, _) = match gate_write_target(
            &self.files,
            &self.policies,
            &invocation,
            &path,
            WriteMode::AllowFullOverwrite,
        )
        .await
        {
            Ok(target) => target,
            Err(violation) => return Ok(blocked_result("apply_diff", &path, violation)),
        };

        let Some(file) = self.files.get_file(&invocation.session_id, &normalized).await else {
            return Ok(
                ToolResult::ok("apply_diff", format!("file not found: {normalized}"))
                    .with_metadata(json!({"code": "FILE_NOT_FOUND", "path": normalized})),
            );
        };

        match apply_patch(&file.content, &patch, normalize_whitespace) {
            Ok(updated) => {
                self.files
                    .save_files(
                        &invocation.session_id,
                        vec![FileWrite::new(normalized.clone(), updated)],
                    )
                    .await;
                Ok(
                    ToolResult::ok("apply_diff", format!("patched {normalized}")).with_metadata(
                        json!({"path": normalized}),
                    ),
                )
            }
            Err(err) => Ok(ToolResult::ok("apply_diff", err.to_string()).with_metadata(json!({
                "code": err.code,
                "path": normalized,
                "hints": err.hints,
            }))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_policy::{
        MemoryPolicyStore, SessionContractPolicy, CONTRACT_FROZEN_WRITE_BLOCKED,
        OVERWRITE_NOT_ALLOWED, RUNTIME_ARTIFACT_PATH_BLOCKED,
    };
    use weave_store::MemoryFileStore;
    use weave_types::SessionMode;

    fn invocation(agent: &str, mode: SessionMode, args: serde_json::Value) -> ToolInvocation {
        ToolInvocation {
            session_id: "ses_1".to_string(),
            iteration: 1,
            agent_id: agent.to_string(),
            call_id: "call-1".to_string(),
            session_mode: mode,
            args,
        }
    }

    fn stores() -> (Arc<MemoryFileStore>, Arc<MemoryPolicyStore>) {
        (
            Arc::new(MemoryFileStore::new()),
            Arc::new(MemoryPolicyStore::new()),
        )
    }

    #[tokio::test]
    async fn traversal_write_is_blocked_and_store_untouched() {
        let (files, policies) = stores();
        let tool = WriteFileTool::new(files.clone(), policies);
        let result = tool
            .execute(invocation(
                "frontend-pages",
                SessionMode::Implementer,
                json!({"path": "../outside.ts", "content": "x"}),
            ))
            .await
            .expect("result");
        assert_eq!(result.blocked_code(), Some(RUNTIME_ARTIFACT_PATH_BLOCKED));
        assert!(files.get_all_files("ses_1").await.is_empty());
    }

    #[tokio::test]
    async fn frozen_prefix_write_is_blocked() {
        let (files, policies) = stores();
        let mut contract = SessionContractPolicy::default();
        contract.freeze();
        policies.set_contract("ses_1", contract).await;

        let tool = WriteFileTool::new(files.clone(), policies);
        let result = tool
            .execute(invocation(
                "frontend-pages",
                SessionMode::Implementer,
                json!({"path": "types/user.ts", "content": "export type User = {}"}),
            ))
            .await
            .expect("result");
        assert_eq!(result.blocked_code(), Some(CONTRACT_FROZEN_WRITE_BLOCKED));

        let ok = tool
            .execute(invocation(
                "frontend-pages",
                SessionMode::Implementer,
                json!({"path": "src/pages/Home.tsx", "content": "export default 1"}),
            ))
            .await
            .expect("result");
        assert!(ok.blocked_code().is_none());
    }

    #[tokio::test]
    async fn overwrite_gate_blocks_non_frontend_agents() {
        let (files, policies) = stores();
        files
            .save_files("ses_1", vec![FileWrite::new("src/App.tsx", "v1")])
            .await;
        let tool = WriteFileTool::new(files.clone(), policies);

        let blocked = tool
            .execute(invocation(
                "planner",
                SessionMode::Implementer,
                json!({"path": "src/App.tsx", "content": "v2"}),
            ))
            .await
            .expect("result");
        assert_eq!(blocked.blocked_code(), Some(OVERWRITE_NOT_ALLOWED));
        assert_eq!(
            files.get_file("ses_1", "src/App.tsx").await.unwrap().content,
            "v1"
        );

        let allowed = tool
            .execute(invocation(
                "planner",
                SessionMode::Implementer,
                json!({"path": "src/App.tsx", "content": "v2", "mode": "allow_full_overwrite"}),
            ))
            .await
            .expect("result");
        assert!(allowed.blocked_code().is_none());
        assert_eq!(
            files.get_file("ses_1", "src/App.tsx").await.unwrap().content,
            "v2"
        );
    }

    #[tokio::test]
    async fn synthetic_root_unwraps_before_writing() {
        let (files, policies) = stores();
        let tool = WriteFileTool::new(files.clone(), policies);
        tool.execute(invocation(
            "frontend-pages",
            SessionMode::Implementer,
            json!({"path": "generated-web-app/src/App.tsx", "content": "x"}),
        ))
        .await
        .expect("result");
        assert!(files.get_file("ses_1", "src/App.tsx").await.is_some());
        assert!(files
            .get_file("ses_1", "generated-web-app/src/App.tsx")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn apply_diff_round_trips_through_the_store() {
        let (files, policies) = stores();
        files
            .save_files(
                "ses_1",
                vec![FileWrite::new(
                    "src/title.ts",
                    "const title = \"Old\";\nexport default title;\n",
                )],
            )
            .await;
        let tool = ApplyDiffTool::new(files.clone(), policies);
        let result = tool
            .execute(invocation(
                "frontend-pages",
                SessionMode::Implementer,
                json!({
                    "path": "src/title.ts",
                    "patch": "<<<<<<< SEARCH\nconst title = \"Old\";\n=======\nconst title = \"New\";\n>>>>>>> REPLACE\n"
                }),
            ))
            .await
            .expect("result");
        assert!(result.blocked_code().is_none());
        let content = files.get_file("ses_1", "src/title.ts").await.unwrap().content;
        assert!(content.contains("\"New\""));
        assert!(!content.contains("\"Old\""));
    }

    #[tokio::test]
    async fn apply_diff_surfaces_match_failures() {
        let (files, policies) = stores();
        files
            .save_files(
                "ses_1",
                vec![FileWrite::new("src/a.ts", "let x = 1;\nlet x = 1;\n")],
            )
            .await;
        let tool = ApplyDiffTool::new(files.clone(), policies);
        let result = tool
            .execute(invocation(
                "frontend-pages",
                SessionMode::Implementer,
                json!({
                    "path": "src/a.ts",
                    "patch": "<<<<<<< SEARCH\nlet x = 1;\n=======\nlet x = 2;\n>>>>>>> REPLACE\n"
                }),
            ))
            .await
            .expect("result");
        assert_eq!(result.blocked_code(), Some(crate::AMBIGUOUS_MATCH));
    }
}
