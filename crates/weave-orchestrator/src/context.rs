use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use weave_types::{StoredFile, UiBlueprint};

pub const IMMUTABLE_CONTEXT_HEADER: &str = "[ImmutableContext]";

/// Block wording is part of the contract with the downstream model; headers
/// are matched verbatim by the agents' prompts.
pub fn reasoning_contract_block(blueprint: &UiBlueprint) -> String {
    let body = serde_json::to_string_pretty(blueprint).unwrap_or_default();
    format!("[ReasoningContract:UIBlueprint]\n{body}")
}

pub fn execution_policy_block() -> String {
    [
        "[ExecutionPolicy]",
        "- Structure first: lay down routing, layout shell, and directory skeleton before page internals.",
        "- Contracts first: define shared types, stores, and component props before consuming them.",
        "- Do not restructure files that later phases depend on.",
    ]
    .join("\n")
}

pub fn requirement_brainstorm_block() -> String {
    [
        "[RequirementBrainstorm]",
        "- The request is underspecified: expand it into concrete modules, views, and flows before building.",
        "- Add one secondary analysis view beyond the literal request.",
        "- Record assumptions inline so later phases can honor them.",
    ]
    .join("\n")
}

pub fn rich_prototype_quality_gate_block() -> String {
    [
        "[RichPrototypeQualityGate]",
        "- Ship multiple linked views with real route structure.",
        "- Every data surface needs loading, empty, and error states.",
        "- Forms must validate with visible feedback.",
        "- State transitions must be explicit and driven by a store.",
        "- Placeholder copy fails the gate.",
    ]
    .join("\n")
}

pub fn autonomous_iteration_tag(iteration: u32) -> String {
    format!("[AutonomousIteration:{iteration}]")
}

pub fn replan_depth_tag(depth: u32, max: u32) -> String {
    format!("[ReplanDepth:{depth}/{max}]")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrozenContractDigest {
    pub path: String,
    pub exports: Vec<String>,
    pub signatures: Vec<String>,
    pub type_names: Vec<String>,
    pub mock_shapes: Vec<String>,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrozenContractBundle {
    pub generated_at: DateTime<Utc>,
    pub summary: String,
    pub files: Vec<FrozenContractDigest>,
}

/// Per-file digests for the contract-freeze block: exports, signatures,
/// interface/type names, and mock shapes, with a degraded flag when nothing
/// could be extracted.
pub fn digest_frozen_contracts(files: &[StoredFile], prefixes: &[String]) -> FrozenContractBundle {
    let export_re = Regex::new(
        r"export\s+(?:const|let|function|class|default function|default class)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("export regex");
    let type_re = Regex::new(r"export\s+(?:interface|type|enum)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("type regex");
    let signature_re = Regex::new(
        r"export\s+(?:async\s+)?function\s+[A-Za-z_][A-Za-z0-9_]*\s*\(([^)]*)\)",
    )
    .expect("signature regex");
    let mock_re = Regex::new(r"(?i)(mock|fixture|sample)[A-Za-z0-9_]*\s*[:=]").expect("mock regex");

    let mut digests = Vec::new();
    for file in files {
        if !prefixes.iter().any(|p| file.path.starts_with(p.as_str())) {
            continue;
        }
        let exports: Vec<String> = export_re
            .captures_iter(&file.content)
            .map(|c| c[1].to_string())
            .collect();
        let type_names: Vec<String> = type_re
            .captures_iter(&file.content)
            .map(|c| c[1].to_string())
            .collect();
        let signatures: Vec<String> = signature_re
            .captures_iter(&file.content)
            .map(|c| c[1].trim().to_string())
            .collect();
        let mock_shapes: Vec<String> = mock_re
            .find_iter(&file.content)
            .map(|m| m.as_str().trim_end_matches([':', '=']).trim().to_string())
            .collect();
        let degraded = exports.is_empty() && type_names.is_empty();
        digests.push(FrozenContractDigest {
            path: file.path.clone(),
            exports,
            signatures,
            type_names,
            mock_shapes,
            degraded,
        });
    }

    FrozenContractBundle {
        generated_at: Utc::now(),
        summary: format!("{} contract files frozen", digests.len()),
        files: digests,
    }
}

pub fn frozen_contracts_block(bundle: &FrozenContractBundle) -> String {
    let body = serde_json::to_string_pretty(bundle).unwrap_or_default();
    format!("[FrozenContracts]\n{body}")
}

/// Assembles the immutable-context suffix appended to agent user messages.
pub fn compose_immutable_context(blocks: &[String]) -> String {
    if blocks.is_empty() {
        return String::new();
    }
    let mut out = String::from(IMMUTABLE_CONTEXT_HEADER);
    for block in blocks {
        out.push('\n');
        out.push_str(block);
    }
    out
}
