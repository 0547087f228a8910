use serde::{Deserialize, Serialize};

use weave_types::FileWrite;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathDecision {
    pub allowed: bool,
    pub normalized_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PathDecision {
    fn blocked(path: &str, reason: &str) -> Self {
        Self {
            allowed: false,
            normalized_path: path.to_string(),
            reason: Some(reason.to_string()),
        }
    }

    fn allowed(path: String) -> Self {
        Self {
            allowed: true,
            normalized_path: path,
            reason: None,
        }
    }
}

pub fn normalize_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

fn looks_like_windows_drive(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn segment_looks_synthetic(segment: &str) -> bool {
    (segment.contains('-') || segment.contains('_')) && !segment.contains('.')
}

/// Validates a write target against the runtime-artifact rules and unwraps one
/// level of synthetic root (`generated-web-app/src/App.tsx` -> `src/App.tsx`).
pub fn evaluate_artifact_path(path: &str, existing: &[String]) -> PathDecision {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return PathDecision::blocked(path, "empty or dot path");
    }
    if trimmed.starts_with("\\\\") {
        return PathDecision::blocked(path, "UNC path");
    }
    let normalized = normalize_slashes(trimmed);
    if normalized.starts_with('/') || looks_like_windows_drive(&normalized) {
        return PathDecision::blocked(path, "absolute path");
    }
    if normalized.starts_with("../") || normalized.contains("/../") || normalized.ends_with("/..") {
        return PathDecision::blocked(path, "parent traversal");
    }

    let mut cleaned = normalized.trim_start_matches("./").to_string();
    while cleaned.starts_with("./") {
        cleaned = cleaned.trim_start_matches("./").to_string();
    }
    if cleaned.is_empty() {
        return PathDecision::blocked(path, "empty after normalization");
    }

    if let Some((top, rest)) = cleaned.split_once('/') {
        if !rest.is_empty()
            && (segment_looks_synthetic(top) || existing.iter().any(|e| e == rest))
        {
            return PathDecision::allowed(rest.to_string());
        }
    }

    PathDecision::allowed(cleaned)
}

/// Batch form used when a generation step emits a whole tree under a synthetic
/// root. Blocked entries keep their original path so the per-write check can
/// surface the violation.
pub fn normalize_generated(writes: Vec<FileWrite>, existing: &[String]) -> Vec<FileWrite> {
    writes
        .into_iter()
        .map(|mut write| {
            let decision = evaluate_artifact_path(&write.path, existing);
            if decision.allowed {
                write.path = decision.normalized_path;
            }
            write
        })
        .collect()
}
