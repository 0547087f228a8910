pub const CONTRACT_FROZEN_WRITE_BLOCKED: &str = "CONTRACT_FROZEN_WRITE_BLOCKED";
pub const RUNTIME_ARTIFACT_PATH_BLOCKED: &str = "RUNTIME_ARTIFACT_PATH_BLOCKED";
pub const READ_BUDGET_EXCEEDED: &str = "READ_BUDGET_EXCEEDED";
pub const OVERWRITE_NOT_ALLOWED: &str = "OVERWRITE_NOT_ALLOWED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    pub code: &'static str,
    pub detail: String,
}

impl PolicyViolation {
    pub fn contract_frozen(path: &str, prefix: &str) -> Self {
        Self {
            code: CONTRACT_FROZEN_WRITE_BLOCKED,
            detail: format!("`{path}` is under the frozen contract prefix `{prefix}`"),
        }
    }

    pub fn path_blocked(path: &str, reason: &str) -> Self {
        Self {
            code: RUNTIME_ARTIFACT_PATH_BLOCKED,
            detail: format!("`{path}` rejected: {reason}"),
        }
    }

    pub fn read_budget(detail: impl Into<String>) -> Self {
        Self {
            code: READ_BUDGET_EXCEEDED,
            detail: detail.into(),
        }
    }

    pub fn overwrite_blocked(path: &str) -> Self {
        Self {
            code: OVERWRITE_NOT_ALLOWED,
            detail: format!("`{path}` already exists and full overwrite is not enabled"),
        }
    }
}

impl std::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

impl std::error::Error for PolicyViolation {}
