use serde::{Deserialize, Serialize};

use crate::{normalize_slashes, PolicyViolation};

pub const DEFAULT_FROZEN_PREFIXES: [&str; 3] = ["types/", "store/", "components/ui/"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContractPolicy {
    pub read_only: bool,
    pub frozen_prefixes: Vec<String>,
}

impl Default for SessionContractPolicy {
    fn default() -> Self {
        Self {
            read_only: false,
            frozen_prefixes: DEFAULT_FROZEN_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl SessionContractPolicy {
    pub fn frozen(prefixes: Vec<String>) -> Self {
        Self {
            read_only: true,
            frozen_prefixes: prefixes,
        }
    }

    pub fn freeze(&mut self) {
        self.read_only = true;
    }

    pub fn check_write(&self, path: &str) -> Result<(), PolicyViolation> {
        if !self.read_only {
            return Ok(());
        }
        let normalized = normalize_slashes(path);
        for prefix in &self.frozen_prefixes {
            if normalized.starts_with(prefix.as_str()) {
                return Err(PolicyViolation::contract_frozen(path, prefix));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CONTRACT_FROZEN_WRITE_BLOCKED;

    #[test]
    fn unfrozen_policy_allows_everything() {
        let policy = SessionContractPolicy::default();
        assert!(policy.check_write("types/user.ts").is_ok());
        assert!(policy.check_write("src/App.tsx").is_ok());
    }

    #[test]
    fn frozen_policy_blocks_default_prefixes() {
        let mut policy = SessionContractPolicy::default();
        policy.freeze();
        for path in ["types/user.ts", "store/cart.ts", "components/ui/button.tsx"] {
            let err = policy.check_write(path).expect_err("blocked");
            assert_eq!(err.code, CONTRACT_FROZEN_WRITE_BLOCKED);
        }
        assert!(policy.check_write("src/pages/Home.tsx").is_ok());
    }

    #[test]
    fn backslash_paths_normalize_before_prefix_check() {
        let mut policy = SessionContractPolicy::default();
        policy.freeze();
        assert!(policy.check_write("types\\user.ts").is_err());
    }
}
