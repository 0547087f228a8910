use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::StoredFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyProfile {
    Default,
    ImportsFirst,
    TypesFirst,
    BuildFirst,
}

impl StrategyProfile {
    /// Escalation ladder for repeated identical fingerprints.
    pub fn for_repeat_count(count: u32) -> Self {
        match count {
            0 | 1 => StrategyProfile::Default,
            2 => StrategyProfile::ImportsFirst,
            3 => StrategyProfile::TypesFirst,
            _ => StrategyProfile::BuildFirst,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairSnapshot {
    pub files: Vec<StoredFile>,
    pub fingerprint: String,
    pub error_count: usize,
    pub taken_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_escalates_with_repeats() {
        assert_eq!(
            StrategyProfile::for_repeat_count(0),
            StrategyProfile::Default
        );
        assert_eq!(
            StrategyProfile::for_repeat_count(2),
            StrategyProfile::ImportsFirst
        );
        assert_eq!(
            StrategyProfile::for_repeat_count(3),
            StrategyProfile::TypesFirst
        );
        assert_eq!(
            StrategyProfile::for_repeat_count(4),
            StrategyProfile::BuildFirst
        );
        assert_eq!(
            StrategyProfile::for_repeat_count(9),
            StrategyProfile::BuildFirst
        );
    }
}
