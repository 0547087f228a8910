use serde::{Deserialize, Serialize};

use weave_types::SessionMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    Standard,
    AllowFullOverwrite,
}

/// Overwriting an existing file is gated; creator sessions and frontend
/// agents keep the legacy free-overwrite behavior.
pub fn overwrite_allowed(
    mode: WriteMode,
    agent_id: &str,
    session_mode: SessionMode,
    target_exists: bool,
) -> bool {
    if !target_exists {
        return true;
    }
    mode == WriteMode::AllowFullOverwrite
        || agent_id.starts_with("frontend-")
        || session_mode == SessionMode::Creator
}
