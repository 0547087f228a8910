use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Creator,
    Implementer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectTemplate {
    NextJs,
    ReactVite,
    ReactNative,
    Uniapp,
    Unknown,
}

impl ProjectTemplate {
    pub fn supports_validation(self) -> bool {
        !matches!(self, ProjectTemplate::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Desktop,
    Mobile,
    Miniprogram,
}

impl Platform {
    pub fn route_prefix(self) -> &'static str {
        match self {
            Platform::Web | Platform::Desktop => "view",
            Platform::Mobile => "screen",
            Platform::Miniprogram => "page",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(alias = "providerID", alias = "providerId")]
    pub provider_id: String,
    #[serde(alias = "modelID", alias = "modelId")]
    pub model_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub mode: SessionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSpec>,
    pub template: ProjectTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, mode: SessionMode, template: ProjectTemplate) -> Self {
        Self {
            id: id.into(),
            owner_id: None,
            mode,
            active_agent: None,
            model: None,
            template,
            title: None,
            created_at: Utc::now(),
        }
    }

    pub fn accessible_by(&self, principal: Option<&str>) -> bool {
        match self.owner_id.as_deref() {
            Some(owner) => principal == Some(owner),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_session_is_private_to_owner() {
        let mut session = Session::new("ses_1", SessionMode::Creator, ProjectTemplate::ReactVite);
        session.owner_id = Some("user-a".to_string());
        assert!(session.accessible_by(Some("user-a")));
        assert!(!session.accessible_by(Some("user-b")));
        assert!(!session.accessible_by(None));
    }

    #[test]
    fn unowned_session_is_open() {
        let session = Session::new("ses_2", SessionMode::Implementer, ProjectTemplate::Unknown);
        assert!(session.accessible_by(None));
        assert!(session.accessible_by(Some("anyone")));
    }

    #[test]
    fn route_prefix_follows_platform() {
        assert_eq!(Platform::Web.route_prefix(), "view");
        assert_eq!(Platform::Desktop.route_prefix(), "view");
        assert_eq!(Platform::Mobile.route_prefix(), "screen");
        assert_eq!(Platform::Miniprogram.route_prefix(), "page");
    }
}
