use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFieldKind {
    Text,
    Number,
    Select,
    Textarea,
    Date,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FormFieldKind,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintForm {
    pub id: String,
    pub fields: Vec<FormField>,
    pub validation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintRoute {
    pub id: String,
    pub path: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintInteraction {
    pub id: String,
    pub requirement: String,
    pub mandatory: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintState {
    pub id: String,
    pub description: String,
    pub mandatory: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceGates {
    pub min_view_count: u32,
    pub min_data_surface_count: u32,
    pub min_form_flow_count: u32,
    pub require_validation_feedback: bool,
    pub require_explicit_state_transitions: bool,
}

/// Immutable for the run once emitted by the plan generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiBlueprint {
    pub intent: String,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub routes: Vec<BlueprintRoute>,
    #[serde(default)]
    pub interactions: Vec<BlueprintInteraction>,
    #[serde(default)]
    pub states: Vec<BlueprintState>,
    #[serde(default)]
    pub forms: Vec<BlueprintForm>,
    pub acceptance_gates: AcceptanceGates,
}
