use weave_types::{
    AcceptanceGates, BlueprintForm, BlueprintInteraction, BlueprintRoute, BlueprintState,
    FormField, FormFieldKind, Platform, RequirementStrategy, UiBlueprint,
};

/// Builds the reasoning-contract blueprint. The route prefix follows the
/// platform; brainstorm runs get a secondary analysis view and a cross-view
/// linkage requirement on top of the direct shape.
pub fn build_ui_blueprint(
    user_message: &str,
    platform: Platform,
    strategy: RequirementStrategy,
) -> UiBlueprint {
    let prefix = platform.route_prefix();
    let brainstorm = strategy == RequirementStrategy::Brainstorm;

    let mut routes = vec![
        BlueprintRoute {
            id: format!("{prefix}-main"),
            path: format!("/{prefix}/main"),
            role: "primary workspace".to_string(),
        },
        BlueprintRoute {
            id: format!("{prefix}-collection"),
            path: format!("/{prefix}/collection"),
            role: "data collection".to_string(),
        },
        BlueprintRoute {
            id: format!("{prefix}-form"),
            path: format!("/{prefix}/form"),
            role: "record entry".to_string(),
        },
    ];
    let mut interactions = vec![
        BlueprintInteraction {
            id: "primary-crud".to_string(),
            requirement: "create, update, and delete records from the collection view".to_string(),
            mandatory: true,
        },
        BlueprintInteraction {
            id: "async-feedback".to_string(),
            requirement: "surface loading and result feedback for every async action".to_string(),
            mandatory: true,
        },
    ];

    if brainstorm {
        routes.push(BlueprintRoute {
            id: format!("{prefix}-analysis"),
            path: format!("/{prefix}/analysis"),
            role: "secondary analysis".to_string(),
        });
        interactions.push(BlueprintInteraction {
            id: "cross-view-linkage".to_string(),
            requirement: "selecting a record in one view navigates to its detail in another"
                .to_string(),
            mandatory: true,
        });
    }

    let states = vec![
        BlueprintState {
            id: "loading".to_string(),
            description: "explicit loading state per data surface".to_string(),
            mandatory: true,
        },
        BlueprintState {
            id: "empty".to_string(),
            description: "empty state with a call to action".to_string(),
            mandatory: true,
        },
        BlueprintState {
            id: "error".to_string(),
            description: "recoverable error state with retry".to_string(),
            mandatory: true,
        },
    ];

    let forms = vec![BlueprintForm {
        id: "primary-record".to_string(),
        fields: vec![
            FormField {
                name: "name".to_string(),
                kind: FormFieldKind::Text,
                required: true,
            },
            FormField {
                name: "category".to_string(),
                kind: FormFieldKind::Select,
                required: true,
            },
            FormField {
                name: "quantity".to_string(),
                kind: FormFieldKind::Number,
                required: false,
            },
            FormField {
                name: "notes".to_string(),
                kind: FormFieldKind::Textarea,
                required: false,
            },
        ],
        validation: "inline field errors with submit gating".to_string(),
    }];

    UiBlueprint {
        intent: user_message.trim().to_string(),
        modules: routes.iter().map(|r| r.id.clone()).collect(),
        routes,
        interactions,
        states,
        forms,
        acceptance_gates: AcceptanceGates {
            min_view_count: if brainstorm { 3 } else { 2 },
            min_data_surface_count: 1,
            min_form_flow_count: 1,
            require_validation_feedback: true,
            require_explicit_state_transitions: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_routes_use_view_prefix() {
        let blueprint = build_ui_blueprint("后台", Platform::Web, RequirementStrategy::Direct);
        assert!(blueprint.routes.iter().all(|r| r.id.starts_with("view-")));
        assert_eq!(blueprint.acceptance_gates.min_view_count, 2);
    }

    #[test]
    fn mobile_and_miniprogram_prefixes() {
        let mobile = build_ui_blueprint("app", Platform::Mobile, RequirementStrategy::Direct);
        assert!(mobile.routes[0].id.starts_with("screen-"));
        let mini = build_ui_blueprint("app", Platform::Miniprogram, RequirementStrategy::Direct);
        assert!(mini.routes[0].id.starts_with("page-"));
    }

    #[test]
    fn brainstorm_adds_analysis_view_and_linkage() {
        let blueprint =
            build_ui_blueprint("外卖后台", Platform::Web, RequirementStrategy::Brainstorm);
        assert!(blueprint.routes.len() >= 4);
        assert!(blueprint
            .routes
            .iter()
            .any(|r| r.id == "view-analysis"));
        assert!(blueprint
            .interactions
            .iter()
            .any(|i| i.id == "cross-view-linkage" && i.mandatory));
        assert_eq!(blueprint.acceptance_gates.min_view_count, 3);
    }
}
