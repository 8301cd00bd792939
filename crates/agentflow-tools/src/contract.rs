use agentflow_core::descriptor::{parameters_schema, TypeDescriptor};
use agentflow_core::error::{AgentflowError, Result};
use agentflow_core::traits::Action;
use agentflow_core::types::ActionContract;

/// Derive the calling contract of an action.
///
/// Fails when the action has no name, no description, or no declared result
/// type. Called once per action at registration time.
pub fn synthesize_contract(action: &dyn Action) -> Result<ActionContract> {
    let name = action.name().trim();
    let mut problems = Vec::new();
    if name.is_empty() {
        problems.push("action name is empty".to_string());
    }
    let label = if name.is_empty() { "<unnamed>" } else { name };
    if action.description().trim().is_empty() {
        problems.push(format!("action '{}' is missing a description", label));
    }
    let returns = action.result_type();
    if returns.is_none() {
        problems.push(format!("action '{}' is missing a result type", label));
    }
    let params = action.parameters();
    for (i, p) in params.iter().enumerate() {
        if params[..i].iter().any(|q| q.name == p.name) {
            problems.push(format!(
                "action '{}' declares parameter '{}' twice",
                label, p.name
            ));
        }
    }
    let returns = match returns {
        Some(ty) if problems.is_empty() => ty,
        _ => return Err(AgentflowError::InvalidAction(problems.join("; "))),
    };

    let returns_schema = returns.to_json_schema();
    let pretty = serde_json::to_string_pretty(&returns_schema)?;
    let description = format!(
        "{}\n\nReturns schema:\n{}",
        action.description().trim(),
        pretty
    );

    Ok(ActionContract {
        name: name.to_string(),
        description,
        parameters: parameters_schema(&params),
        returns: returns_schema,
    })
}

/// Short type label used in the textual catalog.
fn type_label(ty: &TypeDescriptor) -> String {
    match ty {
        TypeDescriptor::String | TypeDescriptor::Other { .. } => "string".into(),
        TypeDescriptor::Integer => "integer".into(),
        TypeDescriptor::Number => "number".into(),
        TypeDescriptor::Boolean => "boolean".into(),
        TypeDescriptor::Date => "date".into(),
        TypeDescriptor::DateTime => "datetime".into(),
        TypeDescriptor::Enum { choices } => choices
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(" | "),
        TypeDescriptor::Optional { inner } => format!("{}?", type_label(inner)),
        TypeDescriptor::Sequence { items } => format!("list[{}]", type_label(items)),
        TypeDescriptor::Mapping { values } => format!("map[{}]", type_label(values)),
        TypeDescriptor::Record { .. } => "object".into(),
    }
}

/// Render the action catalog appended to agent instructions:
/// one `- name(arg: type, ...) -> type: description` line per action.
pub fn catalog_text(actions: &[std::sync::Arc<dyn Action>]) -> String {
    actions
        .iter()
        .map(|a| {
            let params = a
                .parameters()
                .iter()
                .map(|p| format!("{}: {}", p.name, type_label(&p.ty)))
                .collect::<Vec<_>>()
                .join(", ");
            let returns = a
                .result_type()
                .map(|t| type_label(&t))
                .unwrap_or_else(|| "string".into());
            format!(
                "- {}({}) -> {}: {}",
                a.name(),
                params,
                returns,
                a.description().trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FnAction;
    use agentflow_core::descriptor::ParamSpec;
    use serde_json::json;
    use std::sync::Arc;

    fn weather() -> FnAction {
        FnAction::sync("weather", "Current weather for a city.", |_| {
            Ok(json!({"temp": 21}))
        })
        .param(ParamSpec::new("city", TypeDescriptor::String))
        .param(ParamSpec::new(
            "unit",
            TypeDescriptor::optional(TypeDescriptor::enumeration(["c", "f"])),
        ))
        .returns(TypeDescriptor::mapping(TypeDescriptor::Integer))
    }

    #[test]
    fn test_contract_shape() {
        let contract = synthesize_contract(&weather()).unwrap();
        assert_eq!(contract.name, "weather");
        assert!(contract.description.starts_with("Current weather for a city."));
        assert!(contract.description.contains("Returns schema:"));
        assert_eq!(contract.parameters["required"], json!(["city"]));
        assert_eq!(
            contract.parameters["properties"]["unit"],
            json!({"type": "string", "enum": ["c", "f"]})
        );
        assert_eq!(
            contract.returns,
            json!({"type": "object", "additionalProperties": {"type": "integer"}})
        );
    }

    #[test]
    fn test_missing_description_rejected() {
        let action = FnAction::sync("blank", "   ", |_| Ok(json!(null)))
            .returns(TypeDescriptor::String);
        let err = synthesize_contract(&action).unwrap_err();
        assert!(matches!(err, AgentflowError::InvalidAction(_)));
        assert!(err.to_string().contains("missing a description"));
    }

    #[test]
    fn test_missing_result_type_rejected() {
        let action = FnAction::sync("untyped", "Does things.", |_| Ok(json!(null)));
        let err = synthesize_contract(&action).unwrap_err();
        assert!(err.to_string().contains("missing a result type"));
    }

    #[test]
    fn test_all_problems_reported() {
        let action = FnAction::sync("", "", |_| Ok(json!(null)));
        let msg = synthesize_contract(&action).unwrap_err().to_string();
        assert!(msg.contains("name is empty"));
        assert!(msg.contains("description"));
        assert!(msg.contains("result type"));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let action = weather().param(ParamSpec::new("city", TypeDescriptor::String));
        let msg = synthesize_contract(&action).unwrap_err().to_string();
        assert!(msg.contains("'city' twice"));
    }

    #[test]
    fn test_catalog_text() {
        let actions: Vec<Arc<dyn Action>> = vec![Arc::new(weather())];
        let text = catalog_text(&actions);
        assert_eq!(
            text,
            "- weather(city: string, unit: \"c\" | \"f\"?) -> map[integer]: Current weather for a city."
        );
    }
}
