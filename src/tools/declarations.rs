//! JSON-schema declarations of the tools offered to the remote model.

use serde::Serialize;
use serde_json::{json, Value};

use super::types::{CALL_COUNTERPARTY, SEARCH_PLACES};

/// One function declaration sent when the session is opened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema of the argument object.
    pub parameters: Value,
}

/// Declarations for `search_places` and `call_counterparty`.
pub fn default_declarations() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: SEARCH_PLACES.into(),
            description: "Search for hair salons in a specific area.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "The location or neighborhood to search in (e.g., Adyar, T. Nagar)."
                    }
                },
                "required": ["location"]
            }),
        },
        ToolDeclaration {
            name: CALL_COUNTERPARTY.into(),
            description: "Initiate a phone call to a specific salon to book an appointment.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "The name of the salon to call."
                    }
                },
                "required": ["name"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_tools_are_declared_with_required_fields() {
        let decls = default_declarations();
        let names: Vec<_> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec![SEARCH_PLACES, CALL_COUNTERPARTY]);

        assert_eq!(decls[0].parameters["required"], json!(["location"]));
        assert_eq!(decls[1].parameters["required"], json!(["name"]));
    }
}
