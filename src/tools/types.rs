//! Wire-level tool-call records and their typed argument structs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Name of the place lookup tool.
pub const SEARCH_PLACES: &str = "search_places";

/// Name of the outbound call tool.
pub const CALL_COUNTERPARTY: &str = "call_counterparty";

/// Result returned by `search_places` when nothing matches.
pub const NO_PLACES_FOUND: &str = "No places found in that area.";

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// One call requested by the remote side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    /// Deserialize `args` into the tool's typed argument record.
    pub fn parse_args<T: serde::de::DeserializeOwned>(&self) -> Result<T, ToolError> {
        serde_json::from_value(self.args.clone()).map_err(|e| ToolError::InvalidArguments {
            tool: self.name.clone(),
            reason: e.to_string(),
        })
    }
}

/// Answer to one [`ToolCallRequest`], correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    pub name: String,
    /// `{"result": <payload>}`.
    pub response: Value,
}

impl ToolCallResult {
    /// Wrap `result` as the response to `request`.
    pub fn answer(request: &ToolCallRequest, result: Value) -> Self {
        Self {
            id: request.id.clone(),
            name: request.name.clone(),
            response: serde_json::json!({ "result": result }),
        }
    }

    /// The payload inside `response.result`.
    pub fn result(&self) -> &Value {
        &self.response["result"]
    }
}

// ---------------------------------------------------------------------------
// Typed arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPlacesArgs {
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallCounterpartyArgs {
    pub name: String,
}
