//! [`ToolExecutor`]: dispatches one [`ToolCallRequest`] by name.
//!
//! Failures never escape: an unknown tool or unparsable arguments degrade to
//! an empty result object so the batched response stays well-formed.  State
//! changes the session must perform (dialing) are returned as a
//! [`ToolEffect`] rather than applied here.

use std::sync::Arc;

use serde_json::{json, Value};

use super::directory::PlaceDirectory;
use super::types::{
    CallCounterpartyArgs, SearchPlacesArgs, ToolCallRequest, ToolCallResult, ToolError,
    CALL_COUNTERPARTY, NO_PLACES_FOUND, SEARCH_PLACES,
};

/// Whether an outbound call may be placed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    Free,
    /// A call is already ringing or connected.
    Busy,
}

/// Session-level change requested by a tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEffect {
    /// Start dialing `name`.
    Dial { name: String },
}

/// Everything produced by executing one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub result: ToolCallResult,
    pub effect: Option<ToolEffect>,
    /// Extra system log lines (beyond "Executing tool").
    pub notes: Vec<String>,
}

pub struct ToolExecutor {
    directory: Arc<dyn PlaceDirectory>,
}

impl ToolExecutor {
    pub fn new(directory: Arc<dyn PlaceDirectory>) -> Self {
        Self { directory }
    }

    /// Execute `call`, degrading any [`ToolError`] to an empty result.
    pub fn execute(&self, call: &ToolCallRequest, line: LineStatus) -> ToolOutcome {
        match self.try_execute(call, line) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("tools: {e}; answering with an empty result");
                ToolOutcome {
                    result: ToolCallResult::answer(call, json!({})),
                    effect: None,
                    notes: vec![format!("Tool {} failed: {e}", call.name)],
                }
            }
        }
    }

    /// Execute `call`, surfacing unknown names and bad arguments.
    pub fn try_execute(
        &self,
        call: &ToolCallRequest,
        line: LineStatus,
    ) -> Result<ToolOutcome, ToolError> {
        match call.name.as_str() {
            SEARCH_PLACES => self.search_places(call),
            CALL_COUNTERPARTY => Self::call_counterparty(call, line),
            other => Err(ToolError::UnknownTool(other.to_owned())),
        }
    }

    fn search_places(&self, call: &ToolCallRequest) -> Result<ToolOutcome, ToolError> {
        let args: SearchPlacesArgs = call.parse_args()?;
        let found = self.directory.search(&args.location);
        let note = format!("Found {} places in {}", found.len(), args.location);

        let places: Value = if found.is_empty() {
            Value::String(NO_PLACES_FOUND.into())
        } else {
            serde_json::to_value(&found).map_err(|e| ToolError::InvalidArguments {
                tool: call.name.clone(),
                reason: e.to_string(),
            })?
        };

        Ok(ToolOutcome {
            result: ToolCallResult::answer(call, json!({ "places": places })),
            effect: None,
            notes: vec![note],
        })
    }

    fn call_counterparty(
        call: &ToolCallRequest,
        line: LineStatus,
    ) -> Result<ToolOutcome, ToolError> {
        let args: CallCounterpartyArgs = call.parse_args()?;

        if line == LineStatus::Busy {
            return Ok(ToolOutcome {
                result: ToolCallResult::answer(
                    call,
                    json!({
                        "status": "busy",
                        "message": format!("Already on a call; not dialing {}.", args.name),
                    }),
                ),
                effect: None,
                notes: vec![format!("Ignored call to {}: line busy", args.name)],
            });
        }

        Ok(ToolOutcome {
            result: ToolCallResult::answer(
                call,
                json!({
                    "status": "calling",
                    "message": format!("Dialing {}...", args.name),
                }),
            ),
            effect: Some(ToolEffect::Dial { name: args.name }),
            notes: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
