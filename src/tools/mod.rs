//! Tool executor: maps tool-call requests from the remote session onto
//! local domain actions.
//!
//! # Flow
//!
//! ```text
//! ServerMessage::ToolCallBatch(Vec<ToolCallRequest>)
//!   └─▶ ToolExecutor::execute (one call at a time)
//!         ├─ search_places     → PlaceDirectory lookup → {"places": [...]}
//!         ├─ call_counterparty → ToolEffect::Dial      → {"status": "calling"}
//!         └─ anything else     → {}
//!   └─▶ Vec<ToolCallResult> sent back as one batch
//! ```

pub mod declarations;
pub mod directory;
pub mod executor;
pub mod types;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use declarations::{default_declarations, ToolDeclaration};
pub use directory::{Counterparty, PlaceDirectory, StaticDirectory};
pub use executor::{LineStatus, ToolEffect, ToolExecutor, ToolOutcome};
pub use types::{
    CallCounterpartyArgs, SearchPlacesArgs, ToolCallRequest, ToolCallResult, ToolError,
    CALL_COUNTERPARTY, NO_PLACES_FOUND, SEARCH_PLACES,
};
