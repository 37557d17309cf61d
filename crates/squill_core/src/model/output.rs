//! Execution output model.
//!
//! # Responsibility
//! - Define the per-cell output record and the run-result payload.
//!
//! # Invariants
//! - `run_id` is ephemeral: set on start, cleared after a successful commit
//!   so the same run can never land twice.
//! - Output records live outside the cell entity and outside undo scope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result payload of one finished execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Shorthand for a failed execution.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Per-cell execution state as stored in the outputs container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputRecord {
    pub running: bool,
    pub stale: bool,
    pub started_at_ms: Option<i64>,
    pub completed_at_ms: Option<i64>,
    /// In-flight run token; `None` once the run is finalized.
    pub run_id: Option<String>,
    pub result: Option<ExecutionResult>,
}

/// Outcome of attempting to commit an execution result.
///
/// Rejections are expected concurrency outcomes, not errors; they are
/// reported so callers and tests can observe the fence working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Result stored; run finalized.
    Applied,
    /// No output entry exists for the cell; orphan results are refused.
    NoEntry,
    /// Run-id fence rejected the result as stale or unowned.
    RunMismatch,
}
