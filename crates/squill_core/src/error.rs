//! Crate-wide error taxonomy for the notebook core.
//!
//! # Responsibility
//! - Distinguish programmer errors (invalid calls) from substrate failures.
//!
//! # Invariants
//! - Advisory inconsistencies are never surfaced as errors; they flow
//!   through `validate_notebook` issues and reconciliation reports.
//! - Race rejections (stale run ids, raced migration steps) are expected
//!   outcomes, not errors.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CoreResult<T> = Result<T, CoreError>;

/// Hard failure raised by core operations.
#[derive(Debug)]
pub enum CoreError {
    /// Caller passed a blank or empty cell id.
    InvalidCellId(String),
    /// Replicated-document substrate rejected an operation.
    Crdt(loro::LoroError),
    /// Diff-based text update failed inside the substrate.
    TextUpdate(String),
    /// Execution result payload could not be (de)serialized.
    Json(serde_json::Error),
    /// Replica state could not be exported or imported.
    Merge(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCellId(value) => write!(f, "invalid cell id: `{value}`"),
            Self::Crdt(err) => write!(f, "{err}"),
            Self::TextUpdate(details) => write!(f, "text update failed: {details}"),
            Self::Json(err) => write!(f, "result payload serialization failed: {err}"),
            Self::Merge(details) => write!(f, "replica merge failed: {details}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Crdt(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::InvalidCellId(_) | Self::TextUpdate(_) | Self::Merge(_) => None,
        }
    }
}

impl From<loro::LoroError> for CoreError {
    fn from(value: loro::LoroError) -> Self {
        Self::Crdt(value)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
