//! Cell domain model.
//!
//! # Responsibility
//! - Define the canonical cell record and its validation contract.
//!
//! # Invariants
//! - `id` is stable once the cell has been observed; the id-guard service
//!   reverts any later drift.
//! - `kind` decides how the source text is interpreted, never how the cell
//!   is stored.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// What a cell's source text contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    /// Executable SQL statement(s).
    Sql,
    /// Free-form markdown prose.
    Markdown,
}

impl CellKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Markdown => "markdown",
        }
    }

    /// Parses a stored kind tag. Unknown tags return `None`; readers degrade
    /// to [`CellKind::Markdown`] with a warning instead of failing.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sql" => Some(Self::Sql),
            "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

/// Per-cell behavioral flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellMetadata {
    /// When set, the cell's DDL runs in the background on notebook load.
    pub background_ddl: bool,
}

/// Canonical cell record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Stable identifier; also the cell-map key.
    pub id: String,
    pub kind: CellKind,
    /// Source text. Replicated as collaborative text in the document.
    pub source: String,
    pub metadata: CellMetadata,
    /// Content fingerprint of the last executed source, if any.
    pub fingerprint: Option<String>,
    /// Peer that last executed this cell, if any.
    pub executed_by: Option<String>,
}

impl Cell {
    /// Creates a cell draft ready to be inserted into a notebook.
    pub fn new(id: impl Into<String>, kind: CellKind, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            source: source.into(),
            metadata: CellMetadata::default(),
            fingerprint: None,
            executed_by: None,
        }
    }

    /// Validates invariants that must hold before the cell enters the
    /// replicated document.
    ///
    /// # Errors
    /// - Returns an error when `id` is empty or whitespace-only.
    pub fn validate(&self) -> Result<(), CellValidationError> {
        if self.id.trim().is_empty() {
            return Err(CellValidationError::EmptyId);
        }
        Ok(())
    }
}

/// Validation failure for a cell draft. Programmer error, fails fast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValidationError {
    EmptyId,
}

impl Display for CellValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "cell id must be a non-empty string"),
        }
    }
}

impl Error for CellValidationError {}

#[cfg(test)]
mod tests {
    use super::{Cell, CellKind, CellValidationError};

    #[test]
    fn validate_rejects_blank_ids() {
        let cell = Cell::new("  ", CellKind::Sql, "select 1");
        assert_eq!(cell.validate(), Err(CellValidationError::EmptyId));

        let ok = Cell::new("c1", CellKind::Sql, "select 1");
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn kind_parse_roundtrips_known_tags() {
        assert_eq!(CellKind::parse("sql"), Some(CellKind::Sql));
        assert_eq!(CellKind::parse("markdown"), Some(CellKind::Markdown));
        assert_eq!(CellKind::parse("python"), None);
    }
}
