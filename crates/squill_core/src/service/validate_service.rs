//! Advisory consistency diagnostics.
//!
//! # Responsibility
//! - Surface structural drift as an issue list for observability and
//!   tests.
//!
//! # Invariants
//! - Validation never mutates the document and never throws; repair is
//!   the reconciliation engine's job.

use crate::clock::EPOCH_FLOOR_MS;
use crate::model::keys;
use crate::model::notebook::ClockTrust;
use crate::repo::{codec, MapValueExt, NotebookDoc};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Breaks a structural invariant; reconciliation will repair it.
    Error,
    /// Suspicious but tolerated state.
    Warning,
}

impl Display for IssueSeverity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// One advisory finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    /// Stable machine-readable tag, e.g. `order_dangling_id`.
    pub code: &'static str,
    pub message: String,
    pub cell_id: Option<String>,
}

impl ValidationIssue {
    fn error(code: &'static str, message: String, cell_id: Option<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            code,
            message,
            cell_id,
        }
    }

    fn warning(code: &'static str, message: String, cell_id: Option<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            code,
            message,
            cell_id,
        }
    }
}

/// Scans one notebook document and reports every advisory inconsistency.
pub fn validate_notebook(nb: &NotebookDoc) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let entries = nb.order_entries();
    let mut seen: HashSet<String> = HashSet::new();
    for (position, entry) in entries.iter().enumerate() {
        let Some(id) = entry else {
            issues.push(ValidationIssue::error(
                "order_non_string_entry",
                format!("order position {position} holds a non-string entry"),
                None,
            ));
            continue;
        };
        if id.is_empty() {
            issues.push(ValidationIssue::error(
                "order_empty_id",
                format!("order position {position} holds an empty id"),
                None,
            ));
            continue;
        }
        if !seen.insert(id.clone()) {
            issues.push(ValidationIssue::error(
                "order_duplicate_id",
                format!("cell `{id}` appears more than once in the order"),
                Some(id.clone()),
            ));
            continue;
        }
        if !nb.has_cell(id) {
            issues.push(ValidationIssue::error(
                "order_dangling_id",
                format!("order references `{id}` but the cell map has no such entity"),
                Some(id.clone()),
            ));
        }
        if nb.is_tombstoned(id) {
            issues.push(ValidationIssue::warning(
                "order_tombstoned_id",
                format!("soft-deleted cell `{id}` is still visible in the order"),
                Some(id.clone()),
            ));
        }
    }

    for id in nb.cell_ids() {
        match codec::cell_entry(&nb.cells(), &id) {
            Some(entry) => {
                let id_field = entry.get_str_field(keys::CELL_ID);
                if id_field.as_deref() != Some(id.as_str()) {
                    issues.push(ValidationIssue::error(
                        "cell_id_mismatch",
                        format!(
                            "cell map key `{id}` disagrees with its id field `{}`",
                            id_field.unwrap_or_default()
                        ),
                        Some(id.clone()),
                    ));
                }
            }
            None => {
                issues.push(ValidationIssue::error(
                    "cell_malformed_entry",
                    format!("cell map entry `{id}` is not a map"),
                    Some(id.clone()),
                ));
                continue;
            }
        }
        if !seen.contains(&id) && !nb.is_tombstoned(&id) {
            issues.push(ValidationIssue::warning(
                "cell_orphaned",
                format!("cell `{id}` is neither ordered nor tombstoned"),
                Some(id.clone()),
            ));
        }
    }

    for id in nb.tombstones().key_list() {
        if !nb.is_tombstoned(&id) {
            continue;
        }
        match codec::read_tombstone_meta(&nb.tombstone_meta(), &id) {
            None => issues.push(ValidationIssue::warning(
                "tombstone_missing_meta",
                format!("tombstone `{id}` has no deletion metadata"),
                Some(id.clone()),
            )),
            Some(meta) => {
                match meta.deleted_at_ms {
                    None => issues.push(ValidationIssue::warning(
                        "tombstone_unstamped",
                        format!("tombstone `{id}` carries no deletion timestamp"),
                        Some(id.clone()),
                    )),
                    Some(ms) if ms < EPOCH_FLOOR_MS => issues.push(ValidationIssue::warning(
                        "tombstone_implausible_stamp",
                        format!("tombstone `{id}` is stamped before the epoch floor"),
                        Some(id.clone()),
                    )),
                    Some(_) => {}
                }
                if meta.clock == ClockTrust::Local && meta.deleted_at_ms.is_some() {
                    issues.push(ValidationIssue::warning(
                        "tombstone_untrusted_clock",
                        format!("tombstone `{id}` is stamped by an untrusted clock"),
                        Some(id.clone()),
                    ));
                }
            }
        }
    }

    for id in nb.outputs().key_list() {
        if !nb.has_cell(&id) {
            issues.push(ValidationIssue::warning(
                "output_orphaned",
                format!("output entry `{id}` has no backing cell"),
                Some(id.clone()),
            ));
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::{validate_notebook, IssueSeverity};
    use crate::model::cell::{Cell, CellKind};
    use crate::repo::{codec, NotebookDoc};
    use loro::LoroValue;

    #[test]
    fn clean_notebook_reports_no_issues() {
        let nb = NotebookDoc::new();
        codec::write_cell(&nb.cells(), &Cell::new("a", CellKind::Sql, "select 1"))
            .expect("cell should write");
        nb.order().push(LoroValue::from("a")).expect("push");
        assert!(validate_notebook(&nb).is_empty());
    }

    #[test]
    fn reports_dangling_duplicate_and_orphan() {
        let nb = NotebookDoc::new();
        codec::write_cell(&nb.cells(), &Cell::new("a", CellKind::Sql, "select 1"))
            .expect("cell should write");
        codec::write_cell(&nb.cells(), &Cell::new("orphan", CellKind::Sql, "select 2"))
            .expect("cell should write");
        for id in ["a", "a", "ghost"] {
            nb.order().push(LoroValue::from(id)).expect("push");
        }

        let issues = validate_notebook(&nb);
        let codes: Vec<_> = issues.iter().map(|i| i.code).collect();
        assert!(codes.contains(&"order_duplicate_id"));
        assert!(codes.contains(&"order_dangling_id"));
        assert!(codes.contains(&"cell_orphaned"));
        assert!(issues
            .iter()
            .any(|i| i.code == "cell_orphaned" && i.severity == IssueSeverity::Warning));
    }
}
