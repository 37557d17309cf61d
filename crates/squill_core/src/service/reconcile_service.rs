//! Deterministic auto-repair of order/entity drift.
//!
//! # Responsibility
//! - Rebuild the order sequence from its current snapshot, dropping
//!   invalid, duplicate, dangling and tombstoned entries.
//! - Re-attach orphaned cells deterministically so concurrent repairs
//!   converge.
//!
//! # Invariants
//! - Orphans append sorted by id: identical orphan sets yield identical
//!   orders on every replica, regardless of local map iteration order.
//! - The order is replaced only when the repaired sequence differs, so a
//!   clean pass emits no change events.
//! - Repairs run under the maintenance origin and never enter undo
//!   history.

use crate::error::CoreResult;
use crate::model::origin::TxnOrigin;
use crate::repo::{MapValueExt, NotebookDoc};
use log::{debug, info};
use loro::LoroValue;
use std::collections::HashSet;

/// Tuning knobs for one reconciliation pass.
///
/// Cross-replica convergence assumes all replicas reconcile with the same
/// options; defaults are the shared contract.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Drop empty-string order entries.
    pub drop_empty_ids: bool,
    /// Drop ids absent from the cell map.
    pub drop_missing: bool,
    /// Drop tombstoned ids.
    pub drop_tombstoned: bool,
    /// Append orphaned cells (in map, not ordered, not tombstoned).
    pub append_orphans: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            drop_empty_ids: true,
            drop_missing: true,
            drop_tombstoned: true,
            append_orphans: true,
        }
    }
}

/// Structured outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub changed: bool,
    pub previous_len: usize,
    pub final_len: usize,
    /// Non-string and (when configured) empty-string entries.
    pub removed_invalid: usize,
    pub removed_duplicates: usize,
    pub removed_missing: usize,
    pub removed_tombstoned: usize,
    pub appended_orphans: usize,
}

/// Reconciliation passes over one notebook document.
pub struct ReconcileService<'doc> {
    doc: &'doc NotebookDoc,
}

impl<'doc> ReconcileService<'doc> {
    pub fn new(doc: &'doc NotebookDoc) -> Self {
        Self { doc }
    }

    /// Runs one repair pass with the shared default options.
    pub fn reconcile_notebook(&self) -> CoreResult<ReconcileReport> {
        self.reconcile_notebook_with(&ReconcileOptions::default())
    }

    pub fn reconcile_notebook_with(&self, opts: &ReconcileOptions) -> CoreResult<ReconcileReport> {
        let raw = self.doc.order_entries();
        let mut report = ReconcileReport {
            previous_len: raw.len(),
            ..ReconcileReport::default()
        };

        let mut kept: Vec<String> = Vec::with_capacity(raw.len());
        let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
        for entry in &raw {
            let Some(id) = entry else {
                report.removed_invalid += 1;
                continue;
            };
            if opts.drop_empty_ids && id.is_empty() {
                report.removed_invalid += 1;
                continue;
            }
            if seen.contains(id) {
                report.removed_duplicates += 1;
                continue;
            }
            if opts.drop_missing && !self.doc.has_cell(id) {
                report.removed_missing += 1;
                continue;
            }
            if opts.drop_tombstoned && self.doc.is_tombstoned(id) {
                report.removed_tombstoned += 1;
                continue;
            }
            seen.insert(id.clone());
            kept.push(id.clone());
        }

        if opts.append_orphans {
            let mut orphans: Vec<String> = self
                .doc
                .cell_ids()
                .into_iter()
                .filter(|id| !seen.contains(id) && !self.doc.is_tombstoned(id))
                .collect();
            // Sort by id: the cross-replica determinism guarantee.
            orphans.sort();
            report.appended_orphans = orphans.len();
            kept.extend(orphans);
        }

        report.final_len = kept.len();
        report.changed = kept.len() != raw.len()
            || raw
                .iter()
                .zip(kept.iter())
                .any(|(old, new)| old.as_deref() != Some(new.as_str()));

        if report.changed {
            self.doc.transact(TxnOrigin::Maintenance, |nb| {
                let order = nb.order();
                let len = order.len();
                if len > 0 {
                    order.delete(0, len)?;
                }
                for id in &kept {
                    order.push(LoroValue::from(id.as_str()))?;
                }
                Ok(())
            })?;
            info!(
                "event=reconcile module=reconcile status=repaired prev_len={} final_len={} invalid={} dup={} missing={} tombstoned={} orphans={}",
                report.previous_len,
                report.final_len,
                report.removed_invalid,
                report.removed_duplicates,
                report.removed_missing,
                report.removed_tombstoned,
                report.appended_orphans
            );
        } else {
            debug!("event=reconcile module=reconcile status=clean len={}", raw.len());
        }
        Ok(report)
    }

    /// Drops output entries whose backing cell no longer exists.
    ///
    /// Returns the removed cell ids.
    pub fn reconcile_outputs(&self) -> CoreResult<Vec<String>> {
        let orphaned: Vec<String> = self
            .doc
            .outputs()
            .key_list()
            .into_iter()
            .filter(|id| !self.doc.has_cell(id))
            .collect();

        if !orphaned.is_empty() {
            self.doc.transact(TxnOrigin::Maintenance, |nb| {
                for id in &orphaned {
                    if nb.outputs().get(id).is_some() {
                        nb.outputs().delete(id)?;
                    }
                }
                Ok(())
            })?;
            info!(
                "event=reconcile_outputs module=reconcile status=repaired removed={}",
                orphaned.len()
            );
        }
        Ok(orphaned)
    }
}

#[cfg(test)]
mod tests {
    use super::{ReconcileOptions, ReconcileService};
    use crate::model::cell::{Cell, CellKind};
    use crate::repo::{codec, NotebookDoc};
    use loro::LoroValue;

    fn put_cell(nb: &NotebookDoc, id: &str) {
        codec::write_cell(&nb.cells(), &Cell::new(id, CellKind::Sql, "select 1"))
            .expect("cell should write");
    }

    #[test]
    fn drops_duplicates_keeping_first_occurrence() {
        let nb = NotebookDoc::new();
        put_cell(&nb, "a");
        put_cell(&nb, "b");
        for id in ["a", "b", "a"] {
            nb.order().push(LoroValue::from(id)).expect("push");
        }

        let report = ReconcileService::new(&nb)
            .reconcile_notebook()
            .expect("reconcile should succeed");
        assert!(report.changed);
        assert_eq!(report.removed_duplicates, 1);
        assert_eq!(nb.order_snapshot(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn drops_non_string_and_empty_entries() {
        let nb = NotebookDoc::new();
        put_cell(&nb, "a");
        nb.order().push(LoroValue::from("a")).expect("push");
        nb.order().push(LoroValue::from(7i64)).expect("push");
        nb.order().push(LoroValue::from("")).expect("push");

        let report = ReconcileService::new(&nb)
            .reconcile_notebook()
            .expect("reconcile should succeed");
        assert_eq!(report.removed_invalid, 2);
        assert_eq!(nb.order_snapshot(), vec!["a".to_string()]);
    }

    #[test]
    fn orphan_append_can_be_disabled() {
        let nb = NotebookDoc::new();
        put_cell(&nb, "a");

        let report = ReconcileService::new(&nb)
            .reconcile_notebook_with(&ReconcileOptions {
                append_orphans: false,
                ..ReconcileOptions::default()
            })
            .expect("reconcile should succeed");
        assert!(!report.changed);
        assert!(nb.order_snapshot().is_empty());
    }

    #[test]
    fn reconcile_outputs_drops_orphaned_entries() {
        let nb = NotebookDoc::new();
        put_cell(&nb, "a");
        nb.outputs()
            .get_or_create_container("a", loro::LoroMap::new())
            .expect("output a");
        nb.outputs()
            .get_or_create_container("ghost", loro::LoroMap::new())
            .expect("output ghost");

        let removed = ReconcileService::new(&nb)
            .reconcile_outputs()
            .expect("reconcile outputs should succeed");
        assert_eq!(removed, vec!["ghost".to_string()]);
        assert!(nb.outputs().get("a").is_some());
    }
}
