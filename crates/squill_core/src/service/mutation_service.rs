//! Structural cell mutations: insert, remove, move.
//!
//! # Responsibility
//! - The only operations that touch the order sequence and the cell map
//!   together, always inside a single transaction.
//!
//! # Invariants
//! - The order sequence never references an id absent from the cell map,
//!   even transiently inside one transaction.
//! - Insert dedups stale occurrences of the same id before writing.
//! - Move is a no-op when the computed target position is unchanged.

use crate::error::{CoreError, CoreResult};
use crate::model::cell::Cell;
use crate::model::origin::TxnOrigin;
use crate::repo::{codec, IdListExt, NotebookDoc};
use crate::service::guard_service::IdGuard;
use log::debug;
use loro::LoroValue;

/// Mutation entry points over one notebook document.
pub struct MutationService<'doc> {
    doc: &'doc NotebookDoc,
    id_guard: Option<&'doc IdGuard>,
}

impl<'doc> MutationService<'doc> {
    pub fn new(doc: &'doc NotebookDoc) -> Self {
        Self { doc, id_guard: None }
    }

    /// Registers inserted cells with the id-guard so their primary key is
    /// locked immutable from first observation.
    pub fn with_id_guard(doc: &'doc NotebookDoc, id_guard: &'doc IdGuard) -> Self {
        Self {
            doc,
            id_guard: Some(id_guard),
        }
    }

    /// Inserts a cell at `index` (clamped; `None` appends).
    ///
    /// # Errors
    /// - Returns an error when the cell id is empty or whitespace-only.
    pub fn insert_cell(&self, cell: &Cell, index: Option<usize>) -> CoreResult<()> {
        self.insert_cell_with_origin(cell, index, TxnOrigin::UserAction)
    }

    pub fn insert_cell_with_origin(
        &self,
        cell: &Cell,
        index: Option<usize>,
        origin: TxnOrigin,
    ) -> CoreResult<()> {
        cell.validate()
            .map_err(|_| CoreError::InvalidCellId(cell.id.clone()))?;

        self.doc.transact(origin, |nb| {
            let order = nb.order();

            // Defensive dedup against replay/duplicate-insert races.
            let stale = order.positions_of(&cell.id);
            for position in stale.iter().rev() {
                order.delete(*position, 1)?;
            }
            if !stale.is_empty() {
                debug!(
                    "event=insert_dedup module=mutation status=ok cell={} removed={}",
                    cell.id,
                    stale.len()
                );
            }

            // Map before order: no replica may observe an order entry whose
            // entity is missing.
            codec::write_cell(&nb.cells(), cell)?;

            let len = order.len();
            let position = index.unwrap_or(len).min(len);
            order.insert(position, LoroValue::from(cell.id.as_str()))?;
            Ok(())
        })?;

        if let Some(guard) = self.id_guard {
            guard.register(&cell.id);
        }
        debug!(
            "event=insert_cell module=mutation status=ok cell={} index={:?}",
            cell.id, index
        );
        Ok(())
    }

    /// Hard, non-recoverable removal: strips the id from the order, the
    /// cell map, tombstone bookkeeping and outputs.
    pub fn remove_cell(&self, id: &str) -> CoreResult<()> {
        self.remove_cell_with_origin(id, TxnOrigin::UserAction)
    }

    pub fn remove_cell_with_origin(&self, id: &str, origin: TxnOrigin) -> CoreResult<()> {
        self.doc.transact(origin, |nb| {
            let order = nb.order();
            for position in order.positions_of(id).iter().rev() {
                order.delete(*position, 1)?;
            }
            purge_cell_records(nb, id)?;
            Ok(())
        })?;
        debug!("event=remove_cell module=mutation status=ok cell={id}");
        Ok(())
    }

    /// Moves a cell to `to_index` (clamped). No-op when the id is not in
    /// the order or the computed target position equals the current one.
    ///
    /// Returns whether the order changed.
    pub fn move_cell(&self, id: &str, to_index: usize) -> CoreResult<bool> {
        self.move_cell_with_origin(id, to_index, TxnOrigin::UserAction)
    }

    pub fn move_cell_with_origin(
        &self,
        id: &str,
        to_index: usize,
        origin: TxnOrigin,
    ) -> CoreResult<bool> {
        // Raw entries, not the filtered snapshot: delete/insert below
        // address raw list positions, and non-string drift entries
        // pending repair still occupy slots.
        let entries = self.doc.order_entries();
        let Some(position) = entries
            .iter()
            .position(|entry| entry.as_deref() == Some(id))
        else {
            return Ok(false);
        };

        // Clamp on the full sequence, then reclamp for the post-delete
        // length; the reinsert happens in the shrunk sequence.
        let clamped = to_index.min(entries.len());
        let target = clamped.min(entries.len().saturating_sub(1));
        if target == position {
            return Ok(false);
        }

        self.doc.transact(origin, |nb| {
            let order = nb.order();
            order.delete(position, 1)?;
            order.insert(target, LoroValue::from(id))?;
            Ok(())
        })?;
        debug!("event=move_cell module=mutation status=ok cell={id} to={target}");
        Ok(true)
    }
}

/// Deletes every record held for `id` outside the order sequence.
/// Shared by hard remove and the vacuum sweep; caller owns the transaction.
pub(crate) fn purge_cell_records(nb: &NotebookDoc, id: &str) -> CoreResult<()> {
    if nb.cells().get(id).is_some() {
        nb.cells().delete(id)?;
    }
    if nb.tombstones().get(id).is_some() {
        nb.tombstones().delete(id)?;
    }
    if nb.tombstone_meta().get(id).is_some() {
        nb.tombstone_meta().delete(id)?;
    }
    if nb.outputs().get(id).is_some() {
        nb.outputs().delete(id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::MutationService;
    use crate::error::CoreError;
    use crate::model::cell::{Cell, CellKind};
    use crate::repo::NotebookDoc;

    fn sql_cell(id: &str) -> Cell {
        Cell::new(id, CellKind::Sql, "select 1")
    }

    #[test]
    fn insert_rejects_empty_ids() {
        let nb = NotebookDoc::new();
        let service = MutationService::new(&nb);
        let err = service
            .insert_cell(&sql_cell("   "), None)
            .expect_err("blank id must be rejected");
        assert!(matches!(err, CoreError::InvalidCellId(_)));
    }

    #[test]
    fn insert_clamps_out_of_range_index() {
        let nb = NotebookDoc::new();
        let service = MutationService::new(&nb);
        service
            .insert_cell(&sql_cell("a"), Some(99))
            .expect("insert should clamp");
        service
            .insert_cell(&sql_cell("b"), Some(0))
            .expect("insert at head should succeed");
        assert_eq!(nb.order_snapshot(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn insert_dedups_stale_order_occurrences() {
        let nb = NotebookDoc::new();
        let service = MutationService::new(&nb);
        service.insert_cell(&sql_cell("a"), None).expect("insert a");
        // Simulate a replayed insert of the same id.
        service.insert_cell(&sql_cell("a"), Some(0)).expect("reinsert a");
        assert_eq!(nb.order_snapshot(), vec!["a".to_string()]);
    }

    #[test]
    fn remove_cell_clears_all_records() {
        let nb = NotebookDoc::new();
        let service = MutationService::new(&nb);
        service.insert_cell(&sql_cell("a"), None).expect("insert a");
        service.remove_cell("a").expect("remove a");
        assert!(nb.order_snapshot().is_empty());
        assert!(!nb.has_cell("a"));
        assert!(!nb.is_tombstoned("a"));
    }

    #[test]
    fn move_addresses_raw_positions_when_drift_entries_precede() {
        let nb = NotebookDoc::new();
        let service = MutationService::new(&nb);
        service.insert_cell(&sql_cell("a"), None).expect("insert a");
        service.insert_cell(&sql_cell("b"), None).expect("insert b");
        // A non-string entry pending repair occupies a raw slot ahead
        // of both cells.
        nb.order()
            .insert(0, loro::LoroValue::from(42i64))
            .expect("drift entry should insert");

        let moved = service.move_cell("b", 0).expect("move should succeed");
        assert!(moved);
        assert_eq!(nb.order_snapshot(), vec!["b".to_string(), "a".to_string()]);
        assert!(nb.has_cell("a"));
        assert_eq!(
            nb.order_snapshot().iter().filter(|id| *id == "b").count(),
            1
        );
    }

    #[test]
    fn move_noop_when_target_position_unchanged() {
        let nb = NotebookDoc::new();
        let service = MutationService::new(&nb);
        service.insert_cell(&sql_cell("a"), None).expect("insert a");
        service.insert_cell(&sql_cell("b"), None).expect("insert b");

        let moved = service.move_cell("b", 0).expect("move should succeed");
        assert!(moved);
        assert_eq!(nb.order_snapshot(), vec!["b".to_string(), "a".to_string()]);

        let moved_again = service.move_cell("b", 0).expect("repeat move should no-op");
        assert!(!moved_again);
        let missing = service.move_cell("zz", 0).expect("absent id should no-op");
        assert!(!missing);
    }
}
