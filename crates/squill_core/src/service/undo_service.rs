//! User-facing undo/redo scoping.
//!
//! # Responsibility
//! - Build the undo manager so only user-action transactions enter undo
//!   history.
//!
//! # Invariants
//! - Every non-user origin is excluded explicitly; the exhaustive match
//!   in [`TxnOrigin::tracked_in_undo`] forces new origins to take a
//!   position.
//! - Maintenance, vacuum, execution and id-guard transactions mutate the
//!   same containers yet stay invisible here.

use crate::error::CoreResult;
use crate::model::origin::TxnOrigin;
use crate::repo::NotebookDoc;
use loro::UndoManager;

/// Origin-filtered undo/redo over one notebook document.
///
/// Construct the scope before the edits it should track; changes
/// committed earlier are not observed.
pub struct UndoScope {
    manager: UndoManager,
}

impl UndoScope {
    pub fn new(nb: &NotebookDoc) -> Self {
        let mut manager = UndoManager::new(nb.doc());
        // Each commit is its own undo step; no time-based merging.
        manager.set_merge_interval(0);
        for origin in TxnOrigin::ALL {
            if !origin.tracked_in_undo() {
                manager.add_exclude_origin_prefix(origin.as_str());
            }
        }
        Self { manager }
    }

    /// Undoes the most recent tracked transaction. Returns whether
    /// anything was undone.
    pub fn undo(&mut self) -> CoreResult<bool> {
        Ok(self.manager.undo()?)
    }

    /// Re-applies the most recently undone transaction.
    pub fn redo(&mut self) -> CoreResult<bool> {
        Ok(self.manager.redo()?)
    }

    pub fn can_undo(&self) -> bool {
        self.manager.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.manager.can_redo()
    }
}
