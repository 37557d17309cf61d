//! Notebook document handle and structural-container accessors.
//!
//! # Responsibility
//! - Wrap the replicated document and expose the notebook's containers.
//! - Run origin-tagged atomic transactions.
//!
//! # Invariants
//! - Accessors are idempotent and lazily create empty containers; they
//!   never fail on an uninitialized document.
//! - Every mutation path commits through `transact` so its changes carry
//!   an origin tag.

use crate::error::{CoreError, CoreResult};
use crate::model::keys;
use crate::model::notebook::NotebookInfo;
use crate::model::origin::TxnOrigin;
use crate::repo::{IdListExt, MapValueExt};
use log::debug;
use loro::{CommitOptions, ExportMode, LoroDoc, LoroList, LoroMap, LoroValue};

/// Handle over one replicated notebook document.
pub struct NotebookDoc {
    doc: LoroDoc,
}

impl Default for NotebookDoc {
    fn default() -> Self {
        Self::new()
    }
}

impl NotebookDoc {
    /// Creates an empty in-memory notebook document.
    pub fn new() -> Self {
        Self {
            doc: LoroDoc::new(),
        }
    }

    /// Wraps an already-loaded document (e.g. restored from a snapshot).
    pub fn from_doc(doc: LoroDoc) -> Self {
        Self { doc }
    }

    /// Raw substrate handle, for sync transports and tests.
    pub fn doc(&self) -> &LoroDoc {
        &self.doc
    }

    // Structural containers. Lazily created by the substrate on first use.

    pub fn cells(&self) -> LoroMap {
        self.doc.get_map(keys::CELLS)
    }

    pub fn order(&self) -> LoroList {
        self.doc.get_list(keys::CELL_ORDER)
    }

    pub fn tombstones(&self) -> LoroMap {
        self.doc.get_map(keys::TOMBSTONES)
    }

    pub fn tombstone_meta(&self) -> LoroMap {
        self.doc.get_map(keys::TOMBSTONE_META)
    }

    pub fn outputs(&self) -> LoroMap {
        self.doc.get_map(keys::OUTPUTS)
    }

    pub fn notebook(&self) -> LoroMap {
        self.doc.get_map(keys::NOTEBOOK)
    }

    pub fn tags(&self) -> LoroList {
        self.doc.get_list(keys::TAGS)
    }

    pub fn notebook_meta(&self) -> LoroMap {
        self.doc.get_map(keys::NOTEBOOK_META)
    }

    pub fn schema_meta(&self) -> LoroMap {
        self.doc.get_map(keys::SCHEMA_META)
    }

    /// Runs `f` and commits all resulting changes atomically under the
    /// given origin tag.
    pub fn transact<T>(
        &self,
        origin: TxnOrigin,
        f: impl FnOnce(&Self) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let result = f(self);
        self.doc
            .commit_with(CommitOptions::new().origin(origin.as_str()));
        result
    }

    // Typed reads.

    /// Visible cell order: string entries only, positions preserved.
    pub fn order_snapshot(&self) -> Vec<String> {
        self.order().raw_entries().into_iter().flatten().collect()
    }

    /// Raw order entries; `None` marks a non-string entry pending repair.
    pub fn order_entries(&self) -> Vec<Option<String>> {
        self.order().raw_entries()
    }

    pub fn cell_ids(&self) -> Vec<String> {
        self.cells().key_list()
    }

    pub fn has_cell(&self, id: &str) -> bool {
        self.cells().get(id).is_some()
    }

    pub fn is_tombstoned(&self, id: &str) -> bool {
        self.tombstones().get_bool_field(id).unwrap_or(false)
    }

    /// Stored schema version, if any replica has stamped one yet.
    pub fn schema_version(&self) -> Option<i64> {
        self.schema_meta().get_i64_field(keys::SCHEMA_VERSION)
    }

    /// Writes the schema version. Caller owns the enclosing transaction.
    pub fn set_schema_version(&self, version: i64) -> CoreResult<()> {
        self.schema_meta()
            .insert(keys::SCHEMA_VERSION, LoroValue::from(version))?;
        Ok(())
    }

    pub fn info(&self) -> NotebookInfo {
        let notebook = self.notebook();
        NotebookInfo {
            id: notebook.get_str_field(keys::NOTEBOOK_ID),
            title: notebook.get_str_field(keys::NOTEBOOK_TITLE),
            database_id: notebook.get_str_field(keys::NOTEBOOK_DATABASE_ID),
        }
    }

    pub fn set_title(&self, title: &str) -> CoreResult<()> {
        self.transact(TxnOrigin::UserAction, |nb| {
            nb.notebook()
                .insert(keys::NOTEBOOK_TITLE, LoroValue::from(title))?;
            Ok(())
        })
    }

    pub fn set_database_id(&self, database_id: Option<&str>) -> CoreResult<()> {
        self.transact(TxnOrigin::UserAction, |nb| {
            match database_id {
                Some(value) => nb
                    .notebook()
                    .insert(keys::NOTEBOOK_DATABASE_ID, LoroValue::from(value))?,
                None => {
                    if nb.notebook().get(keys::NOTEBOOK_DATABASE_ID).is_some() {
                        nb.notebook().delete(keys::NOTEBOOK_DATABASE_ID)?;
                    }
                }
            }
            Ok(())
        })
    }

    pub fn tag_list(&self) -> Vec<String> {
        self.tags().raw_entries().into_iter().flatten().collect()
    }

    pub fn add_tag(&self, tag: &str) -> CoreResult<()> {
        self.transact(TxnOrigin::UserAction, |nb| {
            if !nb.tag_list().iter().any(|t| t == tag) {
                nb.tags().push(LoroValue::from(tag))?;
            }
            Ok(())
        })
    }

    /// Imports every update the other replica has. Test and transport glue.
    pub fn merge_from(&self, other: &NotebookDoc) -> CoreResult<()> {
        let updates = other
            .doc
            .export(ExportMode::all_updates())
            .map_err(|e| CoreError::Merge(format!("{e:?}")))?;
        let status = self.doc.import(&updates)?;
        debug!(
            "event=replica_merge module=repo status=ok bytes={} pending={}",
            updates.len(),
            status.pending.is_some()
        );
        Ok(())
    }
}
