//! Stable container and field identifiers inside the replicated document.
//!
//! These strings are the wire-level schema. Renaming any of them is a
//! breaking schema change and must go through the migration framework.

/// Cell map: cell id -> cell entity. Authoritative store of all cells,
/// including soft-deleted ones pending GC.
pub const CELLS: &str = "cells";

/// Ordered sequence of cell ids. Presence here means "live and visible".
pub const CELL_ORDER: &str = "cell_order";

/// Tombstone flags: cell id -> bool.
pub const TOMBSTONES: &str = "tombstones";

/// Tombstone metadata: cell id -> { deleted_at, reason, clock }.
pub const TOMBSTONE_META: &str = "tombstone_meta";

/// Execution outputs: cell id -> output record. Deliberately decoupled from
/// the cell entity so undo tracking and migrations never touch it.
pub const OUTPUTS: &str = "outputs";

/// Notebook root fields: id, title, database id.
pub const NOTEBOOK: &str = "notebook";

/// Ordered notebook tags.
pub const TAGS: &str = "tags";

/// Open notebook-level key/value metadata.
pub const NOTEBOOK_META: &str = "notebook_meta";

/// Schema bookkeeping. Single source of truth for migration state.
pub const SCHEMA_META: &str = "_meta";

pub const SCHEMA_VERSION: &str = "schema_version";

pub const NOTEBOOK_ID: &str = "id";
pub const NOTEBOOK_TITLE: &str = "title";
pub const NOTEBOOK_DATABASE_ID: &str = "database_id";

pub const CELL_ID: &str = "id";
pub const CELL_KIND: &str = "kind";
pub const CELL_SOURCE: &str = "source";
pub const CELL_METADATA: &str = "metadata";
pub const CELL_BACKGROUND_DDL: &str = "background_ddl";
pub const CELL_FINGERPRINT: &str = "fingerprint";
pub const CELL_EXECUTED_BY: &str = "executed_by";

pub const META_DELETED_AT: &str = "deleted_at";
pub const META_REASON: &str = "reason";
pub const META_CLOCK: &str = "clock";

pub const OUTPUT_RUNNING: &str = "running";
pub const OUTPUT_STALE: &str = "stale";
pub const OUTPUT_STARTED_AT: &str = "started_at";
pub const OUTPUT_COMPLETED_AT: &str = "completed_at";
pub const OUTPUT_RUN_ID: &str = "run_id";
pub const OUTPUT_RESULT: &str = "result";
