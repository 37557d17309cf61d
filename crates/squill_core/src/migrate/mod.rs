//! Notebook schema migration registry and executor.
//!
//! # Responsibility
//! - Register schema migration steps keyed by the version they upgrade
//!   *from*.
//! - Walk a document from its stored version to the current one, one
//!   step per transaction.
//!
//! # Invariants
//! - A document with no stored version is treated as
//!   [`FIRST_SCHEMA_VERSION`]; fresh documents are stamped with
//!   [`CURRENT_SCHEMA_VERSION`] before any data lands.
//! - Each step re-reads the live version inside its own transaction, so
//!   two peers migrating concurrently apply every step at most once
//!   after convergence.
//! - Steps run under the maintenance origin and never enter undo
//!   history.

use crate::error::CoreResult;
use crate::model::keys;
use crate::model::notebook::{ClockTrust, TombstoneMeta};
use crate::model::origin::TxnOrigin;
use crate::model::output::ExecutionResult;
use crate::repo::{codec, MapValueExt, NotebookDoc};
use crate::service::reconcile_service::ReconcileService;
use crate::service::validate_service::{validate_notebook, IssueSeverity};
use log::{debug, info, warn};
use loro::{Container, LoroMap, LoroValue, ValueOrContainer};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Oldest schema this library can still read.
pub const FIRST_SCHEMA_VERSION: i64 = 1;
/// Schema written by this build.
pub const CURRENT_SCHEMA_VERSION: i64 = 3;

/// Cell-map field that held inline results before the outputs container
/// existed (schema v2).
const LEGACY_OUTPUT_FIELD: &str = "output";

/// One migration step: upgrades a document from its keyed version to the
/// next one. The executor stamps the new version; steps only move data.
pub type MigrationFn = dyn Fn(&NotebookDoc) -> CoreResult<()> + Send + Sync;

/// Migration registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    InvalidVersion(i64),
    DuplicateVersion(i64),
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidVersion(version) => {
                write!(f, "migration source version is invalid: {version}")
            }
            Self::DuplicateVersion(version) => {
                write!(f, "migration source version already registered: {version}")
            }
        }
    }
}

impl Error for MigrationError {}

/// Runtime migration step registry.
#[derive(Default)]
pub struct MigrationRegistry {
    steps: BTreeMap<i64, Arc<MigrationFn>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one step upgrading from `from_version` to
    /// `from_version + 1`.
    pub fn register(
        &mut self,
        from_version: i64,
        step: Arc<MigrationFn>,
    ) -> Result<(), MigrationError> {
        if from_version < FIRST_SCHEMA_VERSION {
            return Err(MigrationError::InvalidVersion(from_version));
        }
        if self.steps.contains_key(&from_version) {
            return Err(MigrationError::DuplicateVersion(from_version));
        }

        self.steps.insert(from_version, step);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns sorted source versions.
    pub fn registered_versions(&self) -> Vec<i64> {
        self.steps.keys().copied().collect()
    }

    fn get(&self, from_version: i64) -> Option<Arc<MigrationFn>> {
        self.steps.get(&from_version).cloned()
    }
}

/// Options for one migration run.
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// After the walk, run one reconciliation pass (order and outputs)
    /// and advisory validation, reporting error-severity findings.
    pub run_post_checks: bool,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            run_post_checks: true,
        }
    }
}

/// Outcome of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: i64,
    pub to_version: i64,
    /// Steps this run applied itself.
    pub steps_applied: usize,
    /// Steps skipped because a concurrent migrator advanced the version
    /// first.
    pub raced: usize,
    /// Version the walk stopped at because no step was registered for it.
    pub halted_at: Option<i64>,
    /// Error-severity validation findings after the walk (post-checks
    /// enabled only).
    pub post_check_errors: usize,
}

/// Reads the effective schema version: absent means the pre-versioning
/// layout, [`FIRST_SCHEMA_VERSION`].
pub fn effective_schema_version(doc: &NotebookDoc) -> i64 {
    doc.schema_version().unwrap_or(FIRST_SCHEMA_VERSION)
}

/// Stamps a fresh document with the current schema version.
///
/// No-op when any version is already stored; never downgrades.
pub fn stamp_current_schema(doc: &NotebookDoc) -> CoreResult<()> {
    if doc.schema_version().is_some() {
        return Ok(());
    }
    doc.transact(TxnOrigin::Maintenance, |nb| {
        nb.set_schema_version(CURRENT_SCHEMA_VERSION)
    })
}

/// Walks the document from its stored version up to
/// [`CURRENT_SCHEMA_VERSION`], applying one registered step per
/// maintenance transaction.
///
/// The walk halts (without error) at the first version with no
/// registered step; the report records where. Documents already at or
/// beyond the current version are left untouched.
pub fn migrate_notebook_schema(
    doc: &NotebookDoc,
    registry: &MigrationRegistry,
    opts: &MigrateOptions,
) -> CoreResult<MigrationReport> {
    let start = effective_schema_version(doc);
    let mut report = MigrationReport {
        from_version: start,
        to_version: start,
        ..MigrationReport::default()
    };

    loop {
        let version = effective_schema_version(doc);
        report.to_version = version;
        if version >= CURRENT_SCHEMA_VERSION {
            break;
        }
        let Some(step) = registry.get(version) else {
            warn!("event=migrate module=migrate status=halted from={version} reason=no_step");
            report.halted_at = Some(version);
            break;
        };

        let applied = doc.transact(TxnOrigin::Maintenance, |nb| {
            // A concurrent migrator may have landed between the read
            // above and this transaction.
            if effective_schema_version(nb) != version {
                return Ok(false);
            }
            step(nb)?;
            nb.set_schema_version(version + 1)?;
            Ok(true)
        })?;

        if applied {
            report.steps_applied += 1;
            debug!("event=migrate module=migrate status=step_ok from={version}");
        } else {
            report.raced += 1;
            if effective_schema_version(doc) == version {
                // Version neither advanced nor matched: stop rather
                // than spin.
                report.halted_at = Some(version);
                break;
            }
        }
    }

    if opts.run_post_checks {
        let reconcile = ReconcileService::new(doc);
        reconcile.reconcile_notebook()?;
        reconcile.reconcile_outputs()?;
        report.post_check_errors = validate_notebook(doc)
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Error)
            .count();
        if report.post_check_errors > 0 {
            warn!(
                "event=migrate module=migrate status=post_check errors={}",
                report.post_check_errors
            );
        }
    }

    info!(
        "event=migrate module=migrate status=ok from={} to={} applied={} raced={}",
        report.from_version, report.to_version, report.steps_applied, report.raced
    );
    Ok(report)
}

/// The built-in migration history for this document layout.
pub fn builtin_registry() -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    registry
        .register(1, Arc::new(split_legacy_tombstones))
        .expect("builtin source versions are unique and valid");
    registry
        .register(2, Arc::new(relocate_inline_outputs))
        .expect("builtin source versions are unique and valid");
    registry
}

/// v1 -> v2: tombstones held one object per cell (`deleted_at`,
/// `reason`, `trusted`). Split each into the boolean flag plus a
/// metadata entry.
fn split_legacy_tombstones(nb: &NotebookDoc) -> CoreResult<()> {
    for id in nb.tombstones().key_list() {
        let meta = match nb.tombstones().get(&id) {
            Some(ValueOrContainer::Value(LoroValue::Map(fields))) => TombstoneMeta {
                deleted_at_ms: fields.get("deleted_at").and_then(|v| v.as_i64().copied()),
                reason: fields
                    .get("reason")
                    .and_then(|v| v.as_string().map(|s| s.to_string())),
                clock: ClockTrust::from_trusted_flag(
                    fields
                        .get("trusted")
                        .and_then(|v| v.as_bool().copied())
                        .unwrap_or(false),
                ),
            },
            Some(ValueOrContainer::Container(Container::Map(fields))) => TombstoneMeta {
                deleted_at_ms: fields.get_i64_field("deleted_at"),
                reason: fields.get_str_field("reason"),
                clock: ClockTrust::from_trusted_flag(
                    fields.get_bool_field("trusted").unwrap_or(false),
                ),
            },
            // Already flag-shaped, or unreadable; leave as-is.
            _ => continue,
        };
        codec::write_tombstone_meta(&nb.tombstone_meta(), &id, &meta)?;
        nb.tombstones().insert(&id, LoroValue::from(true))?;
        debug!("event=migrate_step module=migrate step=split_tombstone cell={id}");
    }
    Ok(())
}

/// v2 -> v3: cells carried their last result inline as a JSON string.
/// Move each into the outputs container and drop the inline field.
fn relocate_inline_outputs(nb: &NotebookDoc) -> CoreResult<()> {
    for id in nb.cell_ids() {
        let Some(entry) = codec::cell_entry(&nb.cells(), &id) else {
            continue;
        };
        let Some(raw) = entry.get_str_field(LEGACY_OUTPUT_FIELD) else {
            continue;
        };
        match serde_json::from_str::<ExecutionResult>(&raw) {
            Ok(result) => {
                let output = nb.outputs().get_or_create_container(&id, LoroMap::new())?;
                output.insert(keys::OUTPUT_RUNNING, LoroValue::from(false))?;
                output.insert(keys::OUTPUT_STALE, LoroValue::from(false))?;
                codec::write_result(&output, &result)?;
                debug!("event=migrate_step module=migrate step=relocate_output cell={id}");
            }
            Err(err) => {
                // Unreadable inline results are dropped, not carried.
                warn!(
                    "event=migrate_step module=migrate step=relocate_output status=unreadable cell={id} error={err}"
                );
            }
        }
        entry.delete(LEGACY_OUTPUT_FIELD)?;
    }
    Ok(())
}
