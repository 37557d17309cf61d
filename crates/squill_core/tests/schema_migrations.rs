use loro::{LoroMap, LoroValue};
use squill_core::error::CoreResult;
use squill_core::migrate::{
    builtin_registry, effective_schema_version, migrate_notebook_schema, stamp_current_schema,
    MigrateOptions, MigrationRegistry, CURRENT_SCHEMA_VERSION,
};
use squill_core::model::origin::TxnOrigin;
use squill_core::repo::codec;
use squill_core::{Cell, CellKind, NotebookDoc};
use std::sync::Arc;

fn noop_step(_nb: &NotebookDoc) -> CoreResult<()> {
    Ok(())
}

/// Rebuilds the layout written by schema v1: object-shaped tombstones
/// and inline cell results, no stored version.
fn legacy_v1_notebook() -> NotebookDoc {
    let nb = NotebookDoc::new();
    codec::write_cell(&nb.cells(), &Cell::new("a", CellKind::Sql, "select 1")).unwrap();
    nb.order().push(LoroValue::from("a")).unwrap();
    codec::cell_entry(&nb.cells(), "a")
        .unwrap()
        .insert(
            "output",
            LoroValue::from(r#"{"columns":["n"],"rows":[[42]],"rows_affected":1}"#),
        )
        .unwrap();

    let tombstone = nb
        .tombstones()
        .insert_container("dead", LoroMap::new())
        .unwrap();
    tombstone
        .insert("deleted_at", LoroValue::from(1_690_000_000_000i64))
        .unwrap();
    tombstone.insert("reason", LoroValue::from("obsolete")).unwrap();
    tombstone.insert("trusted", LoroValue::from(true)).unwrap();
    nb.doc().commit();
    nb
}

#[test]
fn fresh_documents_are_stamped_current() {
    let nb = NotebookDoc::new();
    assert_eq!(nb.schema_version(), None);
    stamp_current_schema(&nb).unwrap();
    assert_eq!(nb.schema_version(), Some(CURRENT_SCHEMA_VERSION));
}

#[test]
fn builtin_history_carries_v1_documents_to_current() {
    let nb = legacy_v1_notebook();

    let report =
        migrate_notebook_schema(&nb, &builtin_registry(), &MigrateOptions::default()).unwrap();
    assert_eq!(report.from_version, 1);
    assert_eq!(report.to_version, CURRENT_SCHEMA_VERSION);
    assert_eq!(report.steps_applied, 2);
    assert_eq!(report.halted_at, None);
    assert_eq!(report.post_check_errors, 0);

    // Tombstone split: flag plus metadata entry.
    assert!(nb.is_tombstoned("dead"));
    let meta = codec::read_tombstone_meta(&nb.tombstone_meta(), "dead").unwrap();
    assert_eq!(meta.deleted_at_ms, Some(1_690_000_000_000));
    assert_eq!(meta.reason.as_deref(), Some("obsolete"));

    // Inline result relocated into the outputs container.
    let output = codec::output_entry(&nb.outputs(), "a").unwrap();
    let record = codec::read_output("a", &output);
    assert!(!record.running);
    let result = record.result.unwrap();
    assert_eq!(result.columns, vec!["n"]);
    assert_eq!(result.rows_affected, Some(1));
}

#[test]
fn migration_is_idempotent_once_current() {
    let nb = legacy_v1_notebook();
    let registry = builtin_registry();
    migrate_notebook_schema(&nb, &registry, &MigrateOptions::default()).unwrap();

    let second = migrate_notebook_schema(&nb, &registry, &MigrateOptions::default()).unwrap();
    assert_eq!(second.steps_applied, 0);
    assert_eq!(second.from_version, CURRENT_SCHEMA_VERSION);
}

#[test]
fn walk_halts_without_error_on_a_gap() {
    let nb = NotebookDoc::new();
    // Step for v1 only; v2 -> v3 is missing.
    let mut registry = MigrationRegistry::new();
    registry.register(1, Arc::new(noop_step)).unwrap();

    let report = migrate_notebook_schema(&nb, &registry, &MigrateOptions::default()).unwrap();
    assert_eq!(report.to_version, 2);
    assert_eq!(report.halted_at, Some(2));
}

#[test]
fn concurrent_version_bump_skips_the_step() {
    let nb = NotebookDoc::new();
    let mut registry = MigrationRegistry::new();
    let raced = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let raced_in_step = Arc::clone(&raced);
    registry
        .register(1, {
            Arc::new(move |nb: &NotebookDoc| -> CoreResult<()> {
                raced_in_step.store(true, std::sync::atomic::Ordering::SeqCst);
                nb.cells()
                    .insert("should-not-appear", LoroValue::from(true))?;
                Ok(())
            })
        })
        .unwrap();

    // Another replica already advanced past v1.
    nb.transact(TxnOrigin::Maintenance, |nb| {
        nb.set_schema_version(CURRENT_SCHEMA_VERSION)
    })
    .unwrap();

    let report = migrate_notebook_schema(&nb, &registry, &MigrateOptions::default()).unwrap();
    assert_eq!(report.steps_applied, 0);
    assert!(!raced.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(effective_schema_version(&nb), CURRENT_SCHEMA_VERSION);
}
