use squill_core::{
    Cell, CellKind, ExecutionService, FixedClock, MutationService, NotebookDoc,
    SoftDeleteOptions, TombstoneService, UndoScope,
};

fn sql_cell(id: &str) -> Cell {
    Cell::new(id, CellKind::Sql, "select 1")
}

#[test]
fn undo_and_redo_walk_user_edits() {
    let nb = NotebookDoc::new();
    let mut undo = UndoScope::new(&nb);
    let cells = MutationService::new(&nb);

    cells.insert_cell(&sql_cell("a"), None).unwrap();
    cells.insert_cell(&sql_cell("b"), None).unwrap();
    assert_eq!(nb.order_snapshot(), vec!["a", "b"]);

    assert!(undo.undo().unwrap());
    assert_eq!(nb.order_snapshot(), vec!["a"]);
    assert!(undo.undo().unwrap());
    assert!(nb.order_snapshot().is_empty());
    assert!(!undo.can_undo());

    assert!(undo.redo().unwrap());
    assert!(undo.redo().unwrap());
    assert_eq!(nb.order_snapshot(), vec!["a", "b"]);
}

#[test]
fn soft_delete_is_one_undoable_step() {
    let nb = NotebookDoc::new();
    let clock = FixedClock::new(1_700_000_000_000, true);
    let mut undo = UndoScope::new(&nb);

    MutationService::new(&nb)
        .insert_cell(&sql_cell("a"), None)
        .unwrap();
    TombstoneService::new(&nb, &clock)
        .soft_delete_cell("a", Some("cleanup"), &SoftDeleteOptions::default())
        .unwrap();
    assert!(nb.is_tombstoned("a"));

    // One undo reverses the flag, the metadata and the order removal
    // together.
    assert!(undo.undo().unwrap());
    assert!(!nb.is_tombstoned("a"));
    assert!(nb.tombstone_meta().get("a").is_none());
    assert_eq!(nb.order_snapshot(), vec!["a"]);

    assert!(undo.redo().unwrap());
    assert!(nb.is_tombstoned("a"));
    assert!(nb.order_snapshot().is_empty());
}

#[test]
fn execution_state_never_enters_undo_history() {
    let nb = NotebookDoc::new();
    let clock = FixedClock::new(1_700_000_000_000, true);
    let mut undo = UndoScope::new(&nb);

    MutationService::new(&nb)
        .insert_cell(&sql_cell("a"), None)
        .unwrap();
    let exec = ExecutionService::new(&nb, &clock);
    exec.start_execute_cell("a").unwrap();
    exec.mark_cell_output_stale("a").unwrap();

    // The only undoable step is the insert; output state survives it.
    assert!(undo.undo().unwrap());
    assert!(!undo.can_undo());
    assert!(nb.order_snapshot().is_empty());
    assert!(nb.outputs().get("a").is_some());
}
