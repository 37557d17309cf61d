use squill_core::{
    ApplyOutcome, ApplyResultOptions, Cell, CellKind, ExecutionResult, ExecutionService,
    FixedClock, MutationService, NotebookDoc,
};

fn result_with_error(message: &str) -> ExecutionResult {
    ExecutionResult {
        columns: Vec::new(),
        rows: Vec::new(),
        rows_affected: None,
        error: Some(message.to_string()),
    }
}

fn result_rows(n: i64) -> ExecutionResult {
    ExecutionResult {
        columns: vec!["n".to_string()],
        rows: vec![vec![serde_json::json!(n)]],
        rows_affected: None,
        error: None,
    }
}

fn notebook_with_cell(id: &str) -> NotebookDoc {
    let nb = NotebookDoc::new();
    MutationService::new(&nb)
        .insert_cell(&Cell::new(id, CellKind::Sql, "select 1"), None)
        .unwrap();
    nb
}

#[test]
fn start_marks_running_and_returns_run_id() {
    let nb = notebook_with_cell("c1");
    let clock = FixedClock::new(1_700_000_000_000, true);
    let exec = ExecutionService::new(&nb, &clock);

    let run = exec.start_execute_cell("c1").unwrap();
    assert!(!run.is_empty());

    let output = exec.output("c1").unwrap();
    assert!(output.running);
    assert!(!output.stale);
    assert_eq!(output.run_id.as_deref(), Some(run.as_str()));
    assert_eq!(output.started_at_ms, Some(1_700_000_000_000));
    assert!(output.completed_at_ms.is_none());
}

#[test]
fn stale_run_cannot_overwrite_a_newer_one() {
    let nb = notebook_with_cell("c1");
    let clock = FixedClock::new(1_700_000_000_000, true);
    let exec = ExecutionService::new(&nb, &clock);

    let first_run = exec.start_execute_cell("c1").unwrap();
    let second_run = exec.start_execute_cell("c1").unwrap();
    assert_ne!(first_run, second_run);

    // The first run finishes late; its result must be discarded.
    let outcome = exec
        .apply_execute_result(
            "c1",
            &result_with_error("slow query aborted"),
            &ApplyResultOptions {
                expected_run_id: Some(first_run),
                ..ApplyResultOptions::default()
            },
        )
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::RunMismatch);
    let output = exec.output("c1").unwrap();
    assert!(output.running);
    assert!(output.result.is_none());

    // The second run lands normally and clears the fence.
    let outcome = exec
        .apply_execute_result(
            "c1",
            &result_rows(2),
            &ApplyResultOptions {
                expected_run_id: Some(second_run),
                ..ApplyResultOptions::default()
            },
        )
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Applied);
    let output = exec.output("c1").unwrap();
    assert!(!output.running);
    assert!(output.run_id.is_none());
    assert_eq!(output.completed_at_ms, Some(1_700_000_000_000));
    assert_eq!(output.result.unwrap().rows.len(), 1);
}

#[test]
fn replaying_a_finished_run_is_rejected() {
    let nb = notebook_with_cell("c1");
    let clock = FixedClock::new(1_700_000_000_000, true);
    let exec = ExecutionService::new(&nb, &clock);

    let run = exec.start_execute_cell("c1").unwrap();
    let opts = ApplyResultOptions {
        expected_run_id: Some(run),
        ..ApplyResultOptions::default()
    };
    assert_eq!(
        exec.apply_execute_result("c1", &result_rows(1), &opts)
            .unwrap(),
        ApplyOutcome::Applied
    );
    // Same run id again: the fence was cleared on commit.
    assert_eq!(
        exec.apply_execute_result("c1", &result_rows(9), &opts)
            .unwrap(),
        ApplyOutcome::RunMismatch
    );
    let rows = exec.output("c1").unwrap().result.unwrap().rows;
    assert_eq!(rows, vec![vec![serde_json::json!(1)]]);
}

#[test]
fn unowned_result_cannot_land_on_an_inflight_run() {
    let nb = notebook_with_cell("c1");
    let clock = FixedClock::new(1_700_000_000_000, true);
    let exec = ExecutionService::new(&nb, &clock);

    exec.start_execute_cell("c1").unwrap();
    let outcome = exec
        .apply_execute_result("c1", &result_rows(1), &ApplyResultOptions::default())
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::RunMismatch);
}

#[test]
fn result_for_a_vacuumed_cell_is_never_recreated() {
    let nb = notebook_with_cell("c1");
    let clock = FixedClock::new(1_700_000_000_000, true);
    let exec = ExecutionService::new(&nb, &clock);

    let run = exec.start_execute_cell("c1").unwrap();
    MutationService::new(&nb).remove_cell("c1").unwrap();

    let outcome = exec
        .apply_execute_result(
            "c1",
            &result_rows(1),
            &ApplyResultOptions {
                expected_run_id: Some(run),
                ..ApplyResultOptions::default()
            },
        )
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::NoEntry);
    assert!(nb.outputs().get("c1").is_none());
}

#[test]
fn current_run_helper_tracks_the_live_fence() {
    let nb = notebook_with_cell("c1");
    let clock = FixedClock::new(1_700_000_000_000, true);
    let exec = ExecutionService::new(&nb, &clock);

    exec.start_execute_cell("c1").unwrap();
    assert_eq!(
        exec.apply_execute_result_for_current_run("c1", &result_rows(7))
            .unwrap(),
        ApplyOutcome::Applied
    );
    assert!(exec.output("c1").unwrap().result.is_some());
}
