//! Run-scoped execution state with race-safe result application.
//!
//! # Responsibility
//! - Track per-cell execution lifecycle in the outputs container.
//! - Fence stale asynchronous results behind ephemeral run ids.
//!
//! # Invariants
//! - A result only lands when its run id matches the entry's current run
//!   id (or the guard is explicitly bypassed).
//! - The run id is cleared on successful commit, so the same run can
//!   never land twice.
//! - Output mutations use the execution origin and never enter undo
//!   history.

use crate::clock::ClockSource;
use crate::error::CoreResult;
use crate::model::keys;
use crate::model::origin::TxnOrigin;
use crate::model::output::{ApplyOutcome, ExecutionResult, OutputRecord};
use crate::repo::{codec, MapValueExt, NotebookDoc};
use log::debug;
use loro::{LoroMap, LoroValue};
use uuid::Uuid;

/// Options for committing one execution result.
#[derive(Debug, Clone, Default)]
pub struct ApplyResultOptions {
    /// Run id the caller believes it owns. `None` means the caller cannot
    /// prove ownership.
    pub expected_run_id: Option<String>,
    /// Skips the run-id fence entirely. For bulk restores only.
    pub bypass_guard: bool,
    /// Keep the run id after commit instead of clearing it.
    pub keep_run_id: bool,
}

/// Execution guard over one notebook document.
pub struct ExecutionService<'doc> {
    doc: &'doc NotebookDoc,
    clock: &'doc dyn ClockSource,
}

impl<'doc> ExecutionService<'doc> {
    pub fn new(doc: &'doc NotebookDoc, clock: &'doc dyn ClockSource) -> Self {
        Self { doc, clock }
    }

    /// Begins a run: creates the output entry if absent, stamps a fresh
    /// run id, flips to running.
    ///
    /// Returns the run id the caller must present when applying a result.
    pub fn start_execute_cell(&self, id: &str) -> CoreResult<String> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = self.clock.now().epoch_ms;
        self.doc.transact(TxnOrigin::Execution, |nb| {
            let entry = nb.outputs().get_or_create_container(id, LoroMap::new())?;
            entry.insert(keys::OUTPUT_RUNNING, LoroValue::from(true))?;
            entry.insert(keys::OUTPUT_STALE, LoroValue::from(false))?;
            entry.insert(keys::OUTPUT_STARTED_AT, LoroValue::from(started_at))?;
            entry.insert(keys::OUTPUT_RUN_ID, LoroValue::from(run_id.as_str()))?;
            if entry.get(keys::OUTPUT_COMPLETED_AT).is_some() {
                entry.delete(keys::OUTPUT_COMPLETED_AT)?;
            }
            Ok(())
        })?;
        debug!("event=execute_start module=execution status=ok cell={id} run={run_id}");
        Ok(run_id)
    }

    /// Applies a finished result if the run-id fence allows it.
    ///
    /// Refuses to create an entry for a cell that never started (orphan
    /// results), and silently rejects stale or unowned runs; both are
    /// expected concurrency outcomes, reported through the outcome enum.
    pub fn apply_execute_result(
        &self,
        id: &str,
        result: &ExecutionResult,
        opts: &ApplyResultOptions,
    ) -> CoreResult<ApplyOutcome> {
        let Some(entry) = codec::output_entry(&self.doc.outputs(), id) else {
            debug!("event=execute_apply module=execution status=no_entry cell={id}");
            return Ok(ApplyOutcome::NoEntry);
        };

        if !opts.bypass_guard {
            let current = entry.get_str_field(keys::OUTPUT_RUN_ID);
            let allowed = match (current.as_deref(), opts.expected_run_id.as_deref()) {
                // Caller cannot prove it owns the in-flight run.
                (Some(_), None) => false,
                // Run already finalized or cleared elsewhere.
                (None, Some(_)) => false,
                (Some(current), Some(expected)) => current == expected,
                // Nothing in flight and nothing claimed: no fence applies.
                (None, None) => true,
            };
            if !allowed {
                debug!("event=execute_apply module=execution status=run_mismatch cell={id}");
                return Ok(ApplyOutcome::RunMismatch);
            }
        }

        let completed_at = self.clock.now().epoch_ms;
        self.doc.transact(TxnOrigin::Execution, |_| {
            entry.insert(keys::OUTPUT_RUNNING, LoroValue::from(false))?;
            entry.insert(keys::OUTPUT_STALE, LoroValue::from(false))?;
            entry.insert(keys::OUTPUT_COMPLETED_AT, LoroValue::from(completed_at))?;
            codec::write_result(&entry, result)?;
            if !opts.keep_run_id && entry.get(keys::OUTPUT_RUN_ID).is_some() {
                entry.delete(keys::OUTPUT_RUN_ID)?;
            }
            Ok(())
        })?;
        debug!("event=execute_apply module=execution status=ok cell={id}");
        Ok(ApplyOutcome::Applied)
    }

    /// Applies a result against whatever run is currently in flight, so
    /// callers never juggle run ids themselves.
    pub fn apply_execute_result_for_current_run(
        &self,
        id: &str,
        result: &ExecutionResult,
    ) -> CoreResult<ApplyOutcome> {
        let expected = codec::output_entry(&self.doc.outputs(), id)
            .and_then(|entry| entry.get_str_field(keys::OUTPUT_RUN_ID));
        self.apply_execute_result(
            id,
            result,
            &ApplyResultOptions {
                expected_run_id: expected,
                ..ApplyResultOptions::default()
            },
        )
    }

    /// Marks a cell's output stale. Idempotent; no-op without an entry.
    pub fn mark_cell_output_stale(&self, id: &str) -> CoreResult<bool> {
        mark_output_stale(self.doc, id)
    }

    /// Current output record for a cell, if any.
    pub fn output(&self, id: &str) -> Option<OutputRecord> {
        codec::output_entry(&self.doc.outputs(), id).map(|entry| codec::read_output(id, &entry))
    }
}

/// Stale marking shared with the source-change tracker.
pub(crate) fn mark_output_stale(nb: &NotebookDoc, id: &str) -> CoreResult<bool> {
    let Some(entry) = codec::output_entry(&nb.outputs(), id) else {
        return Ok(false);
    };
    if entry.get_bool_field(keys::OUTPUT_STALE).unwrap_or(false) {
        return Ok(false);
    }
    nb.transact(TxnOrigin::Execution, |_| {
        entry.insert(keys::OUTPUT_STALE, LoroValue::from(true))?;
        Ok(())
    })?;
    Ok(true)
}
