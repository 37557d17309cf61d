//! Invariant watchers: id immutability and source-change staleness.
//!
//! # Responsibility
//! - Keep every cell's `id` field locked to its first-observed value,
//!   reverting drift from local bugs or remote merges.
//! - Mark execution outputs stale when their cell's source text changes.
//!
//! # Invariants
//! - Repairs never run inside an observer callback; observers only raise a
//!   pending flag and `run_pending`/`sweep` perform the work afterwards.
//! - Id reverts commit under the dedicated id-guard origin so they never
//!   enter undo history.

use crate::error::CoreResult;
use crate::model::keys;
use crate::model::origin::TxnOrigin;
use crate::repo::{codec, MapValueExt, NotebookDoc};
use crate::service::execution_service;
use log::{debug, warn};
use loro::LoroValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Change notification hook on a document.
///
/// The subscription only flips a pending flag; dropping the signal
/// unsubscribes (the subscription owns its own teardown).
pub struct ChangeSignal {
    dirty: Arc<AtomicBool>,
    _subscription: loro::Subscription,
}

impl ChangeSignal {
    /// Subscribes to all changes (local and merged-remote) on the document.
    pub fn observe(nb: &NotebookDoc) -> Self {
        let dirty = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&dirty);
        let subscription = nb
            .doc()
            .subscribe_root(Arc::new(move |_event| {
                flag.store(true, Ordering::Release);
            }));
        Self {
            dirty,
            _subscription: subscription,
        }
    }

    /// Returns whether changes arrived since the last call, clearing the
    /// flag.
    pub fn take_pending(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }
}

/// Registry locking each cell's primary key to its first-observed value.
///
/// Constructed and owned by the embedding application, not process-global.
#[derive(Default)]
pub struct IdGuard {
    locked: Mutex<HashMap<String, String>>,
}

impl IdGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks `id` as immutable. Called on insert and on first read.
    pub fn register(&self, id: &str) {
        let mut locked = self.locked.lock().unwrap_or_else(|p| p.into_inner());
        locked.entry(id.to_string()).or_insert_with(|| id.to_string());
    }

    /// Remembered value for a cell-map key, if registered.
    pub fn locked_value(&self, key: &str) -> Option<String> {
        let locked = self.locked.lock().unwrap_or_else(|p| p.into_inner());
        locked.get(key).cloned()
    }

    /// Scans the cell map, registering newly observed cells and reverting
    /// any `id` field that drifted from its remembered value.
    ///
    /// Returns the number of reverted cells. Reverts commit under the
    /// id-guard origin and are invisible to undo.
    pub fn enforce(&self, nb: &NotebookDoc) -> CoreResult<usize> {
        let cells = nb.cells();
        let mut drifted: Vec<(String, String)> = Vec::new();
        {
            let mut locked = self.locked.lock().unwrap_or_else(|p| p.into_inner());
            for key in cells.key_list() {
                let Some(entry) = cells.get_child_map(&key) else {
                    continue;
                };
                let current = entry.get_str_field(keys::CELL_ID);
                match locked.get(&key) {
                    None => {
                        // First observation locks whatever value is present;
                        // a missing field locks to the map key.
                        let observed = current.unwrap_or_else(|| key.clone());
                        locked.insert(key.clone(), observed);
                    }
                    Some(expected) => {
                        if current.as_deref() != Some(expected.as_str()) {
                            drifted.push((key.clone(), expected.clone()));
                        }
                    }
                }
            }
        }

        if drifted.is_empty() {
            return Ok(0);
        }

        let reverted = nb.transact(TxnOrigin::IdGuard, |nb| {
            let mut count = 0;
            for (key, expected) in &drifted {
                if let Some(entry) = nb.cells().get_child_map(key) {
                    entry.insert(keys::CELL_ID, LoroValue::from(expected.as_str()))?;
                    count += 1;
                }
            }
            Ok(count)
        })?;
        warn!("event=id_guard_revert module=guard status=ok reverted={reverted}");
        Ok(reverted)
    }

    /// Runs enforcement when the signal reports pending changes.
    pub fn run_pending(&self, signal: &ChangeSignal, nb: &NotebookDoc) -> CoreResult<usize> {
        if signal.take_pending() {
            self.enforce(nb)
        } else {
            Ok(0)
        }
    }
}

/// Tracks per-cell source text and marks outputs stale on change.
#[derive(Default)]
pub struct SourceChangeTracker {
    seen: Mutex<HashMap<String, String>>,
}

impl SourceChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records current sources without marking anything stale. Call once
    /// after loading a notebook so pre-existing text is not treated as an
    /// edit.
    pub fn prime(&self, nb: &NotebookDoc) {
        let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        for id in nb.cell_ids() {
            if let Some(cell) = codec::read_cell_by_id(&nb.cells(), &id) {
                seen.insert(id, cell.source);
            }
        }
    }

    /// Compares sources against the last sweep and marks changed cells'
    /// outputs stale. Returns the ids marked.
    pub fn sweep(&self, nb: &NotebookDoc) -> CoreResult<Vec<String>> {
        let mut marked = Vec::new();
        let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        for id in nb.cell_ids() {
            let Some(cell) = codec::read_cell_by_id(&nb.cells(), &id) else {
                continue;
            };
            match seen.get(&id) {
                Some(previous) if *previous != cell.source => {
                    if execution_service::mark_output_stale(nb, &id)? {
                        marked.push(id.clone());
                    }
                    seen.insert(id, cell.source);
                }
                Some(_) => {}
                None => {
                    seen.insert(id, cell.source);
                }
            }
        }
        if !marked.is_empty() {
            debug!(
                "event=stale_sweep module=guard status=ok marked={}",
                marked.len()
            );
        }
        Ok(marked)
    }

    /// Sweep driven by a change signal; no-op when nothing changed.
    pub fn run_pending(&self, signal: &ChangeSignal, nb: &NotebookDoc) -> CoreResult<Vec<String>> {
        if signal.take_pending() {
            self.sweep(nb)
        } else {
            Ok(Vec::new())
        }
    }
}
