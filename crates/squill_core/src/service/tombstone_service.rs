//! Soft-delete lifecycle and the vacuum garbage collector.
//!
//! # Responsibility
//! - Flag deletions with timestamp/trust metadata instead of destroying
//!   entities.
//! - Permanently purge tombstoned cells only once every safety gate
//!   passes.
//!
//! # Invariants
//! - A flag alone never triggers destruction; vacuum requires a plausible
//!   `deleted_at` stamped by a trusted clock, a trusted "now", an elapsed
//!   TTL and absence from the order sequence.
//! - Untrusted or implausible timestamps are ignored, erring toward
//!   retention over destructive action.

use crate::clock::{ClockReading, ClockSource, DEFAULT_MAX_FUTURE_SKEW_MS, EPOCH_FLOOR_MS};
use crate::error::CoreResult;
use crate::model::keys;
use crate::model::notebook::{ClockTrust, TombstoneMeta};
use crate::model::origin::TxnOrigin;
use crate::repo::{codec, IdListExt, MapValueExt, NotebookDoc};
use crate::service::mutation_service::purge_cell_records;
use log::{debug, info};
use loro::LoroValue;

/// Optional overrides for one soft delete.
#[derive(Debug, Clone, Default)]
pub struct SoftDeleteOptions {
    /// Explicit deletion time. Trusted by default when supplied.
    pub deleted_at_ms: Option<i64>,
    /// Overrides the trust attached to `deleted_at_ms`.
    pub trusted: Option<bool>,
    /// Origin override for internal callers.
    pub origin: Option<TxnOrigin>,
}

/// Options for one vacuum sweep.
#[derive(Debug, Clone)]
pub struct VacuumOptions {
    /// Caller-asserted "now". Falls back to the service clock.
    pub now: Option<ClockReading>,
    /// Deletion stamps beyond `now + skew` are treated as adversarial.
    pub max_future_skew_ms: i64,
}

impl Default for VacuumOptions {
    fn default() -> Self {
        Self {
            now: None,
            max_future_skew_ms: DEFAULT_MAX_FUTURE_SKEW_MS,
        }
    }
}

/// Result of one vacuum sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VacuumReport {
    /// Tombstone flags examined.
    pub examined: usize,
    /// Cells permanently purged.
    pub removed: usize,
    /// Flags retained because a safety gate failed.
    pub retained: usize,
}

/// Tombstone lifecycle operations over one notebook document.
pub struct TombstoneService<'doc> {
    doc: &'doc NotebookDoc,
    clock: &'doc dyn ClockSource,
}

impl<'doc> TombstoneService<'doc> {
    pub fn new(doc: &'doc NotebookDoc, clock: &'doc dyn ClockSource) -> Self {
        Self { doc, clock }
    }

    /// Soft-deletes a cell: removes it from the order, flags the
    /// tombstone and stamps deletion metadata.
    ///
    /// Timestamp resolution: an explicit timestamp is trusted by default;
    /// otherwise the service clock supplies the reading and its own trust.
    /// Readings below the epoch floor are discarded (the tombstone is
    /// still flagged, without `deleted_at`).
    pub fn soft_delete_cell(
        &self,
        id: &str,
        reason: Option<&str>,
        opts: &SoftDeleteOptions,
    ) -> CoreResult<()> {
        let stamp = self.resolve_stamp(opts);
        let meta = TombstoneMeta {
            deleted_at_ms: stamp.map(|s| s.epoch_ms),
            reason: reason.map(str::to_string),
            clock: ClockTrust::from_trusted_flag(stamp.map(|s| s.trusted).unwrap_or(false)),
        };
        let origin = opts.origin.unwrap_or(TxnOrigin::UserAction);

        self.doc.transact(origin, |nb| {
            let order = nb.order();
            for position in order.positions_of(id).iter().rev() {
                order.delete(*position, 1)?;
            }
            nb.tombstones().insert(id, LoroValue::from(true))?;
            codec::write_tombstone_meta(&nb.tombstone_meta(), id, &meta)?;
            Ok(())
        })?;
        debug!(
            "event=soft_delete module=tombstone status=ok cell={id} stamped={} clock={}",
            meta.deleted_at_ms.is_some(),
            meta.clock
        );
        Ok(())
    }

    /// Restores a soft-deleted cell into the order at `index` (clamped;
    /// `None` appends). No-op when the entity no longer exists.
    pub fn restore_cell(&self, id: &str, index: Option<usize>) -> CoreResult<bool> {
        if !self.doc.has_cell(id) {
            return Ok(false);
        }
        self.doc.transact(TxnOrigin::UserAction, |nb| {
            if nb.tombstones().get(id).is_some() {
                nb.tombstones().delete(id)?;
            }
            if nb.tombstone_meta().get(id).is_some() {
                nb.tombstone_meta().delete(id)?;
            }
            let order = nb.order();
            if order.positions_of(id).is_empty() {
                let len = order.len();
                order.insert(index.unwrap_or(len).min(len), LoroValue::from(id))?;
            }
            Ok(())
        })?;
        debug!("event=restore module=tombstone status=ok cell={id}");
        Ok(true)
    }

    /// Retroactively stamps a trusted deletion time, e.g. once a server
    /// authority confirms the deletion. The only path by which a local
    /// tombstone becomes eligible for GC. Maintenance origin, not
    /// undoable.
    pub fn set_tombstone_timestamp(&self, id: &str, epoch_ms: i64, trusted: bool) -> CoreResult<()> {
        self.doc.transact(TxnOrigin::Maintenance, |nb| {
            let existing = codec::read_tombstone_meta(&nb.tombstone_meta(), id).unwrap_or_default();
            let meta = TombstoneMeta {
                deleted_at_ms: (epoch_ms >= EPOCH_FLOOR_MS).then_some(epoch_ms),
                reason: existing.reason,
                clock: ClockTrust::from_trusted_flag(trusted),
            };
            codec::write_tombstone_meta(&nb.tombstone_meta(), id, &meta)?;
            Ok(())
        })
    }

    /// The GC sweep. Purges every tombstoned cell whose deletion is
    /// trusted, older than `ttl_ms`, not future-skewed, and no longer
    /// referenced by the order sequence. One vacuum-origin transaction.
    pub fn vacuum_notebook(&self, ttl_ms: i64, opts: &VacuumOptions) -> CoreResult<VacuumReport> {
        let now = opts.now.unwrap_or_else(|| self.clock.now());
        let flagged: Vec<String> = self
            .doc
            .tombstones()
            .key_list()
            .into_iter()
            .filter(|id| self.doc.is_tombstoned(id))
            .collect();

        let mut report = VacuumReport {
            examined: flagged.len(),
            ..VacuumReport::default()
        };

        let mut purgeable: Vec<String> = Vec::new();
        for id in flagged {
            if self.gate_allows_purge(&id, ttl_ms, now, opts.max_future_skew_ms) {
                purgeable.push(id);
            } else {
                report.retained += 1;
            }
        }

        if !purgeable.is_empty() {
            self.doc.transact(TxnOrigin::Vacuum, |nb| {
                for id in &purgeable {
                    purge_cell_records(nb, id)?;
                }
                Ok(())
            })?;
        }
        report.removed = purgeable.len();
        info!(
            "event=vacuum_sweep module=tombstone status=ok examined={} removed={} retained={}",
            report.examined, report.removed, report.retained
        );
        Ok(report)
    }

    /// Resolves the deletion stamp for a soft delete. `None` means the
    /// reading fell below the epoch floor and must be omitted.
    fn resolve_stamp(&self, opts: &SoftDeleteOptions) -> Option<ClockReading> {
        let reading = match opts.deleted_at_ms {
            Some(epoch_ms) => ClockReading {
                epoch_ms,
                trusted: opts.trusted.unwrap_or(true),
            },
            None => {
                let mut reading = self.clock.now();
                if let Some(trusted) = opts.trusted {
                    reading.trusted = trusted;
                }
                reading
            }
        };
        reading.is_plausible().then_some(reading)
    }

    fn gate_allows_purge(
        &self,
        id: &str,
        ttl_ms: i64,
        now: ClockReading,
        max_future_skew_ms: i64,
    ) -> bool {
        let meta = codec::read_tombstone_meta(&self.doc.tombstone_meta(), id).unwrap_or_default();

        let Some(deleted_at) = meta.deleted_at_ms.filter(|ms| *ms >= EPOCH_FLOOR_MS) else {
            debug!("event=vacuum_skip module=tombstone cell={id} gate=no_deleted_at");
            return false;
        };
        if meta.clock != ClockTrust::Trusted {
            debug!("event=vacuum_skip module=tombstone cell={id} gate=untrusted_stamp");
            return false;
        }
        if !now.trusted {
            debug!("event=vacuum_skip module=tombstone cell={id} gate=untrusted_now");
            return false;
        }
        if deleted_at > now.epoch_ms + max_future_skew_ms {
            debug!("event=vacuum_skip module=tombstone cell={id} gate=future_skew");
            return false;
        }
        if now.epoch_ms - deleted_at < ttl_ms {
            debug!("event=vacuum_skip module=tombstone cell={id} gate=ttl");
            return false;
        }
        // Still ordered means "undeleted", even with stale bookkeeping.
        if self.doc.order_snapshot().iter().any(|entry| entry == id) {
            debug!("event=vacuum_skip module=tombstone cell={id} gate=still_ordered");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{SoftDeleteOptions, TombstoneService};
    use crate::clock::{FixedClock, EPOCH_FLOOR_MS};
    use crate::model::cell::{Cell, CellKind};
    use crate::model::notebook::ClockTrust;
    use crate::repo::{codec, NotebookDoc};
    use crate::service::mutation_service::MutationService;

    #[test]
    fn soft_delete_discards_pre_epoch_timestamps() {
        let nb = NotebookDoc::new();
        let clock = FixedClock::new(EPOCH_FLOOR_MS - 10, false);
        MutationService::new(&nb)
            .insert_cell(&Cell::new("c1", CellKind::Sql, "select 1"), None)
            .expect("insert should succeed");

        TombstoneService::new(&nb, &clock)
            .soft_delete_cell("c1", Some("cleanup"), &SoftDeleteOptions::default())
            .expect("soft delete should succeed");

        assert!(nb.is_tombstoned("c1"));
        let meta = codec::read_tombstone_meta(&nb.tombstone_meta(), "c1")
            .expect("meta should exist");
        assert_eq!(meta.deleted_at_ms, None);
        assert_eq!(meta.reason.as_deref(), Some("cleanup"));
    }

    #[test]
    fn explicit_timestamp_is_trusted_by_default() {
        let nb = NotebookDoc::new();
        let clock = FixedClock::new(EPOCH_FLOOR_MS + 1_000, false);
        MutationService::new(&nb)
            .insert_cell(&Cell::new("c1", CellKind::Sql, "select 1"), None)
            .expect("insert should succeed");

        TombstoneService::new(&nb, &clock)
            .soft_delete_cell(
                "c1",
                None,
                &SoftDeleteOptions {
                    deleted_at_ms: Some(EPOCH_FLOOR_MS + 500),
                    ..SoftDeleteOptions::default()
                },
            )
            .expect("soft delete should succeed");

        let meta = codec::read_tombstone_meta(&nb.tombstone_meta(), "c1")
            .expect("meta should exist");
        assert_eq!(meta.deleted_at_ms, Some(EPOCH_FLOOR_MS + 500));
        assert_eq!(meta.clock, ClockTrust::Trusted);
    }

    #[test]
    fn restore_requires_surviving_entity() {
        let nb = NotebookDoc::new();
        let clock = FixedClock::new(EPOCH_FLOOR_MS + 1_000, false);
        let tombstones = TombstoneService::new(&nb, &clock);
        assert!(!tombstones
            .restore_cell("ghost", None)
            .expect("restore of missing entity should no-op"));
    }
}
