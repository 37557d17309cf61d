//! Conversion between replicated container values and domain types.
//!
//! # Responsibility
//! - Write cells, tombstone metadata and output records into their
//!   containers.
//! - Read them back tolerantly: malformed remote shapes degrade to
//!   documented defaults with a warning, never an error.

use crate::error::{CoreError, CoreResult};
use crate::model::cell::{Cell, CellKind, CellMetadata};
use crate::model::keys;
use crate::model::notebook::{ClockTrust, TombstoneMeta};
use crate::model::output::{ExecutionResult, OutputRecord};
use crate::repo::MapValueExt;
use log::warn;
use loro::{LoroMap, LoroText, LoroValue};

/// Writes a full cell record under `cells[cell.id]`.
///
/// The source text lives in a collaborative text container so concurrent
/// edits merge character-wise instead of last-writer-wins.
pub fn write_cell(cells: &LoroMap, cell: &Cell) -> CoreResult<LoroMap> {
    let entry = cells.get_or_create_container(&cell.id, LoroMap::new())?;
    entry.insert(keys::CELL_ID, LoroValue::from(cell.id.as_str()))?;
    entry.insert(keys::CELL_KIND, LoroValue::from(cell.kind.as_str()))?;
    update_source_text(&entry, &cell.source)?;

    let metadata = entry.get_or_create_container(keys::CELL_METADATA, LoroMap::new())?;
    metadata.insert(
        keys::CELL_BACKGROUND_DDL,
        LoroValue::from(cell.metadata.background_ddl),
    )?;

    if let Some(fingerprint) = &cell.fingerprint {
        entry.insert(keys::CELL_FINGERPRINT, LoroValue::from(fingerprint.as_str()))?;
    }
    if let Some(executed_by) = &cell.executed_by {
        entry.insert(keys::CELL_EXECUTED_BY, LoroValue::from(executed_by.as_str()))?;
    }
    Ok(entry)
}

/// Diff-updates the cell's collaborative source text.
pub fn update_source_text(cell_entry: &LoroMap, source: &str) -> CoreResult<()> {
    let text = cell_entry.get_or_create_container(keys::CELL_SOURCE, LoroText::new())?;
    text.update(source, Default::default())
        .map_err(|e| CoreError::TextUpdate(format!("{e:?}")))?;
    Ok(())
}

/// Returns the cell's entry map, if the cell exists and has a valid shape.
pub fn cell_entry(cells: &LoroMap, id: &str) -> Option<LoroMap> {
    cells.get_child_map(id)
}

/// Reads one cell tolerantly. `key` is the cell-map key the entry sits
/// under; a missing or foreign `id` field degrades to the key itself.
pub fn read_cell(key: &str, entry: &LoroMap) -> Cell {
    let id = entry.get_str_field(keys::CELL_ID).unwrap_or_else(|| {
        warn!("event=cell_decode module=repo status=degraded key={key} field=id fallback=key");
        key.to_string()
    });

    let kind_tag = entry.get_str_field(keys::CELL_KIND).unwrap_or_default();
    let kind = CellKind::parse(&kind_tag).unwrap_or_else(|| {
        warn!(
            "event=cell_decode module=repo status=degraded key={key} field=kind value={kind_tag} fallback=markdown"
        );
        CellKind::Markdown
    });

    let metadata = entry
        .get_child_map(keys::CELL_METADATA)
        .map(|meta| CellMetadata {
            background_ddl: meta.get_bool_field(keys::CELL_BACKGROUND_DDL).unwrap_or(false),
        })
        .unwrap_or_default();

    Cell {
        id,
        kind,
        source: entry.get_text_field(keys::CELL_SOURCE).unwrap_or_default(),
        metadata,
        fingerprint: entry.get_str_field(keys::CELL_FINGERPRINT),
        executed_by: entry.get_str_field(keys::CELL_EXECUTED_BY),
    }
}

/// Reads a cell by id, or `None` when the id is absent or not a map.
pub fn read_cell_by_id(cells: &LoroMap, id: &str) -> Option<Cell> {
    cell_entry(cells, id).map(|entry| read_cell(id, &entry))
}

/// Writes tombstone metadata under `tombstone_meta[id]`.
pub fn write_tombstone_meta(
    tombstone_meta: &LoroMap,
    id: &str,
    meta: &TombstoneMeta,
) -> CoreResult<()> {
    let entry = tombstone_meta.get_or_create_container(id, LoroMap::new())?;
    match meta.deleted_at_ms {
        Some(deleted_at) => entry.insert(keys::META_DELETED_AT, LoroValue::from(deleted_at))?,
        None => {
            if entry.get(keys::META_DELETED_AT).is_some() {
                entry.delete(keys::META_DELETED_AT)?;
            }
        }
    }
    if let Some(reason) = &meta.reason {
        entry.insert(keys::META_REASON, LoroValue::from(reason.as_str()))?;
    }
    entry.insert(keys::META_CLOCK, LoroValue::from(meta.clock.as_str()))?;
    Ok(())
}

/// Reads tombstone metadata tolerantly. Unknown clock tags degrade to
/// `Local`, which keeps GC from acting on them.
pub fn read_tombstone_meta(tombstone_meta: &LoroMap, id: &str) -> Option<TombstoneMeta> {
    let entry = tombstone_meta.get_child_map(id)?;
    let clock_tag = entry.get_str_field(keys::META_CLOCK).unwrap_or_default();
    Some(TombstoneMeta {
        deleted_at_ms: entry.get_i64_field(keys::META_DELETED_AT),
        reason: entry.get_str_field(keys::META_REASON),
        clock: ClockTrust::parse_lenient(&clock_tag),
    })
}

/// Returns the output entry map for a cell, if one exists.
pub fn output_entry(outputs: &LoroMap, id: &str) -> Option<LoroMap> {
    outputs.get_child_map(id)
}

/// Reads one output record tolerantly.
pub fn read_output(id: &str, entry: &LoroMap) -> OutputRecord {
    let result = entry.get_str_field(keys::OUTPUT_RESULT).and_then(|raw| {
        match serde_json::from_str::<ExecutionResult>(&raw) {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(
                    "event=output_decode module=repo status=degraded cell={id} field=result error={err}"
                );
                None
            }
        }
    });

    OutputRecord {
        running: entry.get_bool_field(keys::OUTPUT_RUNNING).unwrap_or(false),
        stale: entry.get_bool_field(keys::OUTPUT_STALE).unwrap_or(false),
        started_at_ms: entry.get_i64_field(keys::OUTPUT_STARTED_AT),
        completed_at_ms: entry.get_i64_field(keys::OUTPUT_COMPLETED_AT),
        run_id: entry.get_str_field(keys::OUTPUT_RUN_ID),
        result,
    }
}

/// Serializes and stores a result payload on an output entry.
pub fn write_result(entry: &LoroMap, result: &ExecutionResult) -> CoreResult<()> {
    let encoded = serde_json::to_string(result)?;
    entry.insert(keys::OUTPUT_RESULT, LoroValue::from(encoded.as_str()))?;
    Ok(())
}
