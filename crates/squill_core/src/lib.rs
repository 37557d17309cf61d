//! Core notebook document model for Squill.
//! This crate is the single source of truth for notebook consistency
//! invariants on top of the CRDT substrate.

pub mod clock;
pub mod error;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod repo;
pub mod service;

pub use clock::{ClockReading, ClockSource, FixedClock, SystemClock, TrustedClock};
pub use error::{CoreError, CoreResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use migrate::{
    builtin_registry, migrate_notebook_schema, stamp_current_schema, MigrateOptions,
    MigrationRegistry, MigrationReport, CURRENT_SCHEMA_VERSION,
};
pub use model::cell::{Cell, CellKind, CellMetadata, CellValidationError};
pub use model::origin::TxnOrigin;
pub use model::output::{ApplyOutcome, ExecutionResult, OutputRecord};
pub use repo::NotebookDoc;
pub use service::execution_service::{ApplyResultOptions, ExecutionService};
pub use service::guard_service::{ChangeSignal, IdGuard, SourceChangeTracker};
pub use service::mutation_service::MutationService;
pub use service::reconcile_service::{ReconcileOptions, ReconcileReport, ReconcileService};
pub use service::tombstone_service::{
    SoftDeleteOptions, TombstoneService, VacuumOptions, VacuumReport,
};
pub use service::undo_service::UndoScope;
pub use service::validate_service::{validate_notebook, IssueSeverity, ValidationIssue};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
