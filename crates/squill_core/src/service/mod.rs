//! Core notebook services.
//!
//! # Responsibility
//! - Orchestrate container access into the operations the application
//!   layer calls: mutation, tombstone lifecycle, reconciliation,
//!   execution guarding, validation and undo scoping.
//!
//! # Invariants
//! - Every service mutation runs inside one origin-tagged transaction.
//! - Maintenance-class origins never enter user undo history.

pub mod execution_service;
pub mod guard_service;
pub mod mutation_service;
pub mod reconcile_service;
pub mod tombstone_service;
pub mod undo_service;
pub mod validate_service;
