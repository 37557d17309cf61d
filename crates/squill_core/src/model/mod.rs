//! Notebook domain model shared by all core services.
//!
//! # Responsibility
//! - Define the canonical cell/output/tombstone data shapes.
//! - Fix the stable container and field keys used inside the replicated
//!   document.
//!
//! # Invariants
//! - Every cell is identified by a stable string id that never changes
//!   after first observation.
//! - Deletion is represented by tombstone flags plus timestamp metadata,
//!   not by immediate hard delete.

pub mod cell;
pub mod keys;
pub mod notebook;
pub mod origin;
pub mod output;
