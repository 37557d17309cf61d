//! Replicated-document access layer.
//!
//! # Responsibility
//! - Expose the notebook's structural containers through idempotent,
//!   lazily-creating accessors.
//! - Convert between replicated values and domain types with tolerant,
//!   decode-with-warning semantics.
//!
//! # Invariants
//! - Accessors never fail on an uninitialized document.
//! - Readers degrade malformed shapes to documented defaults; they never
//!   panic or raise on bad remote data.

pub mod codec;
mod loro_ext;
pub mod notebook_doc;

pub use notebook_doc::NotebookDoc;
pub(crate) use loro_ext::{IdListExt, MapValueExt};
