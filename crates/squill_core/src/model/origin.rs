//! Transaction origin tags.
//!
//! # Responsibility
//! - Name the intent class of every transaction touching the document.
//!
//! # Invariants
//! - Undo scoping and GC loop prevention depend on these tags; matching is
//!   exhaustive so adding a variant forces every filter to take a position.

/// Intent class attached to every committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnOrigin {
    /// Direct user edit. The only origin visible to undo/redo.
    UserAction,
    /// Background repair: reconciliation, schema migration steps.
    Maintenance,
    /// Tombstone garbage collection sweep.
    Vacuum,
    /// Asynchronous execution state changes.
    Execution,
    /// Id-immutability enforcement reverts.
    IdGuard,
}

impl TxnOrigin {
    pub const ALL: [TxnOrigin; 5] = [
        Self::UserAction,
        Self::Maintenance,
        Self::Vacuum,
        Self::Execution,
        Self::IdGuard,
    ];

    /// Wire tag stamped onto commits. Tags are prefix-disjoint so origin
    /// prefix filters can never shadow each other.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserAction => "nb.user",
            Self::Maintenance => "nb.maintenance",
            Self::Vacuum => "nb.vacuum",
            Self::Execution => "nb.execution",
            Self::IdGuard => "nb.id-guard",
        }
    }

    /// Whether transactions with this origin enter user-facing undo history.
    pub fn tracked_in_undo(self) -> bool {
        match self {
            Self::UserAction => true,
            Self::Maintenance | Self::Vacuum | Self::Execution | Self::IdGuard => false,
        }
    }
}
