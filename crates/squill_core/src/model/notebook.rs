//! Notebook root fields and tombstone metadata shapes.

use std::fmt::{Display, Formatter};

/// Notebook-level descriptive fields (not the structural containers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotebookInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    /// Connected database, when the notebook is bound to one.
    pub database_id: Option<String>,
}

/// Trust level recorded with a tombstone timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockTrust {
    /// Asserted by an authority; eligible for destructive GC.
    Trusted,
    /// Locally observed only; GC must not act on it.
    Local,
}

impl ClockTrust {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trusted => "trusted",
            Self::Local => "local",
        }
    }

    /// Parses a stored trust tag. Unknown tags degrade to `Local`, erring
    /// toward retention over destructive action.
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "trusted" => Self::Trusted,
            _ => Self::Local,
        }
    }

    pub fn from_trusted_flag(trusted: bool) -> Self {
        if trusted {
            Self::Trusted
        } else {
            Self::Local
        }
    }
}

impl Display for ClockTrust {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Soft-deletion bookkeeping for one tombstoned cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TombstoneMeta {
    /// When the deletion happened. Absent when the stamping clock was below
    /// the epoch floor and the value was discarded.
    pub deleted_at_ms: Option<i64>,
    pub reason: Option<String>,
    pub clock: ClockTrust,
}

impl Default for TombstoneMeta {
    fn default() -> Self {
        Self {
            deleted_at_ms: None,
            reason: None,
            clock: ClockTrust::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ClockTrust;

    #[test]
    fn unknown_clock_tags_degrade_to_local() {
        assert_eq!(ClockTrust::parse_lenient("trusted"), ClockTrust::Trusted);
        assert_eq!(ClockTrust::parse_lenient("local"), ClockTrust::Local);
        assert_eq!(ClockTrust::parse_lenient("ntp?!"), ClockTrust::Local);
    }
}
