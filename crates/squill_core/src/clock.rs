//! Wall-clock abstraction with an explicit trust flag.
//!
//! # Responsibility
//! - Provide timestamps for tombstone stamping and GC decisions.
//! - Carry whether a reading is server-asserted or merely locally observed.
//!
//! # Invariants
//! - Destructive decisions (vacuum) require `trusted = true` readings.
//! - Readings below `EPOCH_FLOOR_MS` are treated as clock confusion and
//!   must be discarded by callers.

use std::time::{SystemTime, UNIX_EPOCH};

/// 2020-01-01T00:00:00Z. Anything earlier is a misconfigured clock.
pub const EPOCH_FLOOR_MS: i64 = 1_577_836_800_000;

/// Deletion stamps further than this in the future are rejected by GC.
pub const DEFAULT_MAX_FUTURE_SKEW_MS: i64 = 24 * 60 * 60 * 1000;

/// One timestamp observation plus its trust level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    /// Unix epoch milliseconds.
    pub epoch_ms: i64,
    /// `true` when the value is asserted by an authority (e.g. a server),
    /// `false` when it is only the local machine's opinion.
    pub trusted: bool,
}

impl ClockReading {
    /// Returns `true` when the reading is at or above the epoch floor.
    pub fn is_plausible(&self) -> bool {
        self.epoch_ms >= EPOCH_FLOOR_MS
    }
}

/// Source of timestamp readings.
pub trait ClockSource {
    fn now(&self) -> ClockReading;
}

/// Local wall clock. Never trusted: a skewed workstation clock must not be
/// able to trigger permanent data loss on its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> ClockReading {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        ClockReading {
            epoch_ms,
            trusted: false,
        }
    }
}

/// Clock whose readings are asserted by an external authority.
///
/// Wraps any inner source and marks its readings trusted. Used once a
/// server-confirmed time base is available.
pub struct TrustedClock<C: ClockSource> {
    inner: C,
}

impl<C: ClockSource> TrustedClock<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: ClockSource> ClockSource for TrustedClock<C> {
    fn now(&self) -> ClockReading {
        ClockReading {
            epoch_ms: self.inner.now().epoch_ms,
            trusted: true,
        }
    }
}

/// Fixed reading, for tests and replayed scenarios.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub reading: ClockReading,
}

impl FixedClock {
    pub fn new(epoch_ms: i64, trusted: bool) -> Self {
        Self {
            reading: ClockReading { epoch_ms, trusted },
        }
    }
}

impl ClockSource for FixedClock {
    fn now(&self) -> ClockReading {
        self.reading
    }
}
