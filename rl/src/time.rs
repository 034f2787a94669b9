//! Logical federation time

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Errors constructing logical time
#[derive(Debug, Error)]
pub enum TimeError {
    #[error("Logical time must be finite, got {0}")]
    NotFinite(f64),
}

/// A point on the federation time axis
///
/// Wraps a finite f64 with a total order so times can live in ordered
/// collections and be compared without `partial_cmp` escape hatches.
/// Construction rejects NaN and infinities; arithmetic that would leave the
/// finite range saturates instead of poisoning the clock.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalTime(f64);

impl LogicalTime {
    /// The federation epoch
    pub const ZERO: LogicalTime = LogicalTime(0.0);

    /// Construct from seconds, rejecting non-finite input
    pub fn new(secs: f64) -> Result<Self, TimeError> {
        if !secs.is_finite() {
            return Err(TimeError::NotFinite(secs));
        }
        Ok(Self(secs))
    }

    /// Seconds since the federation epoch
    pub fn as_secs_f64(&self) -> f64 {
        self.0
    }

    /// This time moved forward by `delta` seconds, saturating at the largest
    /// finite time
    ///
    /// Lookaheads and steps are validated non-negative upstream, so the
    /// result never moves backwards.
    pub fn offset_by(&self, delta: f64) -> Self {
        let sum = self.0 + delta;
        if sum.is_finite() { Self(sum) } else { Self(f64::MAX) }
    }

    /// The earlier of two times
    pub fn min(self, other: Self) -> Self {
        if self <= other { self } else { other }
    }

    /// The later of two times
    pub fn max(self, other: Self) -> Self {
        if self >= other { self } else { other }
    }
}

impl PartialEq for LogicalTime {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for LogicalTime {}

impl PartialOrd for LogicalTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogicalTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
