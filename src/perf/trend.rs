#![forbid(unsafe_code)]

// Regression Comparator - per-measurement trend against the previous window

use std::collections::HashMap;

/// Classification of a window's mean against the previous window's.
///
/// A tie classifies as `Improved`: equal latency is not a regression, so the
/// comparison is non-strict and a separate "unchanged" state never occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    /// First observation for this measurement name.
    NoBaseline,
    Improved,
    Regressed,
}

/// Holds each measurement's previous mean for the lifetime of a run.
///
/// Explicit state rather than a process-wide singleton, so multiple runs (or
/// tests) can each carry their own comparison baseline.
#[derive(Debug, Default)]
pub struct TrendTracker {
    previous: HashMap<String, f64>,
}

impl TrendTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies `new_mean` against the stored previous mean for `name`,
    /// then unconditionally replaces the stored value.
    pub fn compare(&mut self, name: &str, new_mean: f64) -> Trend {
        let trend = match self.previous.get(name) {
            None => Trend::NoBaseline,
            Some(previous) if new_mean <= *previous => Trend::Improved,
            Some(_) => Trend::Regressed,
        };
        self.previous.insert(name.to_string(), new_mean);
        trend
    }
}
