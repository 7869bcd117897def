#![forbid(unsafe_code)]

// Sample Aggregator - grouped, arrival-ordered log of latency samples

use crate::perf::recorder::Sample;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct Inner {
    /// Measurement names in first-seen order.
    order: Vec<String>,
    samples: HashMap<String, Vec<Sample>>,
}

/// Full-run log of samples grouped by measurement name.
///
/// Nothing is evicted during a run: the final report aggregates with a
/// cutoff of zero, so the whole history has to stay addressable.
#[derive(Default)]
pub struct SampleLog {
    inner: Mutex<Inner>,
}

impl SampleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `sample` under `name` in arrival order, registering the name
    /// on first use.
    pub fn record(&self, name: &str, sample: Sample) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.samples.contains_key(name) {
            inner.order.push(name.to_string());
        }
        inner.samples.entry(name.to_string()).or_default().push(sample);
    }

    /// Sample count and arithmetic mean duration in milliseconds over
    /// samples whose start time is at or after `cutoff`, taken under one
    /// lock so the pair stays consistent while other tasks keep recording.
    /// `None` when no sample qualifies; callers must handle the no-data
    /// case rather than read a zero.
    pub fn stats_since(&self, name: &str, cutoff: Duration) -> Option<(usize, f64)> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let samples = inner.samples.get(name)?;
        let mut sum_ms = 0.0;
        let mut count = 0usize;
        for sample in samples.iter().filter(|s| s.start >= cutoff) {
            sum_ms += sample.duration_ms();
            count += 1;
        }
        if count == 0 {
            return None;
        }
        Some((count, sum_ms / count as f64))
    }

    pub fn mean_since(&self, name: &str, cutoff: Duration) -> Option<f64> {
        self.stats_since(name, cutoff).map(|(_, mean)| mean)
    }

    pub fn count_since(&self, name: &str, cutoff: Duration) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .samples
            .get(name)
            .map(|samples| samples.iter().filter(|s| s.start >= cutoff).count())
            .unwrap_or(0)
    }

    /// Every measurement name seen so far, in first-seen order.
    pub fn measurement_names(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.order.clone()
    }

    /// Full arrival-ordered history for one measurement.
    pub fn samples(&self, name: &str) -> Vec<Sample> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.samples.get(name).cloned().unwrap_or_default()
    }

    pub fn total_samples(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.samples.values().map(Vec::len).sum()
    }
}
