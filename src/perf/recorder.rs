#![forbid(unsafe_code)]

// Interval Recorder - named point-in-time marks paired into duration samples

use crate::perf::aggregator::SampleLog;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// A resolved duration measurement. `start` is the offset of the start mark
/// from the recorder's epoch (run start); `duration` is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub start: Duration,
    pub duration: Duration,
}

impl Sample {
    pub fn start_ms(&self) -> f64 {
        self.start.as_secs_f64() * 1_000.0
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1_000.0
    }
}

/// Pairing bugs are logic errors and fail loudly rather than producing a
/// bogus duration.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("mark {0:?} is already pending unresolved")]
    MarkPending(String),
    #[error("mark {0:?} was never recorded or is already resolved")]
    MissingMark(String),
    #[error("end mark {end:?} precedes start mark {start:?}")]
    NegativeInterval { start: String, end: String },
}

/// Records named instants and derives duration samples from pairs of them.
///
/// Mark names must embed an operation-instance identifier (connection id,
/// debate id and question id, ...) so that thousands of concurrently
/// in-flight operations never collide. A resolved pair releases both names
/// for reuse.
pub struct IntervalRecorder {
    epoch: Instant,
    marks: Mutex<HashMap<String, Instant>>,
    log: Arc<SampleLog>,
}

impl IntervalRecorder {
    pub fn new(log: Arc<SampleLog>) -> Self {
        Self {
            epoch: Instant::now(),
            marks: Mutex::new(HashMap::new()),
            log,
        }
    }

    /// Records the current monotonic instant under `name`. Rejects a name
    /// that is still pending from an earlier, unresolved `mark`.
    pub fn mark(&self, name: &str) -> Result<(), RecorderError> {
        let now = Instant::now();
        let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        if marks.contains_key(name) {
            return Err(RecorderError::MarkPending(name.to_string()));
        }
        marks.insert(name.to_string(), now);
        Ok(())
    }

    /// Resolves the `start_mark`/`end_mark` pair into a sample filed under
    /// `measurement`, publishes it to the sample log, and releases both
    /// marks for reuse.
    pub fn measure(
        &self,
        measurement: &str,
        start_mark: &str,
        end_mark: &str,
    ) -> Result<Sample, RecorderError> {
        let sample = {
            let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
            let start = *marks
                .get(start_mark)
                .ok_or_else(|| RecorderError::MissingMark(start_mark.to_string()))?;
            let end = *marks
                .get(end_mark)
                .ok_or_else(|| RecorderError::MissingMark(end_mark.to_string()))?;
            let duration =
                end.checked_duration_since(start)
                    .ok_or_else(|| RecorderError::NegativeInterval {
                        start: start_mark.to_string(),
                        end: end_mark.to_string(),
                    })?;
            marks.remove(start_mark);
            marks.remove(end_mark);
            Sample {
                start: start.saturating_duration_since(self.epoch),
                duration,
            }
        };
        self.log.record(measurement, sample);
        Ok(sample)
    }

    /// Drops a pending mark. A failed operation must clear its start mark so
    /// a later reuse of the name does not collide.
    pub fn discard(&self, name: &str) {
        let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        marks.remove(name);
    }

    pub fn is_pending(&self, name: &str) -> bool {
        let marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        marks.contains_key(name)
    }

    /// Number of marks still awaiting their pair. Non-zero at run end means
    /// stalled pairings (acknowledgements that never arrived).
    pub fn pending_marks(&self) -> usize {
        let marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        marks.len()
    }

    /// Time since the recorder's epoch, used as the window cutoff for reports.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn recorder() -> (IntervalRecorder, Arc<SampleLog>) {
        let log = Arc::new(SampleLog::new());
        (IntervalRecorder::new(log.clone()), log)
    }

    #[test]
    fn measure_yields_mark_delta() {
        let (rec, log) = recorder();
        rec.mark("op start").unwrap();
        sleep(Duration::from_millis(5));
        rec.mark("op end").unwrap();
        let sample = rec.measure("op latency", "op start", "op end").unwrap();
        assert!(sample.duration >= Duration::from_millis(5));
        assert_eq!(log.count_since("op latency", Duration::ZERO), 1);
    }

    #[test]
    fn duplicate_pending_mark_is_rejected() {
        let (rec, _log) = recorder();
        rec.mark("connect 7").unwrap();
        assert!(matches!(
            rec.mark("connect 7"),
            Err(RecorderError::MarkPending(name)) if name == "connect 7"
        ));
    }

    #[test]
    fn measure_without_marks_is_rejected() {
        let (rec, _log) = recorder();
        rec.mark("a").unwrap();
        assert!(matches!(
            rec.measure("m", "a", "b"),
            Err(RecorderError::MissingMark(name)) if name == "b"
        ));
        // the partial failure must not have consumed the existing mark
        assert!(rec.is_pending("a"));
    }

    #[test]
    fn reversed_pair_is_rejected_and_marks_survive() {
        let (rec, log) = recorder();
        rec.mark("first").unwrap();
        sleep(Duration::from_millis(2));
        rec.mark("second").unwrap();
        assert!(matches!(
            rec.measure("m", "second", "first"),
            Err(RecorderError::NegativeInterval { .. })
        ));
        assert_eq!(log.count_since("m", Duration::ZERO), 0);
        assert!(rec.is_pending("first"));
        assert!(rec.is_pending("second"));
    }

    #[test]
    fn resolved_marks_are_released_for_reuse() {
        let (rec, _log) = recorder();
        rec.mark("s").unwrap();
        rec.mark("e").unwrap();
        rec.measure("m", "s", "e").unwrap();
        assert!(!rec.is_pending("s"));
        rec.mark("s").unwrap();
        rec.mark("e").unwrap();
        rec.measure("m", "s", "e").unwrap();
    }

    #[test]
    fn discard_releases_a_pending_mark() {
        let (rec, _log) = recorder();
        rec.mark("stale").unwrap();
        rec.discard("stale");
        assert_eq!(rec.pending_marks(), 0);
        rec.mark("stale").unwrap();
    }
}
