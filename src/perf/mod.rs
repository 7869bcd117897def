#![forbid(unsafe_code)]

// Measurement engine - interval recording, sample aggregation, trend comparison

pub mod aggregator;
pub mod recorder;
pub mod trend;

pub use aggregator::SampleLog;
pub use recorder::{IntervalRecorder, RecorderError, Sample};
pub use trend::{Trend, TrendTracker};

/// Measurement catalog. Every latency sample the harness produces is filed
/// under one of these names; mark names stay unique per operation instance.
pub const MEASURE_CREATE_DEBATE: &str = "Time to create a debate";
pub const MEASURE_CONNECT_CLIENT: &str = "Time to connect a client";
pub const MEASURE_SEND_QUESTION: &str = "Time to send a question";
pub const MEASURE_ANSWER_QUESTION: &str = "Time to answer a question";
