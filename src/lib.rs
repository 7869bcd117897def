#![forbid(unsafe_code)]

// debate-stress library - latency measurement and ramp-up orchestration
// for load testing a real-time debate/Q&A service

pub mod config;
pub mod payload;
pub mod perf;
pub mod ramp;
pub mod registry;
pub mod report;
pub mod transport;
