#![forbid(unsafe_code)]

// Reporting - console window summaries and per-measurement CSV export

use crate::perf::{SampleLog, Trend, TrendTracker};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One measurement's line in a window report.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub name: String,
    pub count: usize,
    pub mean_ms: f64,
    pub trend: Trend,
}

/// Aggregated view of one measurement window.
#[derive(Debug, Clone)]
pub struct WindowReport {
    /// Start of the window, as an offset from the run epoch. Zero for the
    /// full-history report.
    pub cutoff: Duration,
    pub entries: Vec<ReportEntry>,
    /// Mean of the per-measurement means; `None` when the window is empty.
    pub overall_mean_ms: Option<f64>,
}

impl WindowReport {
    pub fn print(&self) {
        for entry in &self.entries {
            let marker = match entry.trend {
                Trend::NoBaseline => "·",
                Trend::Improved => "▼",
                Trend::Regressed => "▲ REGRESSED",
            };
            println!(
                "Average {} ({}): {:.3} ms {}",
                entry.name, entry.count, entry.mean_ms, marker
            );
        }
        match self.overall_mean_ms {
            Some(mean) => println!("Average total time: {mean:.3} ms\n"),
            None => println!("No samples in this window\n"),
        }
    }

    pub fn entry(&self, name: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Builds window reports and carries the previous-window baseline across
/// them for the lifetime of a run.
#[derive(Default)]
pub struct Reporter {
    tracker: TrendTracker,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregates every measurement with at least one sample whose start
    /// time is at or after `cutoff`, trending each against the previous
    /// report. Measurements with no qualifying samples are omitted.
    pub fn window_report(&mut self, log: &SampleLog, cutoff: Duration) -> WindowReport {
        let mut entries = Vec::new();
        for name in log.measurement_names() {
            // count and mean come from one locked pass so a concurrently
            // recorded sample cannot desynchronize them
            let Some((count, mean_ms)) = log.stats_since(&name, cutoff) else {
                continue;
            };
            let trend = self.tracker.compare(&name, mean_ms);
            entries.push(ReportEntry {
                name,
                count,
                mean_ms,
                trend,
            });
        }
        let overall_mean_ms = if entries.is_empty() {
            None
        } else {
            Some(entries.iter().map(|e| e.mean_ms).sum::<f64>() / entries.len() as f64)
        };
        WindowReport {
            cutoff,
            entries,
            overall_mean_ms,
        }
    }
}

/// Writes the full sample history to disk, one CSV file per measurement
/// name (`start_ms,duration_ms` per line, no header). Returns the written
/// paths. Re-exporting the same finished log is byte-identical.
pub fn export_csv(log: &SampleLog, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for name in log.measurement_names() {
        let path = dir.join(format!("{}.csv", slug(&name)));
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        for sample in log.samples(&name) {
            writer.write_record(&[
                sample.start_ms().to_string(),
                sample.duration_ms().to_string(),
            ])?;
        }
        writer.flush()?;
        written.push(path);
    }
    Ok(written)
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}
