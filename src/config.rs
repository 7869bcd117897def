#![forbid(unsafe_code)]

// Harness configuration - compiled defaults overridable via environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Startup constants for one harness run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// WebSocket base URL of the debate server, e.g. `ws://localhost:8080`.
    pub server_url: String,
    /// Path prefix every logical channel is mounted under.
    pub socket_path: String,
    pub admin_username: String,
    pub admin_password: String,
    /// Number of debates created at run start.
    pub debate_count: usize,
    /// Inclusive range of new questions issued per debate per tick.
    pub min_questions: u64,
    pub max_questions: u64,
    /// Fixed number of clients added on every ramp tick.
    pub clients_per_tick: usize,
    pub tick_period: Duration,
    /// Total ramp ticks before the run drains.
    pub tick_count: u32,
    /// Bound on every emit-with-ack round trip.
    pub ack_timeout: Duration,
    /// Pause between a tick's batch completing and its report, so in-flight
    /// answer round trips can land inside the window.
    pub settle: Duration,
    /// Directory the per-measurement CSV files are written to at run end.
    pub export_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8080".to_string(),
            socket_path: "/socket".to_string(),
            admin_username: "admin".to_string(),
            admin_password: "pass".to_string(),
            debate_count: 5,
            min_questions: 2,
            max_questions: 2,
            clients_per_tick: 50,
            tick_period: Duration::from_secs(1),
            tick_count: 10,
            ack_timeout: Duration::from_secs(5),
            settle: Duration::from_millis(100),
            export_dir: PathBuf::from("."),
        }
    }
}

impl HarnessConfig {
    /// Builds a config from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            server_url: env_string("SERVER_URL", defaults.server_url),
            socket_path: env_string("SOCKET_PATH", defaults.socket_path),
            admin_username: env_string("ADMIN_USERNAME", defaults.admin_username),
            admin_password: env_string("ADMIN_PASSWORD", defaults.admin_password),
            debate_count: env_parse("DEBATE_COUNT", defaults.debate_count),
            min_questions: env_parse("MIN_QUESTIONS", defaults.min_questions),
            max_questions: env_parse("MAX_QUESTIONS", defaults.max_questions),
            clients_per_tick: env_parse("CLIENTS_PER_TICK", defaults.clients_per_tick),
            tick_period: Duration::from_millis(env_parse(
                "TICK_PERIOD_MS",
                defaults.tick_period.as_millis() as u64,
            )),
            tick_count: env_parse("TICK_COUNT", defaults.tick_count),
            ack_timeout: Duration::from_millis(env_parse(
                "ACK_TIMEOUT_MS",
                defaults.ack_timeout.as_millis() as u64,
            )),
            settle: Duration::from_millis(env_parse(
                "SETTLE_MS",
                defaults.settle.as_millis() as u64,
            )),
            export_dir: PathBuf::from(env_string(
                "EXPORT_DIR",
                defaults.export_dir.display().to_string(),
            )),
        };
        config.normalized()
    }

    /// Replaces unusable values with workable ones, warning about each.
    fn normalized(mut self) -> Self {
        if self.max_questions < self.min_questions {
            warn!(
                "MAX_QUESTIONS={} is below MIN_QUESTIONS={}, using MIN_QUESTIONS for both",
                self.max_questions, self.min_questions
            );
            self.max_questions = self.min_questions;
        }
        if self.debate_count == 0 {
            warn!("DEBATE_COUNT=0 would leave the harness with no targets, using 1");
            self.debate_count = 1;
        }
        if self.tick_period.is_zero() {
            let fallback = Self::default().tick_period;
            warn!(
                "TICK_PERIOD_MS=0 is not a usable cadence, using {}",
                fallback.as_millis()
            );
            self.tick_period = fallback;
        }
        self
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_run_constants() {
        let config = HarnessConfig::default();
        assert_eq!(config.debate_count, 5);
        assert_eq!(config.min_questions, 2);
        assert_eq!(config.max_questions, 2);
        assert_eq!(config.clients_per_tick, 50);
        assert_eq!(config.tick_count, 10);
        assert_eq!(config.tick_period, Duration::from_secs(1));
    }

    #[test]
    fn zero_tick_period_falls_back_to_default() {
        let config = HarnessConfig {
            tick_period: Duration::ZERO,
            ..HarnessConfig::default()
        }
        .normalized();
        assert_eq!(config.tick_period, Duration::from_secs(1));
    }

    #[test]
    fn unusable_counts_are_normalized() {
        let config = HarnessConfig {
            debate_count: 0,
            min_questions: 3,
            max_questions: 1,
            ..HarnessConfig::default()
        }
        .normalized();
        assert_eq!(config.debate_count, 1);
        assert_eq!(config.max_questions, 3);
    }
}
