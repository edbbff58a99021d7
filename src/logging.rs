//! Console logging for webcapt.
//!
//! The library only talks to the `log` facade. Binaries call
//! [`init_logger`] once to install an `env_logger` backend whose level follows
//! the configured [`Verbosity`], unless `RUST_LOG` says otherwise.

use std::env;
use std::io::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use log::LevelFilter;

use crate::config::Verbosity;

/// Dependencies that are chatty at debug level.
const NOISY_DEPENDENCIES: &[&str] = &["chromiumoxide", "tungstenite", "tokio_tungstenite"];

/// Logging configuration shared by binaries and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    pub verbose: Verbosity,
    pub quiet_dependencies: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbose: Verbosity::Medium,
            quiet_dependencies: true,
        }
    }
}

impl LogConfig {
    pub fn new(verbose: Verbosity) -> Self {
        Self {
            verbose,
            ..Default::default()
        }
    }

    pub fn level_filter(&self) -> LevelFilter {
        match self.verbose {
            Verbosity::Minimal => LevelFilter::Error,
            Verbosity::Medium => LevelFilter::Info,
            Verbosity::Detailed => LevelFilter::Debug,
        }
    }

    /// Level applied to [`NOISY_DEPENDENCIES`].
    pub fn dependency_filter(&self) -> LevelFilter {
        if self.quiet_dependencies && self.verbose != Verbosity::Detailed {
            LevelFilter::Warn.min(self.level_filter())
        } else {
            self.level_filter()
        }
    }
}

/// Render one console line: `[timestamp] LEVEL [target] message`.
pub fn render_line(
    timestamp: DateTime<Utc>,
    level: log::Level,
    target: &str,
    message: &str,
) -> String {
    let timestamp = timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
    if target.is_empty() {
        format!("[{}] {:<5} {}", timestamp, level, message)
    } else {
        format!("[{}] {:<5} [{}] {}", timestamp, level, target, message)
    }
}

/// Install the global logger. Calling it twice is harmless.
pub fn init_logger(config: LogConfig) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.level_filter());
    for dependency in NOISY_DEPENDENCIES {
        builder.filter_module(dependency, config.dependency_filter());
    }

    if let Ok(filters) = env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    builder.format(|buf, record| {
        let message = record.args().to_string();
        writeln!(
            buf,
            "{}",
            render_line(Utc::now(), record.level(), record.target(), &message)
        )
    });

    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn verbosity_maps_to_level_filters() {
        assert_eq!(
            LogConfig::new(Verbosity::Minimal).level_filter(),
            LevelFilter::Error
        );
        assert_eq!(
            LogConfig::new(Verbosity::Medium).level_filter(),
            LevelFilter::Info
        );
        assert_eq!(
            LogConfig::new(Verbosity::Detailed).level_filter(),
            LevelFilter::Debug
        );
    }

    #[test]
    fn dependencies_stay_quiet_below_detailed() {
        assert_eq!(
            LogConfig::new(Verbosity::Medium).dependency_filter(),
            LevelFilter::Warn
        );
        assert_eq!(
            LogConfig::new(Verbosity::Minimal).dependency_filter(),
            LevelFilter::Error
        );
        assert_eq!(
            LogConfig::new(Verbosity::Detailed).dependency_filter(),
            LevelFilter::Debug
        );

        let loud = LogConfig {
            verbose: Verbosity::Medium,
            quiet_dependencies: false,
        };
        assert_eq!(loud.dependency_filter(), LevelFilter::Info);
    }

    #[test]
    fn lines_include_timestamp_level_and_target() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(
            render_line(ts, log::Level::Info, "webcapt::orchestrator", "fired"),
            "[2024-05-01T12:30:00Z] INFO  [webcapt::orchestrator] fired"
        );
        assert_eq!(
            render_line(ts, log::Level::Warn, "", "timeout"),
            "[2024-05-01T12:30:00Z] WARN  timeout"
        );
    }
}
