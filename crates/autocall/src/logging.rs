//! Tracing subscriber setup

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;
use crate::error::{AutocallError, AutocallResult};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Maximum level emitted unless `RUST_LOG` says otherwise
    pub level: Level,
    /// Emit one JSON object per line
    pub json: bool,
    /// Include file and line information
    pub file_info: bool,
    /// Log span enter and exit
    pub log_spans: bool,
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "autocall".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Build from the `[logging]` configuration section
    pub fn from_settings(settings: &LoggingSettings) -> AutocallResult<Self> {
        Ok(LoggingConfig {
            level: parse_log_level(&settings.level)?,
            json: settings.json,
            file_info: settings.file_info,
            log_spans: settings.spans,
            ..Default::default()
        })
    }
}

/// Install the global subscriber
///
/// Fails when a global subscriber is already installed.
pub fn setup_logging(config: LoggingConfig) -> AutocallResult<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let mut subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_writer(std::io::stderr);

    if config.file_info {
        subscriber = subscriber.with_file(true).with_line_number(true);
    }

    let result = if config.json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    result.map_err(|e| AutocallError::logging(e.to_string()))
}

/// Parse a log level name such as `info` or `DEBUG`
pub fn parse_log_level(level: &str) -> AutocallResult<Level> {
    Level::from_str(level.trim())
        .map_err(|_| AutocallError::config(format!("Invalid log level: {}", level)))
}

/// Log a start-up line with version info
pub fn log_welcome(config: &LoggingConfig, version: &str) {
    tracing::info!(
        "Starting {} v{} (log level {}{})",
        config.app_name,
        version,
        config.level,
        if config.json { ", json" } else { "" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level(" WARN ").unwrap(), Level::WARN);
        assert!(parse_log_level("chatty").is_err());
    }

    #[test]
    fn test_from_settings() {
        let settings = LoggingSettings {
            level: "trace".to_string(),
            json: true,
            file_info: false,
            spans: true,
        };
        let config = LoggingConfig::from_settings(&settings).unwrap();
        assert_eq!(config.level, Level::TRACE);
        assert!(config.json);
        assert!(config.log_spans);
        assert!(!config.file_info);
        assert_eq!(config.app_name, "autocall");
    }

    #[test]
    #[traced_test]
    fn test_welcome_names_the_application() {
        let config = LoggingConfig::from_settings(&LoggingSettings::default()).unwrap();
        log_welcome(&config, "0.1.0");
        assert!(logs_contain("Starting autocall v0.1.0 (log level INFO)"));
    }
}
