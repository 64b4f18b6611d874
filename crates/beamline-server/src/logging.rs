//! Structured logging.
//!
//! One `tracing-subscriber` fmt layer in the configured [`OutputFormat`],
//! filtered by `RUST_LOG` when it is set and by the configured level
//! otherwise. Installing the subscriber twice is a no-op.
//!
//! ```no_run
//! use beamline_server::{config::ServiceConfig, logging::{self, LogSettings}};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ServiceConfig::load()?;
//! let settings = LogSettings::from_service_config(&config)
//!     .and_then(|s| s.with_overrides(Some("debug"), None))
//!     .map_err(anyhow::Error::msg)?;
//! logging::init(&settings).map_err(anyhow::Error::msg)?;
//! # Ok(())
//! # }
//! ```

use crate::config::ServiceConfig;
use clap::ValueEnum;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Multi-line, coloured
    Pretty,
    /// One line per event
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
            .map_err(|_| format!("Invalid log format '{s}' (pretty, compact, json)"))
    }
}

/// Level and layout of the service log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub format: OutputFormat,
}

impl LogSettings {
    /// Settings from the `[application]` section.
    pub fn from_service_config(config: &ServiceConfig) -> Result<Self, String> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            format: config.application.log_format.parse()?,
        })
    }

    /// Apply command-line overrides on top of the configured settings.
    pub fn with_overrides(
        mut self,
        level: Option<&str>,
        format: Option<OutputFormat>,
    ) -> Result<Self, String> {
        if let Some(level) = level {
            self.level = parse_log_level(level)?;
        }
        if let Some(format) = format {
            self.format = format;
        }
        Ok(self)
    }
}

/// Install the global subscriber.
///
/// Returns `Ok(())` without touching anything if a subscriber is already set.
pub fn init(settings: &LogSettings) -> Result<(), String> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_str().to_lowercase()));

    let base = fmt::layer().with_file(true).with_line_number(true);
    let layer = match settings.format {
        OutputFormat::Pretty => base.pretty().boxed(),
        OutputFormat::Compact => base.compact().with_ansi(false).boxed(),
        OutputFormat::Json => base.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {e}"))
}

/// Parse a level name, case-insensitively.
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    level
        .parse()
        .map_err(|_| format!("Invalid log level '{level}' (trace, debug, info, warn, error)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_log_level("trace"), Ok(Level::TRACE));
        assert_eq!(parse_log_level("INFO"), Ok(Level::INFO));
        assert_eq!(parse_log_level("Debug"), Ok(Level::DEBUG));
        assert!(parse_log_level("loud").is_err());
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn settings_follow_the_application_section() {
        let mut config = ServiceConfig::default();
        config.application.log_level = "warn".to_string();
        config.application.log_format = "json".to_string();

        let settings = LogSettings::from_service_config(&config).unwrap();
        assert_eq!(settings.level, Level::WARN);
        assert_eq!(settings.format, OutputFormat::Json);
    }

    #[test]
    fn command_line_overrides_win() {
        let mut config = ServiceConfig::default();
        config.application.log_level = "warn".to_string();
        config.application.log_format = "json".to_string();
        let settings = LogSettings::from_service_config(&config).unwrap();

        let overridden = settings
            .with_overrides(Some("trace"), Some(OutputFormat::Compact))
            .unwrap();
        assert_eq!(overridden.level, Level::TRACE);
        assert_eq!(overridden.format, OutputFormat::Compact);

        assert_eq!(settings.with_overrides(None, None), Ok(settings));
        assert!(settings.with_overrides(Some("loud"), None).is_err());
    }

    #[test]
    fn init_twice_is_ok() {
        let settings = LogSettings {
            level: Level::DEBUG,
            format: OutputFormat::Compact,
        };
        assert!(init(&settings).is_ok());
        assert!(init(&settings).is_ok());
    }
}
