//! Service Configuration using Figment
//!
//! Configuration is layered:
//! 1. Built-in defaults (`ServiceConfig::default()`)
//! 2. `config/beamline.toml`, or the file given with `--config` (optional)
//! 3. Environment variables prefixed with `BEAMLINE_`; nested fields use
//!    double underscores
//!
//! - `BEAMLINE_APPLICATION__LOG_LEVEL=debug` → `application.log_level`
//! - `BEAMLINE_CONTROL__ALLOW_REMOTE=true` → `control.allow_remote`
//! - `BEAMLINE_CONTROL__DISCONNECT_GRACE=30s` → `control.disconnect_grace`
//!
//! # Example
//! ```no_run
//! use beamline_server::config::ServiceConfig;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ServiceConfig::load()?;
//! println!("Beamline: {}", config.session.beamline_name);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use beamline_control::{Account, ControlConfig, SessionInfo};
use beamline_hardware::drivers::mock::MockObjectConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/beamline.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BEAMLINE_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Top-level service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Facility names shown on the login page
    pub session: SessionInfo,
    /// Control arbitration settings
    pub control: ControlConfig,
    /// Hardware objects served by the built-in repository
    pub hardware: HardwareConfig,
    /// Accounts of the built-in identity provider
    pub accounts: Vec<Account>,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Beamline Control".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Hardware repository contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HardwareConfig {
    /// Object definitions, enumerated in order
    pub objects: Vec<MockObjectConfig>,
}

impl ServiceConfig {
    /// Load configuration from `config/beamline.toml` and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut figment = Figment::from(Serialized::defaults(ServiceConfig::default()));

        if path.exists() {
            figment = figment.merge(Toml::file(path));
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
        }

        let config: ServiceConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from '{}'", path.display()))?;

        config
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Configuration validation failed")?;

        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            ));
        }

        let format = self.application.log_format.to_lowercase();
        if !VALID_LOG_FORMATS.contains(&format.as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                VALID_LOG_FORMATS.join(", ")
            ));
        }

        self.control.validate()?;

        // Duplicate adapter ids are resolved at bootstrap; duplicate names are a typo.
        let mut names = HashSet::new();
        for object in &self.hardware.objects {
            if object.name.trim().is_empty() {
                return Err("Hardware object with empty name".to_string());
            }
            if !names.insert(object.name.as_str()) {
                return Err(format!("Duplicate hardware object name: {}", object.name));
            }
            if let Some((min, max)) = object.limits {
                if min > max {
                    return Err(format!(
                        "Invalid limits for {}: min {} is greater than max {}",
                        object.name, min, max
                    ));
                }
            }
        }

        let mut logins = HashSet::new();
        for account in &self.accounts {
            if !logins.insert(account.login_id.as_str()) {
                return Err(format!("Duplicate account: {}", account.login_id));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamline_hardware::drivers::mock::MockKind;
    use std::io::Write;
    use std::time::Duration;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
            [application]
            log_level = "debug"
            log_format = "json"

            [session]
            synchrotron_name = "ESRF"
            beamline_name = "ID29"

            [control]
            disconnect_grace = "30s"
            in_house_users = ["opid29"]

            [[hardware.objects]]
            name = "/phi"
            kind = "motor"
            value = 0.0
            limits = [-180.0, 180.0]
            commands = ["home"]

            [[hardware.objects]]
            name = "/safshut"
            username = "Safety Shutter"
            kind = "shutter"

            [[accounts]]
            login_id = "mx1234"
            password = "secret"
            "#,
        );

        let config = ServiceConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.name, "Beamline Control");
        assert_eq!(config.session.beamline_name, "ID29");
        assert_eq!(config.control.disconnect_grace, Duration::from_secs(30));
        assert_eq!(config.hardware.objects.len(), 2);
        assert_eq!(config.hardware.objects[0].kind, MockKind::Motor);
        assert_eq!(config.hardware.objects[0].limits, Some((-180.0, 180.0)));
        assert_eq!(config.accounts[0].login_id, "mx1234");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.application, ApplicationConfig::default());
        assert_eq!(config.control.disconnect_grace, Duration::from_secs(120));
        assert!(config.hardware.objects.is_empty());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = ServiceConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_object_names() {
        let file = write_config(
            r#"
            [[hardware.objects]]
            name = "/phi"
            kind = "motor"

            [[hardware.objects]]
            name = "/phi"
            kind = "actuator"
            "#,
        );
        let err = ServiceConfig::load_from(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Duplicate hardware object name: /phi"));
    }

    #[test]
    fn test_inverted_limits() {
        let mut config = ServiceConfig::default();
        config.hardware.objects.push(MockObjectConfig {
            name: "/kappa".to_string(),
            username: None,
            kind: MockKind::Motor,
            value: None,
            limits: Some((10.0, -10.0)),
            values: Vec::new(),
            commands: Vec::new(),
            status: None,
            read_only: false,
        });
        assert!(config.validate().is_err());
    }
}
