//! Control arbitration settings.
//!
//! Deserialized from the `[control]` and `[session]` sections of the service
//! configuration:
//!
//! ```toml
//! [control]
//! disconnect_grace = "2m"
//! allow_remote = true
//! timeout_gives_control = false
//! inhouse_is_staff = true
//! in_house_users = ["opid29"]
//!
//! [[control.users]]
//! username = "mx1234"
//! role = "staff"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Role granted to a specific login id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    /// Login id
    pub username: String,
    /// Role name
    pub role: String,
}

/// Control manager settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// How long a disconnected user stays active before being dropped
    #[serde(with = "humantime_serde")]
    pub disconnect_grace: Duration,
    /// Accept logins from other hosts than the local one
    pub allow_remote: bool,
    /// Hand control to the longest-logged-in observer when the operator's
    /// disconnect grace expires
    pub timeout_gives_control: bool,
    /// Grant the `staff` role to in-house accounts
    pub inhouse_is_staff: bool,
    /// In-house login ids (proposal code + number, e.g. `opid29`)
    pub in_house_users: Vec<String>,
    /// Per-user roles
    pub users: Vec<UserRole>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            disconnect_grace: default_disconnect_grace(),
            allow_remote: false,
            timeout_gives_control: false,
            inhouse_is_staff: true,
            in_house_users: Vec::new(),
            users: Vec::new(),
        }
    }
}

fn default_disconnect_grace() -> Duration {
    Duration::from_secs(120)
}

impl ControlConfig {
    /// Validate settings after loading.
    pub fn validate(&self) -> Result<(), String> {
        if self.disconnect_grace.is_zero() {
            return Err("disconnect_grace must be greater than zero".to_string());
        }

        for user in &self.users {
            if user.username.trim().is_empty() || user.role.trim().is_empty() {
                return Err(format!(
                    "Invalid user role entry '{}' = '{}': username and role are required",
                    user.username, user.role
                ));
            }
        }

        if let Some(empty) = self.in_house_users.iter().find(|u| u.trim().is_empty()) {
            return Err(format!("Invalid in-house user id '{}'", empty));
        }

        Ok(())
    }
}

/// Facility identification shown on the login page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInfo {
    /// Synchrotron name
    pub synchrotron_name: String,
    /// Beamline name
    pub beamline_name: String,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            synchrotron_name: "Synchrotron".to_string(),
            beamline_name: "Beamline".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.disconnect_grace, Duration::from_secs(120));
        assert!(!config.allow_remote);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn humantime_grace() {
        let config: ControlConfig = toml::from_str(
            r#"
            disconnect_grace = "30s"
            allow_remote = true

            [[users]]
            username = "mx1234"
            role = "staff"
            "#,
        )
        .unwrap();
        assert_eq!(config.disconnect_grace, Duration::from_secs(30));
        assert!(config.allow_remote);
        assert_eq!(config.users[0].role, "staff");
    }

    #[test]
    fn zero_grace_is_invalid() {
        let config = ControlConfig {
            disconnect_grace: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
