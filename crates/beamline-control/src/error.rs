//! Control flow errors.
//!
//! Authentication failures are returned to the caller verbatim and leave the
//! user table untouched.

use thiserror::Error;

/// Errors returned by [`ControlManager`](crate::ControlManager) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// In-house account used from another host
    #[error("In-house only allowed from localhost")]
    InHouseRemote,

    /// Another proposal holds the beamline
    #[error("Another user is already logged in")]
    AnotherUserLoggedIn,

    /// Remote login while remote access is disabled
    #[error("Remote access disabled")]
    RemoteAccessDisabled,

    /// Credentials rejected, or remote login without an existing session
    #[error("Invalid login: {0}")]
    InvalidLogin(String),

    /// The identity provider failed; its message is passed through unchanged
    #[error("{0}")]
    Identity(String),

    /// No active user with this name
    #[error("Unknown user: {0}")]
    UnknownUser(String),
}

impl ControlError {
    /// Whether the error is an authentication failure.
    pub fn is_auth_failure(&self) -> bool {
        !matches!(self, ControlError::UnknownUser(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_messages_pass_through() {
        let err = ControlError::Identity("LIMS unreachable".into());
        assert_eq!(err.to_string(), "LIMS unreachable");
        assert!(err.is_auth_failure());
        assert!(!ControlError::UnknownUser("bob".into()).is_auth_failure());
    }
}
