//! Users and their client-facing snapshots.

use crate::identity::{LimsLogin, LoginType, Proposal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role granting staff privileges.
pub const STAFF_ROLE: &str = "staff";

/// One logged-in client session.
///
/// Keyed by `"{login_id}-{session_id}"`, so the same login from two
/// transport sessions is two users.
#[derive(Debug, Clone)]
pub struct User {
    /// Identity key
    pub username: String,
    /// Login id (proposal or account)
    pub login_id: String,
    /// Transport session id
    pub session_id: String,
    /// Display name chosen by the user
    pub nickname: String,
    /// Holds the operator role
    pub in_control: bool,
    /// Passed authentication
    pub is_authenticated: bool,
    /// Connected, or disconnected within the grace period
    pub is_active: bool,
    /// When the transport disconnected, if it did
    pub disconnect_timestamp: Option<DateTime<Utc>>,
    /// Granted roles
    pub roles: BTreeSet<String>,
    /// Last LIMS login result
    pub lims: LimsLogin,
    /// First login of this identity key
    pub login_time: DateTime<Utc>,
    /// Bumped on every disconnect/reconnect/login so stale timers can be detected
    pub(crate) generation: u64,
}

impl User {
    /// Identity key for a login id and transport session.
    pub fn identity_key(login_id: &str, session_id: &str) -> String {
        format!("{}-{}", login_id, session_id)
    }

    pub(crate) fn new(
        login_id: &str,
        session_id: &str,
        lims: LimsLogin,
        roles: BTreeSet<String>,
    ) -> Self {
        Self {
            username: Self::identity_key(login_id, session_id),
            login_id: login_id.to_string(),
            session_id: session_id.to_string(),
            nickname: login_id.to_string(),
            in_control: false,
            is_authenticated: true,
            is_active: true,
            disconnect_timestamp: None,
            roles,
            lims,
            login_time: Utc::now(),
            generation: 0,
        }
    }

    /// Active, authenticated and not in control.
    pub fn is_observer(&self) -> bool {
        self.is_active && self.is_authenticated && !self.in_control
    }

    /// Active, authenticated and in control.
    pub fn is_operator(&self) -> bool {
        self.is_active && self.is_authenticated && self.in_control
    }

    /// Has the staff role.
    pub fn is_staff(&self) -> bool {
        self.roles.contains(STAFF_ROLE)
    }

    /// Client-facing view.
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            username: self.username.clone(),
            nickname: self.nickname.clone(),
            in_control: self.in_control,
            is_staff: self.is_staff(),
            session_id: self.session_id.clone(),
            login_id: self.login_id.clone(),
        }
    }
}

/// User as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    /// Identity key
    pub username: String,
    /// Display name
    pub nickname: String,
    /// Holds the operator role
    pub in_control: bool,
    /// Has the staff role
    #[serde(rename = "isstaff")]
    pub is_staff: bool,
    /// Transport session id
    pub session_id: String,
    /// Login id
    pub login_id: String,
}

/// Payload of the `observersChanged` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserversChanged {
    /// Active users without control, oldest login first
    pub observers: Vec<UserSnapshot>,
    /// Free-form message for the clients
    pub message: String,
    /// Current operator, if any
    pub operator: Option<UserSnapshot>,
}

/// Login page information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInfo {
    /// Synchrotron name
    pub synchrotron_name: String,
    /// Beamline name
    pub beamline_name: String,
    /// Whether the requesting user is logged in
    pub logged_in: bool,
    /// `Proposal` or `User`
    pub login_type: String,
    /// Proposals available to the user
    pub proposal_list: Vec<Proposal>,
    /// Proposal currently selected for the user
    pub selected_proposal: Option<String>,
    /// The requesting user
    pub user: Option<UserSnapshot>,
}

impl LoginInfo {
    pub(crate) fn anonymous(
        synchrotron_name: &str,
        beamline_name: &str,
        login_type: LoginType,
    ) -> Self {
        Self {
            synchrotron_name: synchrotron_name.to_string(),
            beamline_name: beamline_name.to_string(),
            logged_in: false,
            login_type: login_type.title().to_string(),
            proposal_list: Vec::new(),
            selected_proposal: None,
            user: None,
        }
    }
}
