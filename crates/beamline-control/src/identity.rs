//! Identity provider (LIMS) collaborator.
//!
//! The control manager never checks passwords itself. It asks the
//! [`IdentityProvider`] whether a login is valid, whether the proposal has an
//! open session, and which proposal is active.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How users identify themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoginType {
    /// Login with a proposal code and number
    #[default]
    Proposal,
    /// Login with a personal account
    User,
}

impl LoginType {
    /// Title-case label shown to clients.
    pub fn title(&self) -> &'static str {
        match self {
            LoginType::Proposal => "Proposal",
            LoginType::User => "User",
        }
    }
}

/// One proposal the login has access to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    /// Proposal code (e.g. `mx`)
    pub code: String,
    /// Proposal number
    pub number: String,
    /// LIMS proposal id
    pub proposal_id: String,
    /// Proposal title
    pub title: String,
    /// Principal investigator family name
    pub person: String,
}

impl Proposal {
    /// `code` + `number`, the form used as login id.
    pub fn name(&self) -> String {
        format!("{}{}", self.code, self.number)
    }
}

/// Outcome of a LIMS login check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LimsLogin {
    /// Login id the result belongs to
    #[serde(default)]
    pub login_id: String,
    /// Credentials accepted
    pub valid: bool,
    /// A LIMS session already exists for today
    pub existing_session: bool,
    /// Proposals available to the login
    #[serde(default)]
    pub proposals: Vec<Proposal>,
    /// Free-form LIMS status message
    #[serde(default)]
    pub status: String,
}

/// A login attempt as received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Login id (proposal or account name)
    pub login_id: String,
    /// Password
    pub password: String,
    /// Transport session id; a fresh one is minted when absent
    pub session_id: Option<String>,
    /// Whether the client connects from the local host
    pub is_local: bool,
}

impl LoginRequest {
    /// Local login without a transport session.
    pub fn local(login_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login_id: login_id.into(),
            password: password.into(),
            session_id: None,
            is_local: true,
        }
    }

    /// Use a specific transport session id.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Mark the request as coming from another host.
    pub fn remote(mut self) -> Self {
        self.is_local = false;
        self
    }
}

/// External identity and LIMS collaborator.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// How users log in.
    fn login_type(&self) -> LoginType;

    /// Check credentials. An `Err` is a provider failure, not a rejection.
    async fn login(&self, login_id: &str, password: &str) -> anyhow::Result<LimsLogin>;

    /// Open a LIMS session for a valid login that has none.
    async fn create_session(&self, login: LimsLogin) -> anyhow::Result<LimsLogin>;

    /// Proposal a login works under.
    fn proposal_for(&self, login_id: &str) -> String;

    /// Make `proposal` the active one for data collection.
    async fn select_proposal(&self, proposal: &str) -> anyhow::Result<()>;

    /// Notify the provider that a login signed out.
    async fn signout(&self, _login_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
