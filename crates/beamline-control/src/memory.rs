//! In-memory identity provider.
//!
//! Backs demo deployments (accounts come from the configuration file) and
//! tests. Each account is a proposal whose login id is `code` + `number`.

use crate::identity::{IdentityProvider, LimsLogin, LoginType, Proposal};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One configured account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Login id (e.g. `mx1234`)
    pub login_id: String,
    /// Password
    pub password: String,
    /// Proposal title
    #[serde(default)]
    pub title: String,
    /// Whether a LIMS session already exists
    #[serde(default)]
    pub existing_session: bool,
}

impl Account {
    /// Account without title and without an open session.
    pub fn new(login_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login_id: login_id.into(),
            password: password.into(),
            title: String::new(),
            existing_session: false,
        }
    }

    /// Mark the account as having an open LIMS session.
    pub fn with_session(mut self) -> Self {
        self.existing_session = true;
        self
    }

    fn proposal(&self) -> Proposal {
        let split = self
            .login_id
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(self.login_id.len());
        let (code, number) = self.login_id.split_at(split);
        Proposal {
            code: code.to_string(),
            number: number.to_string(),
            proposal_id: self.login_id.clone(),
            title: self.title.clone(),
            person: String::new(),
        }
    }
}

/// Identity provider over a fixed account table.
pub struct InMemoryIdentity {
    login_type: LoginType,
    accounts: HashMap<String, Account>,
    sessions: Mutex<HashSet<String>>,
    selected: Mutex<Option<String>>,
    unreachable: Mutex<Option<String>>,
}

impl InMemoryIdentity {
    /// Provider serving `accounts` with proposal-type logins.
    pub fn new(accounts: impl IntoIterator<Item = Account>) -> Self {
        let accounts: HashMap<String, Account> = accounts
            .into_iter()
            .map(|a| (a.login_id.clone(), a))
            .collect();
        let sessions = accounts
            .values()
            .filter(|a| a.existing_session)
            .map(|a| a.login_id.clone())
            .collect();
        Self {
            login_type: LoginType::Proposal,
            accounts,
            sessions: Mutex::new(sessions),
            selected: Mutex::new(None),
            unreachable: Mutex::new(None),
        }
    }

    /// Switch the login type.
    pub fn with_login_type(mut self, login_type: LoginType) -> Self {
        self.login_type = login_type;
        self
    }

    /// Make every login fail with `reason`, or recover with `None`.
    pub fn set_unreachable(&self, reason: Option<&str>) {
        *self.unreachable.lock() = reason.map(str::to_string);
    }

    /// Proposal last selected for data collection.
    pub fn selected_proposal(&self) -> Option<String> {
        self.selected.lock().clone()
    }

    /// Whether a LIMS session exists for `login_id`.
    pub fn has_session(&self, login_id: &str) -> bool {
        self.sessions.lock().contains(login_id)
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentity {
    fn login_type(&self) -> LoginType {
        self.login_type
    }

    async fn login(&self, login_id: &str, password: &str) -> anyhow::Result<LimsLogin> {
        if let Some(reason) = self.unreachable.lock().clone() {
            anyhow::bail!(reason);
        }

        let Some(account) = self.accounts.get(login_id) else {
            return Ok(LimsLogin {
                login_id: login_id.to_string(),
                status: "Unknown login".to_string(),
                ..Default::default()
            });
        };

        if account.password != password {
            return Ok(LimsLogin {
                login_id: login_id.to_string(),
                status: "Wrong password".to_string(),
                ..Default::default()
            });
        }

        Ok(LimsLogin {
            login_id: login_id.to_string(),
            valid: true,
            existing_session: self.has_session(login_id),
            proposals: vec![account.proposal()],
            status: "ok".to_string(),
        })
    }

    async fn create_session(&self, mut login: LimsLogin) -> anyhow::Result<LimsLogin> {
        self.sessions.lock().insert(login.login_id.clone());
        login.existing_session = true;
        Ok(login)
    }

    fn proposal_for(&self, login_id: &str) -> String {
        login_id.to_string()
    }

    async fn select_proposal(&self, proposal: &str) -> anyhow::Result<()> {
        *self.selected.lock() = Some(proposal.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_outcomes() {
        let lims = InMemoryIdentity::new([Account::new("mx1234", "secret")]);

        let ok = lims.login("mx1234", "secret").await.unwrap();
        assert!(ok.valid);
        assert!(!ok.existing_session);
        assert_eq!(ok.proposals[0].code, "mx");
        assert_eq!(ok.proposals[0].number, "1234");

        assert!(!lims.login("mx1234", "wrong").await.unwrap().valid);
        assert!(!lims.login("nobody", "secret").await.unwrap().valid);

        let created = lims.create_session(ok).await.unwrap();
        assert!(created.existing_session);
        assert!(lims.has_session("mx1234"));
    }

    #[tokio::test]
    async fn unreachable_provider_errors() {
        let lims = InMemoryIdentity::new([Account::new("mx1234", "secret")]);
        lims.set_unreachable(Some("LIMS down"));
        let err = lims.login("mx1234", "secret").await.unwrap_err();
        assert_eq!(err.to_string(), "LIMS down");
    }
}
