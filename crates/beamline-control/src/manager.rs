//! Operator/Observer Control Arbitration
//!
//! The [`ControlManager`] owns the user table and enforces the exclusive
//! writer model: among active authenticated users at most one holds control
//! at any instant, everyone else observes.
//!
//! # State Machine (per user)
//!
//! ```text
//! anonymous ──login──▶ observer ◀──set_operator──▶ operator
//!                          │                          │
//!                          └──────signout / expiry────┘──▶ inactive
//! ```
//!
//! # Locking
//!
//! All user table mutations, including the `observersChanged` broadcast that
//! reports them, happen inside one `parking_lot::Mutex` critical section.
//! The lock is never held across an `.await`: identity provider and session
//! hook calls run before or after it. Because the broadcast is emitted while
//! the lock is held, events leave in the same order as the mutations and
//! every event shows a consistent table (never two operators).
//!
//! # Disconnects
//!
//! A transport disconnect starts a detached grace timer. Each user carries a
//! generation counter that is bumped by every login, disconnect and
//! reconnect; a timer only acts if the generation it captured is still
//! current, so a stale timer never touches a reconnected or re-logged user.
//! A newer disconnect also aborts the pending timer.

use crate::config::{ControlConfig, SessionInfo};
use crate::error::ControlError;
use crate::hooks::{NoopHooks, SessionHooks};
use crate::identity::{IdentityProvider, LimsLogin, LoginRequest, LoginType};
use crate::user::{LoginInfo, ObserversChanged, User, UserSnapshot, STAFF_ROLE};
use beamline_core::{ChangeBroadcaster, Channel};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

// =============================================================================
// User Table
// =============================================================================

#[derive(Default)]
struct UserTable {
    users: HashMap<String, User>,
    timers: HashMap<String, AbortHandle>,
}

impl UserTable {
    fn operator(&self) -> Option<&User> {
        self.users.values().find(|u| u.is_operator())
    }

    fn observers(&self) -> Vec<&User> {
        let mut observers: Vec<&User> = self.users.values().filter(|u| u.is_observer()).collect();
        observers.sort_by(|a, b| {
            a.login_time
                .cmp(&b.login_time)
                .then_with(|| a.username.cmp(&b.username))
        });
        observers
    }

    fn payload(&self, message: &str) -> ObserversChanged {
        ObserversChanged {
            observers: self.observers().into_iter().map(User::snapshot).collect(),
            message: message.to_string(),
            operator: self.operator().map(User::snapshot),
        }
    }

    /// Give control to `username` and take it from everyone else.
    fn hand_control_to(&mut self, username: &str) {
        for user in self.users.values_mut() {
            user.in_control = user.username == username;
        }
    }

    fn cancel_timer(&mut self, username: &str) {
        if let Some(timer) = self.timers.remove(username) {
            timer.abort();
        }
    }

    fn active_login_ids(&self) -> BTreeSet<String> {
        self.users
            .values()
            .filter(|u| u.is_active && u.is_authenticated)
            .map(|u| u.login_id.clone())
            .collect()
    }
}

// =============================================================================
// Control Manager
// =============================================================================

struct Inner {
    config: ControlConfig,
    session: SessionInfo,
    identity: Arc<dyn IdentityProvider>,
    hooks: Arc<dyn SessionHooks>,
    broadcaster: ChangeBroadcaster,
    table: Mutex<UserTable>,
}

/// Session and control arbitration.
///
/// Cheap to clone; all clones share the same user table.
#[derive(Clone)]
pub struct ControlManager {
    inner: Arc<Inner>,
}

/// Builder for [`ControlManager`].
pub struct ControlManagerBuilder {
    config: ControlConfig,
    session: SessionInfo,
    identity: Arc<dyn IdentityProvider>,
    hooks: Arc<dyn SessionHooks>,
    broadcaster: ChangeBroadcaster,
}

impl ControlManagerBuilder {
    /// Set the session hooks run on operator signout.
    pub fn with_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Set the facility names reported by `login_info`.
    pub fn with_session_info(mut self, session: SessionInfo) -> Self {
        self.session = session;
        self
    }

    /// Set the broadcaster used for `observersChanged`.
    pub fn with_broadcaster(mut self, broadcaster: ChangeBroadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    /// Build the manager.
    pub fn build(self) -> ControlManager {
        ControlManager {
            inner: Arc::new(Inner {
                config: self.config,
                session: self.session,
                identity: self.identity,
                hooks: self.hooks,
                broadcaster: self.broadcaster,
                table: Mutex::new(UserTable::default()),
            }),
        }
    }
}

impl ControlManager {
    /// Start building a manager.
    pub fn builder(
        config: ControlConfig,
        identity: Arc<dyn IdentityProvider>,
    ) -> ControlManagerBuilder {
        ControlManagerBuilder {
            config,
            session: SessionInfo::default(),
            identity,
            hooks: Arc::new(NoopHooks),
            broadcaster: ChangeBroadcaster::new(),
        }
    }

    /// Broadcaster carrying `observersChanged`.
    pub fn broadcaster(&self) -> &ChangeBroadcaster {
        &self.inner.broadcaster
    }

    /// Active configuration.
    pub fn config(&self) -> &ControlConfig {
        &self.inner.config
    }

    fn emit(&self, table: &UserTable, message: &str) {
        self.inner
            .broadcaster
            .broadcast(Channel::ObserversChanged, &table.payload(message));
    }

    fn configured_roles(&self, login_id: &str) -> BTreeSet<String> {
        let mut roles = BTreeSet::new();
        if self.inner.config.inhouse_is_staff && self.is_inhouse_user(login_id) {
            roles.insert(STAFF_ROLE.to_string());
        }
        if let Some(entry) = self.inner.config.users.iter().find(|u| u.username == login_id) {
            roles.insert(entry.role.clone());
        }
        roles
    }

    fn operator_nickname(&self, user: &User) -> String {
        match self.inner.identity.login_type() {
            LoginType::User => user.login_id.clone(),
            LoginType::Proposal => self.inner.identity.proposal_for(&user.login_id),
        }
    }

    /// Login policy checks that depend only on the request and the table.
    fn check_policy(
        &self,
        table: &UserTable,
        request: &LoginRequest,
        inhouse: bool,
    ) -> Result<(), ControlError> {
        if inhouse && !request.is_local {
            return Err(ControlError::InHouseRemote);
        }

        if !inhouse {
            let others: Vec<String> = table
                .active_login_ids()
                .into_iter()
                .filter(|id| !self.is_inhouse_user(id))
                .collect();
            if !others.is_empty() && !others.contains(&request.login_id) {
                return Err(ControlError::AnotherUserLoggedIn);
            }
        }

        if !self.inner.config.allow_remote && !request.is_local {
            return Err(ControlError::RemoteAccessDisabled);
        }

        Ok(())
    }

    async fn select_operator_proposal(&self, operator: Option<UserSnapshot>) {
        if self.inner.identity.login_type() != LoginType::Proposal {
            return;
        }
        if let Some(operator) = operator {
            let proposal = self.inner.identity.proposal_for(&operator.login_id);
            if let Err(e) = self.inner.identity.select_proposal(&proposal).await {
                warn!(proposal = %proposal, error = %e, "Failed to select operator proposal");
            }
        }
    }

    // =========================================================================
    // Login / Signout
    // =========================================================================

    /// Authenticate and register a user.
    ///
    /// The first user to log in while nobody holds control becomes the
    /// operator; everyone else observes. On any failure the user table is
    /// left untouched.
    ///
    /// # Errors
    /// Policy violations, invalid credentials and identity provider failures.
    #[instrument(skip_all, fields(login_id = %request.login_id))]
    pub async fn login(&self, request: LoginRequest) -> Result<UserSnapshot, ControlError> {
        let identity = &self.inner.identity;
        let mut lims = identity
            .login(&request.login_id, &request.password)
            .await
            .map_err(|e| ControlError::Identity(e.to_string()))?;
        let inhouse = self.is_inhouse_user(&request.login_id);

        {
            let table = self.inner.table.lock();
            self.check_policy(&table, &request, inhouse)?;
        }

        lims = self.validate_lims(&request, inhouse, lims).await?;

        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let username = User::identity_key(&request.login_id, &session_id);
        let roles = self.configured_roles(&request.login_id);

        let (snapshot, operator) = {
            let mut table = self.inner.table.lock();
            // The table may have changed while the identity provider was consulted.
            self.check_policy(&table, &request, inhouse)?;
            table.cancel_timer(&username);

            let user = table
                .users
                .entry(username.clone())
                .or_insert_with(|| User::new(&request.login_id, &session_id, LimsLogin::default(), BTreeSet::new()));
            user.lims = lims;
            user.roles.extend(roles);
            user.is_authenticated = true;
            user.is_active = true;
            user.disconnect_timestamp = None;
            user.generation += 1;
            // New observers get the chance to pick a nickname.
            if !user.in_control {
                user.nickname = String::new();
            }

            if table.operator().is_none() {
                let nickname = match table.users.get(&username) {
                    Some(user) => self.operator_nickname(user),
                    None => String::new(),
                };
                table.hand_control_to(&username);
                if let Some(user) = table.users.get_mut(&username) {
                    user.nickname = nickname;
                }
            }

            self.emit(&table, "");
            let snapshot = table.users.get(&username).map(User::snapshot);
            (snapshot, table.operator().map(User::snapshot))
        };

        self.select_operator_proposal(operator).await;

        let snapshot = snapshot.ok_or_else(|| ControlError::UnknownUser(username.clone()))?;
        info!(username = %snapshot.username, in_control = snapshot.in_control, "User signed in");
        Ok(snapshot)
    }

    async fn validate_lims(
        &self,
        request: &LoginRequest,
        inhouse: bool,
        lims: LimsLogin,
    ) -> Result<LimsLogin, ControlError> {
        let details = format!(
            "valid={} local={} existing_session={} inhouse={}",
            lims.valid, request.is_local, lims.existing_session, inhouse
        );

        if lims.valid && request.is_local {
            info!(%details, "Valid login from local host");
            if lims.existing_session {
                Ok(lims)
            } else {
                self.inner
                    .identity
                    .create_session(lims)
                    .await
                    .map_err(|e| ControlError::Identity(e.to_string()))
            }
        } else if lims.valid && lims.existing_session {
            info!(%details, "Valid remote login with existing session");
            Ok(lims)
        } else {
            info!(%details, "Invalid login");
            Err(ControlError::InvalidLogin(details))
        }
    }

    /// Sign a user out.
    ///
    /// If the user is the operator, the operator's session state is reset
    /// through the session hooks and control is released. Nobody is promoted
    /// automatically.
    ///
    /// # Errors
    /// [`ControlError::UnknownUser`] if no such user exists.
    #[instrument(skip(self))]
    pub async fn signout(&self, username: &str) -> Result<(), ControlError> {
        let (login_id, session_id, was_operator) = {
            let table = self.inner.table.lock();
            let user = table
                .users
                .get(username)
                .filter(|u| u.is_authenticated)
                .ok_or_else(|| ControlError::UnknownUser(username.to_string()))?;
            (user.login_id.clone(), user.session_id.clone(), user.is_operator())
        };

        if let Err(e) = self.inner.identity.signout(&login_id).await {
            warn!(error = %e, "Identity provider signout failed");
        }

        if was_operator {
            self.reset_operator_session(&session_id).await;
        }

        let gained_control = {
            let mut table = self.inner.table.lock();
            table.cancel_timer(username);
            let Some(user) = table.users.get_mut(username) else {
                return Err(ControlError::UnknownUser(username.to_string()));
            };
            let in_control = user.in_control;
            if in_control {
                user.in_control = false;
                info!("Operator signed out");
            }
            user.is_active = false;
            user.is_authenticated = false;
            user.disconnect_timestamp = None;
            user.generation += 1;
            self.emit(&table, "");
            in_control && !was_operator
        };

        // Control was handed over while the signout was in flight.
        if gained_control {
            self.reset_operator_session(&session_id).await;
        }
        Ok(())
    }

    async fn reset_operator_session(&self, session_id: &str) {
        let hooks = &self.inner.hooks;
        let steps: [(&str, anyhow::Result<()>); 4] = [
            ("save_and_clear_queue", hooks.save_and_clear_queue(session_id).await),
            ("clear_sample_view", hooks.clear_sample_view().await),
            ("init_sample_list", hooks.init_sample_list().await),
            ("clear_session", hooks.clear_session().await),
        ];
        for (step, result) in steps {
            if let Err(e) = result {
                warn!(step, error = %e, "Operator session reset step failed");
            }
        }
    }

    // =========================================================================
    // Control Transfer
    // =========================================================================

    /// Give control to `username`.
    ///
    /// Clears control on every other user and sets it on the target in one
    /// critical section, then emits exactly one `observersChanged`.
    ///
    /// # Errors
    /// [`ControlError::UnknownUser`] (without any change) if the target is not
    /// an active authenticated user.
    #[instrument(skip(self))]
    pub async fn set_operator(&self, username: &str) -> Result<UserSnapshot, ControlError> {
        let (snapshot, operator) = {
            let mut table = self.inner.table.lock();
            let known = table
                .users
                .get(username)
                .is_some_and(|u| u.is_active && u.is_authenticated);
            if !known {
                return Err(ControlError::UnknownUser(username.to_string()));
            }

            table.hand_control_to(username);
            self.emit(&table, "");
            let snapshot = table
                .users
                .get(username)
                .map(User::snapshot)
                .ok_or_else(|| ControlError::UnknownUser(username.to_string()))?;
            (snapshot.clone(), Some(snapshot))
        };

        info!("Control transferred");
        self.select_operator_proposal(operator).await;
        Ok(snapshot)
    }

    /// Change a user's display name.
    ///
    /// # Errors
    /// [`ControlError::UnknownUser`] if no such user exists.
    pub fn set_nickname(&self, username: &str, nickname: &str) -> Result<UserSnapshot, ControlError> {
        let mut table = self.inner.table.lock();
        let user = table
            .users
            .get_mut(username)
            .ok_or_else(|| ControlError::UnknownUser(username.to_string()))?;
        user.nickname = nickname.to_string();
        let snapshot = user.snapshot();
        self.emit(&table, "");
        Ok(snapshot)
    }

    // =========================================================================
    // Disconnect Handling
    // =========================================================================

    /// Transport disconnect: start the grace timer.
    ///
    /// Must be called from within a Tokio runtime. A pending timer for the
    /// same user is replaced.
    ///
    /// # Errors
    /// [`ControlError::UnknownUser`] if no such user exists.
    pub async fn disconnect(&self, username: &str) -> Result<(), ControlError> {
        let mut table = self.inner.table.lock();
        let Some(user) = table.users.get_mut(username) else {
            return Err(ControlError::UnknownUser(username.to_string()));
        };
        user.disconnect_timestamp = Some(Utc::now());
        user.generation += 1;
        let generation = user.generation;

        table.cancel_timer(username);
        let grace = self.inner.config.disconnect_grace;
        let weak = Arc::downgrade(&self.inner);
        let name = username.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            expire(weak, name, generation).await;
        });
        table.timers.insert(username.to_string(), task.abort_handle());
        debug!(username, ?grace, "Disconnect grace timer started");
        Ok(())
    }

    /// Transport reconnect: neutralise any pending grace timer.
    ///
    /// # Errors
    /// [`ControlError::UnknownUser`] if no such user exists.
    pub fn reconnect(&self, username: &str) -> Result<UserSnapshot, ControlError> {
        let mut table = self.inner.table.lock();
        table.cancel_timer(username);
        let Some(user) = table.users.get_mut(username) else {
            return Err(ControlError::UnknownUser(username.to_string()));
        };
        user.disconnect_timestamp = None;
        user.generation += 1;
        let reactivated = user.is_authenticated && !user.is_active;
        if reactivated {
            user.is_active = true;
        }
        let snapshot = user.snapshot();
        if reactivated {
            self.emit(&table, "");
        }
        Ok(snapshot)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current operator.
    pub fn operator(&self) -> Option<UserSnapshot> {
        self.inner.table.lock().operator().map(User::snapshot)
    }

    /// Active users without control, oldest login first.
    pub fn observers(&self) -> Vec<UserSnapshot> {
        self.inner
            .table
            .lock()
            .observers()
            .into_iter()
            .map(User::snapshot)
            .collect()
    }

    /// Look up a user, active or not.
    pub fn user(&self, username: &str) -> Option<UserSnapshot> {
        self.inner.table.lock().users.get(username).map(User::snapshot)
    }

    /// Whether `username` is active and in control.
    pub fn is_operator(&self, username: &str) -> bool {
        self.inner
            .table
            .lock()
            .users
            .get(username)
            .is_some_and(User::is_operator)
    }

    /// Whether `username` is active (connected or within its grace period).
    pub fn is_active(&self, username: &str) -> bool {
        self.inner
            .table
            .lock()
            .users
            .get(username)
            .is_some_and(|u| u.is_active)
    }

    /// Login ids of active users, optionally without in-house accounts.
    pub fn logged_in_users(&self, exclude_inhouse: bool) -> Vec<String> {
        let ids = self.inner.table.lock().active_login_ids();
        ids.into_iter()
            .filter(|id| !(exclude_inhouse && self.is_inhouse_user(id)))
            .collect()
    }

    /// Whether `login_id` is an in-house account.
    pub fn is_inhouse_user(&self, login_id: &str) -> bool {
        self.inner.config.in_house_users.iter().any(|u| u == login_id)
    }

    /// Login page information for `username` (anonymous when `None`).
    pub fn login_info(&self, username: Option<&str>) -> LoginInfo {
        let session = &self.inner.session;
        let identity = &self.inner.identity;
        let mut info = LoginInfo::anonymous(
            &session.synchrotron_name,
            &session.beamline_name,
            identity.login_type(),
        );

        let table = self.inner.table.lock();
        let Some(user) = username
            .and_then(|name| table.users.get(name))
            .filter(|u| u.is_authenticated && u.is_active)
        else {
            return info;
        };

        info.logged_in = true;
        info.proposal_list = user.lims.proposals.clone();
        info.selected_proposal = match identity.login_type() {
            LoginType::Proposal => Some(identity.proposal_for(&user.login_id)),
            LoginType::User => None,
        };
        info.user = Some(user.snapshot());
        info
    }
}

/// Grace timer expiry for `username`.
async fn expire(inner: Weak<Inner>, username: String, generation: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let manager = ControlManager { inner };

    let promoted = {
        let mut table = manager.inner.table.lock();
        let current = table
            .users
            .get(&username)
            .is_some_and(|u| u.generation == generation && u.disconnect_timestamp.is_some());
        if !current {
            debug!(username = %username, "Stale disconnect timer ignored");
            return;
        }
        table.timers.remove(&username);

        let mut was_operator = false;
        if let Some(user) = table.users.get_mut(&username) {
            was_operator = user.in_control;
            user.is_active = false;
            user.in_control = false;
        }
        info!(username = %username, "Client disconnected");

        let mut promoted = None;
        if was_operator && manager.inner.config.timeout_gives_control {
            let next = table.observers().first().map(|u| u.username.clone());
            if let Some(next) = next {
                table.hand_control_to(&next);
                info!(username = %next, "Control passed on after operator timeout");
                promoted = table.users.get(&next).map(User::snapshot);
            }
        }

        manager.emit(&table, "");
        promoted
    };

    if promoted.is_some() {
        manager.select_operator_proposal(promoted).await;
    }
}
