//! `beamline-control`
//!
//! Operator/observer arbitration. Every authenticated client is a [`User`];
//! among the active ones at most one is in control (the operator), the
//! others observe. The [`ControlManager`] runs login, signout, control
//! transfer and transport disconnects, and reports every change of the
//! observer set on the `observersChanged` channel.
//!
//! - [`identity`]: the external LIMS collaborator ([`IdentityProvider`])
//! - [`hooks`]: session state reset when the operator leaves
//! - [`memory`]: configuration-backed identity provider
//!
//! ## Example
//!
//! ```rust,ignore
//! let identity = Arc::new(InMemoryIdentity::new([Account::new("mx1234", "secret")]));
//! let manager = ControlManager::builder(ControlConfig::default(), identity).build();
//!
//! let alice = manager.login(LoginRequest::local("mx1234", "secret")).await?;
//! assert!(alice.in_control);
//! ```

pub mod config;
pub mod error;
pub mod hooks;
pub mod identity;
pub mod manager;
pub mod memory;
pub mod user;

pub use config::{ControlConfig, SessionInfo, UserRole};
pub use error::ControlError;
pub use hooks::{NoopHooks, SessionHooks};
pub use identity::{IdentityProvider, LimsLogin, LoginRequest, LoginType, Proposal};
pub use manager::{ControlManager, ControlManagerBuilder};
pub use memory::{Account, InMemoryIdentity};
pub use user::{LoginInfo, ObserversChanged, User, UserSnapshot, STAFF_ROLE};
