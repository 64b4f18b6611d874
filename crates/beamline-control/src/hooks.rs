//! Session side effects owned by other components.
//!
//! When the operator signs out, state that belongs to the operator's session
//! (queue, sample view, sample list, LIMS session) must be reset. Those
//! components implement [`SessionHooks`]; the control manager calls the hooks
//! in order, outside its lock, and only logs their failures.

use async_trait::async_trait;

/// Collaborators reset when the operator signs out.
#[async_trait]
pub trait SessionHooks: Send + Sync {
    /// Persist the current queue for the session, then clear it.
    async fn save_and_clear_queue(&self, _session_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Remove every shape and centring point from the sample view.
    async fn clear_sample_view(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Reload the sample list from the LIMS.
    async fn init_sample_list(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Reset queue settings and forget the beamline session.
    async fn clear_session(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}
