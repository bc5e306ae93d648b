//! User lifecycle callbacks
//!
//! Hooks run inline on the manager task: while a hook is executing,
//! nothing else in the group instance makes progress. That is deliberate;
//! it keeps the ordering between hook outcome and worker start
//! unambiguous. Keep hooks fast.

use async_trait::async_trait;

use crate::error::Result;

/// Context for one received assignment
#[derive(Debug, Clone, Copy)]
pub struct AssignmentContext<'a> {
    /// Consumer group id
    pub group: &'a str,
    /// Assigned topic
    pub topic: &'a str,
    /// Assigned partition
    pub partition: i32,
    /// Generation the assignment was issued under
    pub generation_id: i32,
}

/// Callbacks fired on assignment and revocation.
///
/// An error from either callback is fatal to the manager: the user has
/// declared the group state uningestible, and proceeding would violate
/// the application's invariants.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Called once per assignment, before any worker for the new
    /// generation is started. Default: accept.
    async fn on_assignment(&self, assignment: AssignmentContext<'_>) -> Result<()> {
        let _ = assignment;
        Ok(())
    }

    /// Called once per revocation cycle, after workers have been stopped.
    /// Default: no-op.
    async fn on_revocation(&self) -> Result<()> {
        Ok(())
    }
}

/// Accepting, no-op lifecycle hooks
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl LifecycleHooks for DefaultHooks {}
