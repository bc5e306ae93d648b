//! Consumer-group membership, worker lifecycle, and acknowledgement routing
//!
//! The [`GroupConsumer`] ties the pieces together: a serialized manager
//! task owning the worker fleet, a shared assignment registry read by the
//! ack paths, and the external seams (coordinator client, worker
//! supervisor, optional direct acknowledger) supplied as trait objects on
//! the [`GroupConsumerBuilder`].

mod ack;
mod assignment;
mod coordinator;
mod hooks;
mod manager;
mod registry;
mod supervisor;
mod worker_table;

pub use ack::AckRouter;
pub use assignment::Assignment;
pub use coordinator::{CoordinatorClient, DirectAcknowledger};
pub use hooks::{AssignmentContext, DefaultHooks, LifecycleHooks};
pub use manager::{GroupManagerHandle, GroupStatus, WorkerStatus};
pub use registry::{AssignmentRegistry, GroupAssignment};
pub use supervisor::{SpawnedWorker, WorkerId, WorkerSpec, WorkerSupervisor};
pub use worker_table::MonitorToken;

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::config::GroupConfig;
use crate::error::{ConsumerError, Result};
use crate::handler::{ConsumerMessage, MessageHandlerFactory};

/// Builder for a [`GroupConsumer`].
///
/// Plain-data settings come from [`GroupConfig`]; the handler factory,
/// lifecycle hooks, and collaborator handles are set here.
pub struct GroupConsumerBuilder {
    config: GroupConfig,
    handler: Option<Arc<dyn MessageHandlerFactory>>,
    handler_init_args: Value,
    hooks: Arc<dyn LifecycleHooks>,
    supervisor: Option<Arc<dyn WorkerSupervisor>>,
    coordinator: Option<Arc<dyn CoordinatorClient>>,
    direct: Option<Arc<dyn DirectAcknowledger>>,
}

impl GroupConsumerBuilder {
    /// Start building a consumer from its configuration
    pub fn new(config: GroupConfig) -> Self {
        Self {
            config,
            handler: None,
            handler_init_args: Value::Null,
            hooks: Arc::new(DefaultHooks),
            supervisor: None,
            coordinator: None,
            direct: None,
        }
    }

    /// Set the message-handler factory passed through to workers (required)
    pub fn handler(mut self, handler: Arc<dyn MessageHandlerFactory>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set the init arguments handed to the handler factory (default: none)
    pub fn handler_init_args(mut self, args: Value) -> Self {
        self.handler_init_args = args;
        self
    }

    /// Set the lifecycle hooks (default: accept assignments, no-op revoke)
    pub fn hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Set the worker supervisor (required)
    pub fn supervisor(mut self, supervisor: Arc<dyn WorkerSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Set the group coordinator client's ack surface (required)
    pub fn coordinator(mut self, coordinator: Arc<dyn CoordinatorClient>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Set the direct acknowledger (required iff `direct_ack` is enabled)
    pub fn direct_acknowledger(mut self, direct: Arc<dyn DirectAcknowledger>) -> Self {
        self.direct = Some(direct);
        self
    }

    /// Validate the configuration and spawn the manager task.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(self) -> Result<GroupConsumer> {
        self.config.validate()?;

        let handler = self
            .handler
            .ok_or_else(|| ConsumerError::Config("a message handler is required".to_string()))?;
        let supervisor = self
            .supervisor
            .ok_or_else(|| ConsumerError::Config("a worker supervisor is required".to_string()))?;
        let coordinator = self
            .coordinator
            .ok_or_else(|| ConsumerError::Config("a coordinator client is required".to_string()))?;

        if self.config.direct_ack && self.direct.is_none() {
            return Err(ConsumerError::Config(
                "direct_ack requires a direct acknowledger".to_string(),
            ));
        }

        let name = self.config.name.clone();
        let registry = Arc::new(AssignmentRegistry::new(self.config.direct_ack));

        let (handle, task) = manager::spawn(
            self.config,
            handler,
            self.handler_init_args,
            self.hooks,
            supervisor,
            coordinator,
            Arc::clone(&registry),
        );

        let router = AckRouter::new(name, registry, handle.clone(), self.direct);

        Ok(GroupConsumer {
            handle,
            router,
            task,
        })
    }
}

/// A running consumer-group instance.
///
/// Hand [`handle`](Self::handle) clones to the coordinator client for
/// assignment callbacks, and [`ack_router`](Self::ack_router) clones to
/// whatever processes messages.
pub struct GroupConsumer {
    handle: GroupManagerHandle,
    router: AckRouter,
    task: JoinHandle<Result<()>>,
}

impl std::fmt::Debug for GroupConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupConsumer").finish_non_exhaustive()
    }
}

impl GroupConsumer {
    /// Start building a consumer
    pub fn builder(config: GroupConfig) -> GroupConsumerBuilder {
        GroupConsumerBuilder::new(config)
    }

    /// Handle for the coordinator client's callbacks into the manager
    pub fn handle(&self) -> &GroupManagerHandle {
        &self.handle
    }

    /// Cloneable ack router for the application's acknowledgement path
    pub fn ack_router(&self) -> AckRouter {
        self.router.clone()
    }

    /// Acknowledge an offset; see [`AckRouter::ack`]
    pub async fn ack(&self, topic: &str, partition: i32, generation_id: i32, offset: i64) {
        self.router.ack(topic, partition, generation_id, offset).await;
    }

    /// Acknowledge a message; see [`AckRouter::ack_message`]
    pub async fn ack_message(&self, message: &ConsumerMessage) {
        self.router.ack_message(message).await;
    }

    /// Committed offsets known locally for `topic`: always empty, the
    /// coordinator owns them
    pub fn get_committed_offsets(&self, topic: &str) -> Vec<(i32, i64)> {
        self.handle.get_committed_offsets(topic)
    }

    /// Snapshot the manager's current state
    pub async fn status(&self) -> Result<GroupStatus> {
        self.handle.status().await
    }

    /// Stop all workers and terminate the manager task cleanly
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }

    /// Wait for the manager task to exit and return its exit reason.
    ///
    /// `Ok(())` after a clean shutdown; otherwise the fatal error the
    /// manager terminated with.
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(_) => Err(ConsumerError::ManagerUnavailable),
        }
    }
}
