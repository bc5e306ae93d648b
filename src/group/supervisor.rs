//! Worker supervisor interface
//!
//! The manager never runs partition workers itself; it asks an external
//! [`WorkerSupervisor`] to start them and observes their termination
//! through the exit channel of the returned [`SpawnedWorker`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::config::FetchConfig;
use crate::error::Result;
use crate::handler::MessageHandlerFactory;

/// Opaque identity of a running worker, issued by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Wrap a raw supervisor-assigned id
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id value
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Everything a supervisor needs to start one partition worker
#[derive(Clone)]
pub struct WorkerSpec {
    /// Consumer group id
    pub group: String,
    /// Assigned topic
    pub topic: String,
    /// Assigned partition
    pub partition: i32,
    /// Generation the worker is started under
    pub generation_id: i32,
    /// First offset to consume
    pub begin_offset: i64,
    /// Fetch-engine tuning
    pub fetch: FetchConfig,
    /// User handler factory
    pub handler: Arc<dyn MessageHandlerFactory>,
    /// User init arguments, passed to the factory at worker startup
    pub handler_init_args: Value,
}

impl fmt::Debug for WorkerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSpec")
            .field("group", &self.group)
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("generation_id", &self.generation_id)
            .field("begin_offset", &self.begin_offset)
            .finish_non_exhaustive()
    }
}

/// A worker the supervisor has started.
///
/// The exit channel resolves when the worker terminates for any reason:
/// a graceful stop sends a value, a crash drops the sender. Either way
/// the manager's monitor observes it.
#[derive(Debug)]
pub struct SpawnedWorker {
    /// Supervisor-assigned identity, used for stop requests
    pub id: WorkerId,
    /// Resolves when the worker terminates
    pub exit: oneshot::Receiver<()>,
}

/// Dynamically starts and stops partition workers on the manager's behalf
#[async_trait]
pub trait WorkerSupervisor: Send + Sync {
    /// Start a worker for the given spec and return its identity plus
    /// exit channel. Awaited inline by the manager.
    async fn start_worker(&self, spec: WorkerSpec) -> Result<SpawnedWorker>;

    /// Ask a worker to unsubscribe and shut down gracefully
    async fn unsubscribe(&self, worker: WorkerId) -> Result<()>;

    /// Advance a worker's prefetch window past `offset`
    async fn ack_fetched(&self, worker: WorkerId, offset: i64) -> Result<()>;
}
