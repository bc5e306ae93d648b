//! The group manager: a single-task actor owning the worker fleet
//!
//! Three independent concurrency domains funnel into the manager's event
//! queue: the coordinator client (assignments, revocations), the
//! application (acks), and worker exit watchers (restarts). Events are
//! processed one at a time; every mutation of the worker table and the
//! generation happens from exactly one place.
//!
//! ```text
//!  coordinator client ──► assignments_received / revoke ──┐
//!  application ─────────► ack (non-blocking)  ────────────┤
//!  exit watchers ───────► worker_down ────────────────────┼──► event queue ──► GroupManager
//!  embedder ────────────► status / shutdown ──────────────┘       (mpsc)        (one task)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::GroupConfig;
use crate::error::{ConsumerError, Result};
use crate::group::assignment::Assignment;
use crate::group::coordinator::CoordinatorClient;
use crate::group::hooks::{AssignmentContext, LifecycleHooks};
use crate::group::registry::AssignmentRegistry;
use crate::group::supervisor::{WorkerSpec, WorkerSupervisor};
use crate::group::worker_table::{MonitorToken, WorkerHandle, WorkerTable};
use crate::handler::MessageHandlerFactory;

/// Event queue depth. Acks are submitted without blocking, so the queue
/// must absorb bursts from many partitions at once.
const EVENT_QUEUE_DEPTH: usize = 1024;

/// Outer budget for a revocation cycle; workers get this long to drain
/// in-flight messages.
const REVOKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause before a fatal exit, throttling restart storms at whatever
/// supervises the manager task.
const FATAL_EXIT_DELAY: Duration = Duration::from_secs(2);

/// Events serialized through the manager
pub(crate) enum ManagerEvent {
    AssignmentsReceived {
        member_id: String,
        generation_id: i32,
        assignments: Vec<Assignment>,
        reply: oneshot::Sender<Result<()>>,
    },
    AssignmentsRevoked {
        reply: oneshot::Sender<Result<()>>,
    },
    Ack {
        topic: String,
        partition: i32,
        generation_id: i32,
        offset: i64,
    },
    WorkerDown {
        token: MonitorToken,
    },
    Status {
        reply: oneshot::Sender<GroupStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Snapshot of one tracked worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    /// Assigned topic
    pub topic: String,
    /// Assigned partition
    pub partition: i32,
    /// Generation the worker was started under
    pub generation_id: i32,
    /// Next offset to consume
    pub latest_offset: i64,
}

/// Snapshot of the manager's current state
#[derive(Debug, Clone)]
pub struct GroupStatus {
    /// Instance name
    pub name: String,
    /// Consumer group id
    pub group: String,
    /// Subscribed topics
    pub topics: Vec<String>,
    /// Member id of the current assignment cycle, if assigned
    pub member_id: Option<String>,
    /// Current generation, if assigned
    pub generation_id: Option<i32>,
    /// One entry per live worker
    pub workers: Vec<WorkerStatus>,
}

/// Cloneable handle to a running group manager task.
///
/// The coordinator client drives the synchronous entry points
/// ([`assignments_received`](Self::assignments_received),
/// [`revoke_assignments`](Self::revoke_assignments)); the ack router uses
/// the non-blocking [`ack`](Self::ack).
#[derive(Debug, Clone)]
pub struct GroupManagerHandle {
    events: mpsc::Sender<ManagerEvent>,
}

impl GroupManagerHandle {
    #[cfg(test)]
    pub(crate) fn from_sender(events: mpsc::Sender<ManagerEvent>) -> Self {
        Self { events }
    }

    /// Deliver a new assignment cycle from the coordinator.
    ///
    /// Returns once lifecycle hooks have run and all workers are started.
    /// A hook or worker-start failure is returned here and is fatal to
    /// the manager.
    pub async fn assignments_received(
        &self,
        member_id: impl Into<String>,
        generation_id: i32,
        assignments: Vec<Assignment>,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(ManagerEvent::AssignmentsReceived {
                member_id: member_id.into(),
                generation_id,
                assignments,
                reply,
            })
            .await
            .map_err(|_| ConsumerError::ManagerUnavailable)?;
        rx.await.map_err(|_| ConsumerError::ManagerUnavailable)?
    }

    /// Revoke all current assignments: stop every worker, fire the
    /// revocation hook, and clear the generation.
    ///
    /// Budgeted at 30 seconds so workers can drain in-flight messages.
    pub async fn revoke_assignments(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(ManagerEvent::AssignmentsRevoked { reply })
            .await
            .map_err(|_| ConsumerError::ManagerUnavailable)?;
        match time::timeout(REVOKE_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConsumerError::ManagerUnavailable),
            Err(_) => Err(ConsumerError::Timeout(
                "revocation did not complete within 30s".to_string(),
            )),
        }
    }

    /// Submit an acknowledgement without blocking.
    ///
    /// A full or closed queue drops the ack with a warning; the
    /// coordinator will re-deliver anything left unacked.
    pub fn ack(&self, topic: &str, partition: i32, generation_id: i32, offset: i64) {
        let event = ManagerEvent::Ack {
            topic: topic.to_string(),
            partition,
            generation_id,
            offset,
        };
        if let Err(err) = self.events.try_send(event) {
            warn!(
                topic = %topic,
                partition,
                generation_id,
                offset,
                "dropping ack, manager queue unavailable: {}",
                err
            );
        }
    }

    /// Committed offsets for `topic` as known locally: always empty.
    /// The coordinator owns committed offsets; the manager persists
    /// nothing.
    pub fn get_committed_offsets(&self, _topic: &str) -> Vec<(i32, i64)> {
        Vec::new()
    }

    /// Snapshot the manager's current state
    pub async fn status(&self) -> Result<GroupStatus> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(ManagerEvent::Status { reply })
            .await
            .map_err(|_| ConsumerError::ManagerUnavailable)?;
        rx.await.map_err(|_| ConsumerError::ManagerUnavailable)
    }

    /// Stop all workers and terminate the manager task cleanly.
    ///
    /// Returns `Ok` if the manager was already gone.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        if self
            .events
            .send(ManagerEvent::Shutdown { reply })
            .await
            .is_err()
        {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }
}

/// Spawn a manager task, returning its handle and join handle.
///
/// The join handle resolves with the manager's exit reason: `Ok(())`
/// after a clean shutdown, or the fatal error otherwise.
pub(crate) fn spawn(
    config: GroupConfig,
    handler: Arc<dyn MessageHandlerFactory>,
    handler_init_args: Value,
    hooks: Arc<dyn LifecycleHooks>,
    supervisor: Arc<dyn WorkerSupervisor>,
    coordinator: Arc<dyn CoordinatorClient>,
    registry: Arc<AssignmentRegistry>,
) -> (GroupManagerHandle, JoinHandle<Result<()>>) {
    let (events, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let manager = GroupManager {
        config,
        handler,
        handler_init_args,
        hooks,
        supervisor,
        coordinator,
        registry,
        workers: WorkerTable::new(),
        generation_id: None,
        events: events.clone(),
        rx,
    };
    let task = tokio::spawn(manager.run());
    (GroupManagerHandle { events }, task)
}

struct GroupManager {
    config: GroupConfig,
    handler: Arc<dyn MessageHandlerFactory>,
    handler_init_args: Value,
    hooks: Arc<dyn LifecycleHooks>,
    supervisor: Arc<dyn WorkerSupervisor>,
    coordinator: Arc<dyn CoordinatorClient>,
    registry: Arc<AssignmentRegistry>,
    workers: WorkerTable,
    generation_id: Option<i32>,
    /// Clone of the queue's sender, handed to exit watchers
    events: mpsc::Sender<ManagerEvent>,
    rx: mpsc::Receiver<ManagerEvent>,
}

impl GroupManager {
    async fn run(mut self) -> Result<()> {
        info!(
            name = %self.config.name,
            group = %self.config.group,
            topics = ?self.config.topics,
            "group manager started"
        );

        while let Some(event) = self.rx.recv().await {
            match event {
                ManagerEvent::AssignmentsReceived {
                    member_id,
                    generation_id,
                    assignments,
                    reply,
                } => {
                    let result = self
                        .handle_assignments_received(&member_id, generation_id, assignments)
                        .await;
                    let fatal = result.as_ref().err().cloned();
                    let _ = reply.send(result);
                    if let Some(reason) = fatal {
                        return self.fatal_exit(reason).await;
                    }
                }
                ManagerEvent::AssignmentsRevoked { reply } => {
                    let result = self.handle_revoke().await;
                    let fatal = result.as_ref().err().cloned();
                    let _ = reply.send(result);
                    if let Some(reason) = fatal {
                        return self.fatal_exit(reason).await;
                    }
                }
                ManagerEvent::Ack {
                    topic,
                    partition,
                    generation_id,
                    offset,
                } => {
                    if let Err(reason) =
                        self.handle_ack(&topic, partition, generation_id, offset).await
                    {
                        return self.fatal_exit(reason).await;
                    }
                }
                ManagerEvent::WorkerDown { token } => {
                    if let Err(reason) = self.handle_worker_down(token).await {
                        return self.fatal_exit(reason).await;
                    }
                }
                ManagerEvent::Status { reply } => {
                    let _ = reply.send(self.status());
                }
                ManagerEvent::Shutdown { reply } => {
                    self.stop_workers().await;
                    self.registry.clear_assignment();
                    self.generation_id = None;
                    info!(name = %self.config.name, "group manager stopped");
                    let _ = reply.send(());
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    /// New assignment cycle: hooks first, then registry, then workers,
    /// then the generation transition. Hook rejection aborts before the
    /// registry is written or any worker is started.
    async fn handle_assignments_received(
        &mut self,
        member_id: &str,
        generation_id: i32,
        assignments: Vec<Assignment>,
    ) -> Result<()> {
        // A revoke precedes every assignment cycle; stale entries here
        // would leak workers.
        debug_assert!(
            self.workers.is_empty(),
            "assignments received with live workers"
        );

        info!(
            name = %self.config.name,
            group = %self.config.group,
            member_id = %member_id,
            generation_id,
            assignments = assignments.len(),
            "received assignments"
        );

        for assignment in &assignments {
            self.hooks
                .on_assignment(AssignmentContext {
                    group: &self.config.group,
                    topic: &assignment.topic,
                    partition: assignment.partition,
                    generation_id,
                })
                .await?;
        }

        self.registry
            .set_assignment(member_id.to_string(), generation_id);

        for assignment in assignments {
            let handle = self.start_worker(generation_id, &assignment).await?;
            self.workers.insert(handle);
        }

        self.generation_id = Some(generation_id);
        Ok(())
    }

    /// Tear down the current cycle: demonitor-then-stop each worker, fire
    /// the revocation hook, clear shared state.
    async fn handle_revoke(&mut self) -> Result<()> {
        info!(
            name = %self.config.name,
            group = %self.config.group,
            generation_id = ?self.generation_id,
            workers = self.workers.len(),
            "revoking assignments"
        );

        self.stop_workers().await;

        self.hooks.on_revocation().await?;

        self.registry.clear_assignment();
        self.generation_id = None;
        Ok(())
    }

    async fn stop_workers(&mut self) {
        for handle in self.workers.drain() {
            // Demonitor before the stop request: the exit that follows
            // must not fire a restart.
            handle.demonitor();
            if let Err(err) = self.supervisor.unsubscribe(handle.id()).await {
                warn!(
                    topic = %handle.topic(),
                    partition = handle.partition(),
                    worker = %handle.id(),
                    error = %err,
                    "worker did not stop cleanly"
                );
            }
        }
    }

    /// Indirect ack path: generation-gated, then coordinator commit,
    /// fetch-window advance, and offset tracking, in that order.
    async fn handle_ack(
        &mut self,
        topic: &str,
        partition: i32,
        generation_id: i32,
        offset: i64,
    ) -> Result<()> {
        if self.generation_id != Some(generation_id) {
            warn!(
                topic = %topic,
                partition,
                generation_id,
                current_generation = ?self.generation_id,
                offset,
                "dropping ack from stale generation"
            );
            return Ok(());
        }

        self.coordinator
            .ack(generation_id, topic, partition, offset)
            .await?;

        let worker_id = self
            .workers
            .get(topic, partition)
            .map(|worker| worker.id())
            .ok_or_else(|| ConsumerError::UnassignedPartition {
                topic: topic.to_string(),
                partition,
            })?;

        // The fetch engine may be mid-restart for this partition; the
        // coordinator commit already happened, so this is not fatal.
        if let Err(err) = self.supervisor.ack_fetched(worker_id, offset).await {
            warn!(
                topic = %topic,
                partition,
                offset,
                error = %err,
                "failed to advance fetch window"
            );
        }

        self.workers.update_offset(topic, partition, offset)?;
        Ok(())
    }

    /// A monitored worker exited: restart it at the last tracked offset,
    /// under the generation it was started with. Unknown tokens belong to
    /// workers demonitored during a revoke and are ignored.
    async fn handle_worker_down(&mut self, token: MonitorToken) -> Result<()> {
        let Some(dead) = self.workers.find_by_monitor(token) else {
            debug!("ignoring exit of demonitored worker");
            return Ok(());
        };

        let generation_id = dead.generation_id();
        let replacement = Assignment::new(dead.topic(), dead.partition(), dead.latest_offset());
        warn!(
            topic = %replacement.topic,
            partition = replacement.partition,
            generation_id,
            begin_offset = replacement.begin_offset,
            "worker exited, restarting"
        );

        let handle = self.start_worker(generation_id, &replacement).await?;
        self.workers.insert(handle);
        Ok(())
    }

    /// Ask the supervisor for a worker and install its exit monitor.
    async fn start_worker(
        &self,
        generation_id: i32,
        assignment: &Assignment,
    ) -> Result<WorkerHandle> {
        let spec = WorkerSpec {
            group: self.config.group.clone(),
            topic: assignment.topic.clone(),
            partition: assignment.partition,
            generation_id,
            begin_offset: assignment.begin_offset,
            fetch: self.config.fetch.clone(),
            handler: Arc::clone(&self.handler),
            handler_init_args: self.handler_init_args.clone(),
        };

        let spawned = self.supervisor.start_worker(spec).await?;

        let token = MonitorToken::next();
        let events = self.events.clone();
        let exit = spawned.exit;
        let watcher = tokio::spawn(async move {
            // Resolves on graceful exit and on sender drop alike.
            let _ = exit.await;
            let _ = events.send(ManagerEvent::WorkerDown { token }).await;
        });

        debug!(
            topic = %assignment.topic,
            partition = assignment.partition,
            generation_id,
            begin_offset = assignment.begin_offset,
            worker = %spawned.id,
            "worker started"
        );

        Ok(WorkerHandle::new(
            spawned.id,
            token,
            watcher,
            generation_id,
            assignment.topic.clone(),
            assignment.partition,
            assignment.begin_offset,
        ))
    }

    fn status(&self) -> GroupStatus {
        GroupStatus {
            name: self.config.name.clone(),
            group: self.config.group.clone(),
            topics: self.config.topics.clone(),
            member_id: self
                .registry
                .assignment()
                .map(|a| a.member_id.clone()),
            generation_id: self.generation_id,
            workers: self
                .workers
                .iter()
                .map(|h| WorkerStatus {
                    topic: h.topic().to_string(),
                    partition: h.partition(),
                    generation_id: h.generation_id(),
                    latest_offset: h.latest_offset(),
                })
                .collect(),
        }
    }

    async fn fatal_exit(&mut self, reason: ConsumerError) -> Result<()> {
        error!(
            name = %self.config.name,
            group = %self.config.group,
            error = %reason,
            "group manager terminating"
        );
        // Throttle restart loops at the enclosing supervisor.
        time::sleep(FATAL_EXIT_DELAY).await;
        Err(reason)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::group::supervisor::{SpawnedWorker, WorkerId};
    use crate::handler::{HandlerInit, MessageHandler, MessageHandlerFactory};

    struct NullHandler;

    #[async_trait::async_trait]
    impl MessageHandler for NullHandler {
        async fn handle_message(&mut self, _message: crate::handler::ConsumerMessage) -> Result<()> {
            Ok(())
        }
    }

    struct NullFactory;

    impl MessageHandlerFactory for NullFactory {
        fn create(&self, _init: HandlerInit<'_>) -> Box<dyn MessageHandler> {
            Box::new(NullHandler)
        }
    }

    #[derive(Default)]
    struct FakeSupervisor {
        next_id: AtomicU64,
        started: Mutex<Vec<(u64, String, i32, i32, i64)>>,
        exits: Mutex<HashMap<u64, oneshot::Sender<()>>>,
    }

    #[async_trait::async_trait]
    impl WorkerSupervisor for FakeSupervisor {
        async fn start_worker(&self, spec: WorkerSpec) -> Result<SpawnedWorker> {
            let raw = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let (tx, rx) = oneshot::channel();
            self.exits.lock().insert(raw, tx);
            self.started.lock().push((
                raw,
                spec.topic,
                spec.partition,
                spec.generation_id,
                spec.begin_offset,
            ));
            Ok(SpawnedWorker {
                id: WorkerId::new(raw),
                exit: rx,
            })
        }

        async fn unsubscribe(&self, worker: WorkerId) -> Result<()> {
            self.exits.lock().remove(&worker.raw());
            Ok(())
        }

        async fn ack_fetched(&self, _worker: WorkerId, _offset: i64) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeCoordinator {
        acks: Mutex<Vec<(i32, String, i32, i64)>>,
    }

    #[async_trait::async_trait]
    impl CoordinatorClient for FakeCoordinator {
        async fn ack(
            &self,
            generation_id: i32,
            topic: &str,
            partition: i32,
            offset: i64,
        ) -> Result<()> {
            self.acks
                .lock()
                .push((generation_id, topic.to_string(), partition, offset));
            Ok(())
        }
    }

    struct Fixture {
        handle: GroupManagerHandle,
        task: JoinHandle<Result<()>>,
        supervisor: Arc<FakeSupervisor>,
        coordinator: Arc<FakeCoordinator>,
    }

    fn fixture() -> Fixture {
        let supervisor = Arc::new(FakeSupervisor::default());
        let coordinator = Arc::new(FakeCoordinator::default());
        let (handle, task) = spawn(
            GroupConfig::new("n", ["localhost:9092"], "g", ["t"]),
            Arc::new(NullFactory),
            Value::Null,
            Arc::new(crate::group::hooks::DefaultHooks),
            supervisor.clone(),
            coordinator.clone(),
            Arc::new(AssignmentRegistry::new(false)),
        );
        Fixture {
            handle,
            task,
            supervisor,
            coordinator,
        }
    }

    #[tokio::test]
    async fn ack_for_unassigned_partition_is_fatal() {
        tokio::time::pause();
        let f = fixture();
        f.handle
            .assignments_received("m1", 7, vec![Assignment::new("t", 0, 100)])
            .await
            .unwrap();

        // Valid generation, partition never assigned: protocol violation.
        f.handle.ack("t", 9, 7, 10);

        let reason = f.task.await.unwrap().unwrap_err();
        assert_eq!(
            reason,
            ConsumerError::UnassignedPartition {
                topic: "t".to_string(),
                partition: 9,
            }
        );
        // The coordinator commit happens before the table lookup.
        assert_eq!(f.coordinator.acks.lock().len(), 1);
    }

    #[tokio::test]
    async fn unknown_monitor_token_is_ignored() {
        let f = fixture();
        f.handle
            .assignments_received("m1", 7, vec![Assignment::new("t", 0, 100)])
            .await
            .unwrap();

        f.handle
            .events
            .send(ManagerEvent::WorkerDown {
                token: MonitorToken::next(),
            })
            .await
            .unwrap();

        let status = f.handle.status().await.unwrap();
        assert_eq!(status.workers.len(), 1);
        assert_eq!(f.supervisor.started.lock().len(), 1);

        f.handle.shutdown().await.unwrap();
        f.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stale_worker_down_after_replacement_is_a_noop() {
        let f = fixture();
        f.handle
            .assignments_received("m1", 7, vec![Assignment::new("t", 0, 100)])
            .await
            .unwrap();

        // Tokens are unique per monitor installation; once the
        // replacement is installed, the dead worker's token matches
        // nothing in the table.
        let stale_token = MonitorToken::next();

        // Crash the live worker; its watcher reports the real token.
        let first_id = f.supervisor.started.lock()[0].0;
        drop(f.supervisor.exits.lock().remove(&first_id));

        // Wait for the restart to land.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let status = f.handle.status().await.unwrap();
            if f.supervisor.started.lock().len() == 2 && status.workers.len() == 1 {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "restart never landed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Replaying an unmatched token changes nothing.
        f.handle
            .events
            .send(ManagerEvent::WorkerDown { token: stale_token })
            .await
            .unwrap();
        let status = f.handle.status().await.unwrap();
        assert_eq!(status.workers.len(), 1);
        assert_eq!(f.supervisor.started.lock().len(), 2);

        f.handle.shutdown().await.unwrap();
        f.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_workers_and_clears_state() {
        let registry = Arc::new(AssignmentRegistry::new(false));
        let supervisor = Arc::new(FakeSupervisor::default());
        let (handle, task) = spawn(
            GroupConfig::new("n", ["localhost:9092"], "g", ["t"]),
            Arc::new(NullFactory),
            Value::Null,
            Arc::new(crate::group::hooks::DefaultHooks),
            supervisor.clone(),
            Arc::new(FakeCoordinator::default()),
            registry.clone(),
        );

        handle
            .assignments_received("m1", 7, vec![Assignment::new("t", 0, 0)])
            .await
            .unwrap();
        assert!(registry.assignment().is_some());

        handle.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
        assert!(registry.assignment().is_none());
        assert!(supervisor.exits.lock().is_empty());
    }
}
