//! Bookkeeping for the local worker fleet

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;

use crate::error::{ConsumerError, Result};
use crate::group::supervisor::WorkerId;

static NEXT_MONITOR: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying one monitor installation.
///
/// Tokens are unique per installation: a restarted worker gets a fresh
/// token, so a stale exit notification for its predecessor no longer
/// matches anything in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorToken(u64);

impl MonitorToken {
    pub(crate) fn next() -> Self {
        Self(NEXT_MONITOR.fetch_add(1, Ordering::Relaxed))
    }
}

/// One live partition worker as tracked by the manager
#[derive(Debug)]
pub struct WorkerHandle {
    id: WorkerId,
    monitor: MonitorToken,
    watcher: JoinHandle<()>,
    generation_id: i32,
    topic: String,
    partition: i32,
    latest_offset: i64,
}

impl WorkerHandle {
    pub(crate) fn new(
        id: WorkerId,
        monitor: MonitorToken,
        watcher: JoinHandle<()>,
        generation_id: i32,
        topic: String,
        partition: i32,
        begin_offset: i64,
    ) -> Self {
        Self {
            id,
            monitor,
            watcher,
            generation_id,
            topic,
            partition,
            latest_offset: begin_offset,
        }
    }

    /// Supervisor-assigned worker identity
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Generation the worker was started under
    pub fn generation_id(&self) -> i32 {
        self.generation_id
    }

    /// Assigned topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Assigned partition
    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Next offset to consume; advanced on every successful ack
    pub fn latest_offset(&self) -> i64 {
        self.latest_offset
    }

    /// Stop observing this worker's exit. Must be called before a
    /// graceful stop so the imminent termination does not fire a restart.
    pub(crate) fn demonitor(&self) {
        self.watcher.abort();
    }
}

/// In-memory map of `(topic, partition)` to the worker that owns it
#[derive(Debug, Default)]
pub struct WorkerTable {
    workers: HashMap<(String, i32), WorkerHandle>,
}

impl WorkerTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a handle, returning any prior entry for the same key
    pub(crate) fn insert(&mut self, handle: WorkerHandle) -> Option<WorkerHandle> {
        self.workers
            .insert((handle.topic.clone(), handle.partition), handle)
    }

    pub(crate) fn get(&self, topic: &str, partition: i32) -> Option<&WorkerHandle> {
        self.workers.get(&(topic.to_string(), partition))
    }

    /// Record an acked offset; the worker's `latest_offset` becomes the
    /// next offset to consume. An absent key is a protocol violation.
    pub(crate) fn update_offset(
        &mut self,
        topic: &str,
        partition: i32,
        acked_offset: i64,
    ) -> Result<i64> {
        let handle = self
            .workers
            .get_mut(&(topic.to_string(), partition))
            .ok_or_else(|| ConsumerError::UnassignedPartition {
                topic: topic.to_string(),
                partition,
            })?;
        handle.latest_offset = acked_offset + 1;
        Ok(handle.latest_offset)
    }

    /// Reverse lookup by monitor token. Linear scan: this path only runs
    /// on worker death.
    pub(crate) fn find_by_monitor(&self, token: MonitorToken) -> Option<&WorkerHandle> {
        self.workers.values().find(|h| h.monitor == token)
    }

    /// Remove and return every handle, leaving the table empty
    pub(crate) fn drain(&mut self) -> Vec<WorkerHandle> {
        self.workers.drain().map(|(_, handle)| handle).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &WorkerHandle> {
        self.workers.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(topic: &str, partition: i32, generation_id: i32, begin_offset: i64) -> WorkerHandle {
        handle_with_token(topic, partition, generation_id, begin_offset, MonitorToken::next())
    }

    fn handle_with_token(
        topic: &str,
        partition: i32,
        generation_id: i32,
        begin_offset: i64,
        token: MonitorToken,
    ) -> WorkerHandle {
        WorkerHandle::new(
            WorkerId::new(0),
            token,
            tokio::spawn(async {}),
            generation_id,
            topic.to_string(),
            partition,
            begin_offset,
        )
    }

    #[tokio::test]
    async fn insert_overwrites_prior_entry() {
        let mut table = WorkerTable::new();
        assert!(table.insert(handle("t", 0, 7, 100)).is_none());
        let replaced = table.insert(handle("t", 0, 8, 200)).unwrap();

        assert_eq!(replaced.generation_id(), 7);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("t", 0).unwrap().generation_id(), 8);
    }

    #[tokio::test]
    async fn update_offset_advances_past_acked() {
        let mut table = WorkerTable::new();
        table.insert(handle("t", 0, 7, 100));

        assert_eq!(table.update_offset("t", 0, 103).unwrap(), 104);
        assert_eq!(table.get("t", 0).unwrap().latest_offset(), 104);
    }

    #[tokio::test]
    async fn update_offset_fails_for_unassigned_partition() {
        let mut table = WorkerTable::new();
        table.insert(handle("t", 0, 7, 100));

        let err = table.update_offset("t", 1, 10).unwrap_err();
        assert_eq!(
            err,
            ConsumerError::UnassignedPartition {
                topic: "t".to_string(),
                partition: 1,
            }
        );
    }

    #[tokio::test]
    async fn find_by_monitor_matches_only_its_worker() {
        let mut table = WorkerTable::new();
        let token = MonitorToken::next();
        table.insert(handle_with_token("t", 0, 7, 0, token));
        table.insert(handle("t", 1, 7, 0));

        let found = table.find_by_monitor(token).unwrap();
        assert_eq!(found.partition(), 0);
        assert!(table.find_by_monitor(MonitorToken::next()).is_none());
    }

    #[tokio::test]
    async fn drain_empties_the_table() {
        let mut table = WorkerTable::new();
        table.insert(handle("t", 0, 7, 0));
        table.insert(handle("t", 1, 7, 0));

        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert!(table.is_empty());
        assert!(table.drain().is_empty());
    }
}
