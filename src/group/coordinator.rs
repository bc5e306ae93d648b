//! Offset-commit interfaces to the group coordinator
//!
//! The coordinator client implements the Kafka group protocol elsewhere;
//! the manager only needs its ack surface. [`DirectAcknowledger`] is the
//! optional side channel used when direct-ack mode is enabled.

use async_trait::async_trait;

use crate::error::Result;

/// Commit path through the group coordinator client
#[async_trait]
pub trait CoordinatorClient: Send + Sync {
    /// Acknowledge `offset` for `(topic, partition)` under `generation_id`
    async fn ack(
        &self,
        generation_id: i32,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<()>;
}

/// Commit path that bypasses the coordinator's ack channel.
///
/// Commits are tagged with the member id so the backing store can verify
/// ownership without a coordinator round trip.
#[async_trait]
pub trait DirectAcknowledger: Send + Sync {
    /// Commit `offset` for `(topic, partition)` on behalf of `member_id`
    async fn ack(
        &self,
        member_id: &str,
        topic: &str,
        partition: i32,
        generation_id: i32,
        offset: i64,
    ) -> Result<()>;
}
