//! Application-facing acknowledgement routing
//!
//! Acks do not go through the manager's serialization point unless they
//! have to: the router reads the shared registry snapshot to pick a path
//! and to gate direct acks by generation. Every entry point returns
//! unconditionally; failures are logged, never raised, because the
//! coordinator re-delivers anything left unacked.

use std::sync::Arc;

use tracing::{error, warn};

use crate::group::coordinator::DirectAcknowledger;
use crate::group::manager::GroupManagerHandle;
use crate::group::registry::AssignmentRegistry;
use crate::handler::ConsumerMessage;

/// Routes acknowledgements to the coordinator path or the direct path
#[derive(Clone)]
pub struct AckRouter {
    name: String,
    registry: Arc<AssignmentRegistry>,
    manager: GroupManagerHandle,
    direct: Option<Arc<dyn DirectAcknowledger>>,
}

impl AckRouter {
    pub(crate) fn new(
        name: String,
        registry: Arc<AssignmentRegistry>,
        manager: GroupManagerHandle,
        direct: Option<Arc<dyn DirectAcknowledger>>,
    ) -> Self {
        Self {
            name,
            registry,
            manager,
            direct,
        }
    }

    /// Acknowledge `offset` for `(topic, partition)` under `generation_id`.
    ///
    /// In indirect mode this enqueues a manager event without blocking.
    /// In direct mode the commit happens inline against the direct
    /// acknowledger, gated by the registry's generation snapshot.
    pub async fn ack(&self, topic: &str, partition: i32, generation_id: i32, offset: i64) {
        if self.registry.direct_ack() {
            self.ack_direct(topic, partition, generation_id, offset).await;
        } else {
            self.manager.ack(topic, partition, generation_id, offset);
        }
    }

    /// Record-shaped form of [`ack`](Self::ack)
    pub async fn ack_message(&self, message: &ConsumerMessage) {
        self.ack(
            &message.topic,
            message.partition,
            message.generation_id,
            message.offset,
        )
        .await;
    }

    async fn ack_direct(&self, topic: &str, partition: i32, generation_id: i32, offset: i64) {
        let Some(assignment) = self.registry.assignment() else {
            warn!(
                name = %self.name,
                topic = %topic,
                partition,
                generation_id,
                offset,
                "dropping direct ack: no active assignment"
            );
            return;
        };

        if assignment.generation_id != generation_id {
            warn!(
                name = %self.name,
                topic = %topic,
                partition,
                generation_id,
                assigned_generation = assignment.generation_id,
                offset,
                "dropping direct ack from stale generation"
            );
            return;
        }

        let Some(direct) = &self.direct else {
            error!(name = %self.name, "direct-ack mode without an acknowledger");
            return;
        };

        if let Err(err) = direct
            .ack(&assignment.member_id, topic, partition, generation_id, offset)
            .await
        {
            error!(
                name = %self.name,
                topic = %topic,
                partition,
                generation_id,
                offset,
                error = %err,
                "direct ack failed"
            );
        }
    }
}
