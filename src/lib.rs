#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Streamline Consumer
//!
//! Consumer-group client core for Kafka-compatible brokers: participates
//! in the group-membership protocol, owns one worker per assigned
//! partition, and keeps offsets, generation, and worker lifecycle
//! consistent with the coordinator's view of the group.
//!
//! ## Features
//!
//! - **Serialized manager**: assignment intake, revocation, acks, and
//!   worker restarts all funnel through one task — no locks exposed to
//!   callers
//! - **Crash recovery**: a dead partition worker is restarted at the last
//!   acked offset, preserving at-least-once semantics within a generation
//! - **Generation fencing**: straggler acks from a previous rebalance are
//!   detected and dropped on both ack paths
//! - **Direct-ack mode**: optionally commit offsets through a side
//!   channel tagged with the member id, bypassing the coordinator hop
//! - **Pluggable seams**: the coordinator client, worker supervisor, and
//!   message handler are trait objects supplied by the embedder
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use streamline_consumer::{GroupConfig, GroupConsumer};
//!
//! let config = GroupConfig::new(
//!     "orders-consumer",
//!     ["localhost:9092"],
//!     "orders-group",
//!     ["orders"],
//! );
//!
//! let consumer = GroupConsumer::builder(config)
//!     .handler(Arc::new(my_handler_factory))
//!     .supervisor(Arc::new(my_worker_supervisor))
//!     .coordinator(Arc::new(my_coordinator_client))
//!     .start()?;
//!
//! // Wire the handle into the coordinator client's rebalance callbacks,
//! // then ack from wherever messages are processed:
//! consumer.ack("orders", 0, generation_id, offset).await;
//! ```
//!
//! The Kafka wire protocol, the coordinator implementation, and the
//! per-partition fetch loop live outside this crate; they plug in through
//! the [`group::CoordinatorClient`], [`group::WorkerSupervisor`], and
//! [`handler::MessageHandlerFactory`] traits.

pub mod config;
pub mod error;
pub mod group;
pub mod handler;

pub use config::{FetchConfig, GroupConfig, OffsetResetPolicy, StartOffset};
pub use error::{ConsumerError, Result};
pub use group::{
    AckRouter, Assignment, AssignmentContext, AssignmentRegistry, CoordinatorClient,
    DefaultHooks, DirectAcknowledger, GroupAssignment, GroupConsumer, GroupConsumerBuilder,
    GroupManagerHandle, GroupStatus, LifecycleHooks, MonitorToken, SpawnedWorker, WorkerId,
    WorkerSpec, WorkerStatus, WorkerSupervisor,
};
pub use handler::{ConsumerMessage, HandlerInit, MessageHandler, MessageHandlerFactory};
