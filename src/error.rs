//! Error types for the consumer-group client
//!
//! A single error enum covers the whole crate. Variants are `Clone` because
//! a fatal reason is delivered twice: once as the reply to the caller that
//! triggered it, and once as the exit value of the manager task.

use thiserror::Error;

/// Result type alias for consumer operations
pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Errors surfaced by the consumer-group client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsumerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The assignment handler refused an assignment. Fatal to the manager.
    #[error("Assignment rejected: {0}")]
    AssignmentRejected(String),

    /// The revocation handler failed. Fatal to the manager.
    #[error("Revocation handler failed: {0}")]
    RevocationFailed(String),

    /// An offset was acknowledged for a partition with no live worker.
    /// Indicates a coordinator protocol violation; fatal to the manager.
    #[error("Ack for unassigned partition: topic={topic}, partition={partition}")]
    UnassignedPartition {
        /// Topic of the unexpected ack
        topic: String,
        /// Partition of the unexpected ack
        partition: i32,
    },

    /// Group coordinator failure
    #[error("Coordinator error: {0}")]
    Coordinator(String),

    /// Worker supervisor failure
    #[error("Supervisor error: {0}")]
    Supervisor(String),

    /// User message-handler failure
    #[error("Handler error: {0}")]
    Handler(String),

    /// Operation did not complete within its budget
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The manager task is no longer running
    #[error("Group manager is not running")]
    ManagerUnavailable,
}
