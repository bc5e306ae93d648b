//! Coordinator-issued partition assignments

use serde::{Deserialize, Serialize};

/// One partition assignment issued by the group coordinator.
///
/// `begin_offset` is the next offset to consume; a worker started from
/// this assignment fetches from it, and the manager tracks it forward as
/// offsets are acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Assigned topic
    pub topic: String,
    /// Assigned partition
    pub partition: i32,
    /// First offset to consume
    pub begin_offset: i64,
}

impl Assignment {
    /// Create an assignment
    pub fn new(topic: impl Into<String>, partition: i32, begin_offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            begin_offset,
        }
    }
}
