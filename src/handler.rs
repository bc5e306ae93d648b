//! Message-handling contract between partition workers and user code
//!
//! The manager does not run a fetch loop itself; it composes a
//! [`WorkerSpec`](crate::group::WorkerSpec) carrying the user's handler
//! factory and hands it to the worker supervisor. A worker implementation
//! creates one handler per partition via [`MessageHandlerFactory::create`]
//! and feeds it [`ConsumerMessage`]s.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::error::Result;

/// A single message as delivered to a user handler.
///
/// Carries the generation it was fetched under so the record-shaped ack
/// form can be routed without extra bookkeeping on the caller's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerMessage {
    /// Source topic
    pub topic: String,
    /// Source partition
    pub partition: i32,
    /// Offset of this message within the partition
    pub offset: i64,
    /// Group generation the owning worker was started under
    pub generation_id: i32,
    /// Message key, if any
    pub key: Option<Bytes>,
    /// Message payload
    pub value: Bytes,
    /// Broker timestamp in milliseconds since the epoch
    pub timestamp: i64,
}

/// Per-partition message handler implemented by the user
#[async_trait]
pub trait MessageHandler: Send {
    /// Process one message. Returning an error is the worker's signal to
    /// stop; the manager will restart the partition at the last acked
    /// offset.
    async fn handle_message(&mut self, message: ConsumerMessage) -> Result<()>;
}

/// Context handed to the handler factory when a worker starts
#[derive(Debug, Clone, Copy)]
pub struct HandlerInit<'a> {
    /// Consumer group id
    pub group: &'a str,
    /// Topic the worker is assigned
    pub topic: &'a str,
    /// Partition the worker is assigned
    pub partition: i32,
    /// User-supplied init arguments from the builder
    pub init_args: &'a Value,
}

/// Factory producing one [`MessageHandler`] per started worker
pub trait MessageHandlerFactory: Send + Sync {
    /// Create a handler for the partition described by `init`
    fn create(&self, init: HandlerInit<'_>) -> Box<dyn MessageHandler>;
}
