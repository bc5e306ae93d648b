//! Configuration for the consumer-group client
//!
//! [`GroupConfig`] holds everything that is plain data: instance identity,
//! cluster contact points, subscription, and fetch tuning. The message
//! handler factory, lifecycle hooks, and collaborator handles are supplied
//! on the [`GroupConsumerBuilder`](crate::group::GroupConsumerBuilder)
//! instead, since they are not serializable.

use serde::{Deserialize, Serialize};

use crate::error::{ConsumerError, Result};

/// Where a partition worker starts consuming when no offset is supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOffset {
    /// Start from the earliest available offset
    Earliest,
    /// Start from the latest offset
    Latest,
    /// Start from a specific offset
    At(i64),
}

/// What to do when the consumed offset is out of range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetResetPolicy {
    /// Reset to the earliest available offset
    Earliest,
    /// Reset to the latest offset
    Latest,
}

/// Fetch-engine tuning, passed through to each partition worker.
///
/// The manager does not interpret these values; they are handed verbatim
/// to the worker supervisor as part of every
/// [`WorkerSpec`](crate::group::WorkerSpec).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Minimum bytes the broker should accumulate before responding
    pub min_bytes: i32,

    /// Maximum bytes to fetch per request (default: 1MB)
    pub max_bytes: i32,

    /// Maximum time the broker may wait for `min_bytes` (default: 10s)
    pub max_wait_time_ms: u64,

    /// Idle sleep between fetch attempts when the log is caught up
    pub sleep_timeout_ms: u64,

    /// Maximum number of unacked message sets in flight (default: 10)
    pub prefetch_count: usize,

    /// Maximum unacked bytes in flight (default: 100KB)
    pub prefetch_bytes: usize,

    /// Where to begin when the coordinator supplies no offset
    pub begin_offset: StartOffset,

    /// Reset behavior on out-of-range offsets
    pub offset_reset_policy: OffsetResetPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_bytes: 0,
            max_bytes: 1024 * 1024,
            max_wait_time_ms: 10_000,
            sleep_timeout_ms: 1_000,
            prefetch_count: 10,
            prefetch_bytes: 100 * 1024,
            begin_offset: StartOffset::Latest,
            offset_reset_policy: OffsetResetPolicy::Latest,
        }
    }
}

/// Configuration for one consumer-group instance.
///
/// # Example
///
/// ```rust
/// use streamline_consumer::GroupConfig;
///
/// let config = GroupConfig::new("orders-consumer", ["localhost:9092"], "orders-group", ["orders"]);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Instance identity, used in log fields and shared-state handles
    pub name: String,

    /// Cluster contact points (`host:port`); `endpoints` is accepted as an alias
    #[serde(alias = "endpoints")]
    pub brokers: Vec<String>,

    /// Kafka consumer group id
    pub group: String,

    /// Topics to subscribe to
    pub topics: Vec<String>,

    /// Commit offsets directly with the member id, bypassing the
    /// coordinator's ack channel (default: false).
    ///
    /// Direct mode trades ack latency for a weaker guarantee: it does not
    /// advance the local prefetch window or the tracked offset.
    #[serde(default)]
    pub direct_ack: bool,

    /// Fetch-engine tuning passed through to workers
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl GroupConfig {
    /// Create a configuration with required fields and default fetch tuning
    pub fn new<B, T>(
        name: impl Into<String>,
        brokers: B,
        group: impl Into<String>,
        topics: T,
    ) -> Self
    where
        B: IntoIterator,
        B::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            name: name.into(),
            brokers: brokers.into_iter().map(Into::into).collect(),
            group: group.into(),
            topics: topics.into_iter().map(Into::into).collect(),
            direct_ack: false,
            fetch: FetchConfig::default(),
        }
    }

    /// Validate the configuration, returning the first problem found.
    ///
    /// Called by the builder before the manager task is spawned so that
    /// misconfiguration is caught at startup rather than at the first
    /// rebalance.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ConsumerError::Config("name must not be empty".to_string()));
        }

        if self.brokers.is_empty() {
            return Err(ConsumerError::Config(
                "at least one broker endpoint is required".to_string(),
            ));
        }

        if self.group.is_empty() {
            return Err(ConsumerError::Config(
                "group id must not be empty".to_string(),
            ));
        }

        if self.topics.is_empty() {
            return Err(ConsumerError::Config(
                "at least one topic is required".to_string(),
            ));
        }

        if self.fetch.max_bytes <= 0 {
            return Err(ConsumerError::Config(
                "fetch.max_bytes must be positive".to_string(),
            ));
        }

        if self.fetch.min_bytes < 0 || self.fetch.min_bytes > self.fetch.max_bytes {
            return Err(ConsumerError::Config(format!(
                "fetch.min_bytes must be between 0 and max_bytes ({})",
                self.fetch.max_bytes
            )));
        }

        if self.fetch.prefetch_count == 0 {
            return Err(ConsumerError::Config(
                "fetch.prefetch_count must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> GroupConfig {
        GroupConfig::new("n", ["localhost:9092"], "g", ["t"])
    }

    #[test]
    fn default_fetch_config() {
        let fetch = FetchConfig::default();
        assert_eq!(fetch.max_bytes, 1024 * 1024);
        assert_eq!(fetch.prefetch_count, 10);
        assert_eq!(fetch.begin_offset, StartOffset::Latest);
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_required_fields() {
        let mut config = valid_config();
        config.name.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.brokers.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.group.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.topics.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inconsistent_fetch_settings() {
        let mut config = valid_config();
        config.fetch.min_bytes = config.fetch.max_bytes + 1;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.fetch.prefetch_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn endpoints_is_accepted_as_brokers_alias() {
        let config: GroupConfig = serde_json::from_str(
            r#"{
                "name": "n",
                "endpoints": ["localhost:9092"],
                "group": "g",
                "topics": ["t"]
            }"#,
        )
        .unwrap();

        assert_eq!(config.brokers, vec!["localhost:9092".to_string()]);
        assert!(!config.direct_ack);
        assert_eq!(config.fetch, FetchConfig::default());
    }

    #[test]
    fn start_offset_serde_forms() {
        assert_eq!(
            serde_json::to_string(&StartOffset::Earliest).unwrap(),
            r#""earliest""#
        );
        let at: StartOffset = serde_json::from_str(r#"{"at": 42}"#).unwrap();
        assert_eq!(at, StartOffset::At(42));
    }
}
