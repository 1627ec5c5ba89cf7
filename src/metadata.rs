//! Cluster metadata cache and partition routing.
//!
//! The cache holds the most recent successful metadata response as an
//! immutable snapshot behind an `Arc`. Writers swap the whole snapshot;
//! readers clone the `Arc` once and then observe a fully consistent view,
//! never a partial update. A failed refresh leaves the previous snapshot
//! in effect.
//!
//! Refresh scheduling is a caller concern (typically a ticker at
//! `metadata_max_age_ms`); the cache only exposes [`refresh`].
//!
//! [`refresh`]: MetadataCache::refresh

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::brokers::Brokers;
use crate::error::{Error, KafkaCode, Result};
use crate::protocol::{BrokerInfo, MetadataResponse, PartitionMetadata, TopicMetadata};
use crate::types::{BrokerId, PartitionIndex};

/// An immutable view of the cluster at one point in time.
#[derive(Debug, Default)]
pub struct MetadataSnapshot {
    pub brokers: Vec<BrokerInfo>,
    topics: HashMap<String, TopicMetadata>,
}

impl MetadataSnapshot {
    fn from_response(response: MetadataResponse) -> Self {
        let topics = response
            .topics
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();
        Self {
            brokers: response.brokers,
            topics,
        }
    }

    pub fn topic(&self, name: &str) -> Option<&TopicMetadata> {
        self.topics.get(name)
    }

    /// Which node leads `partition` of `topic`.
    ///
    /// Returns `BrokerId::INVALID` when the partition currently has no
    /// leader, and [`Error::Kafka`] when the partition is marked errored or
    /// unknown.
    pub fn leader_of(&self, topic: &str, partition: PartitionIndex) -> Result<BrokerId> {
        let partition = self
            .partition(topic, partition)
            .ok_or(Error::Kafka(KafkaCode::UnknownTopicOrPartition))?;
        if partition.error != KafkaCode::None {
            return Err(Error::Kafka(partition.error));
        }
        Ok(partition.leader)
    }

    pub fn partitions_of(&self, topic: &str) -> Result<&[PartitionMetadata]> {
        self.topics
            .get(topic)
            .map(|t| t.partitions.as_slice())
            .ok_or(Error::Kafka(KafkaCode::UnknownTopicOrPartition))
    }

    fn partition(&self, topic: &str, partition: PartitionIndex) -> Option<&PartitionMetadata> {
        self.topics
            .get(topic)?
            .partitions
            .iter()
            .find(|p| p.partition == partition)
    }
}

/// Shared metadata cache with atomic snapshot replacement.
#[derive(Debug, Default)]
pub struct MetadataCache {
    snapshot: RwLock<Arc<MetadataSnapshot>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot. Holders keep observing this snapshot even
    /// while newer ones are installed.
    pub fn snapshot(&self) -> Arc<MetadataSnapshot> {
        self.snapshot.read().expect("metadata lock poisoned").clone()
    }

    pub fn leader_of(&self, topic: &str, partition: PartitionIndex) -> Result<BrokerId> {
        self.snapshot().leader_of(topic, partition)
    }

    /// Fetch fresh metadata for `topics` (empty slice means all topics)
    /// and install it as the new snapshot. Retries up to the configured
    /// `fetch_topic_metadata_retries`; on total failure the previous
    /// snapshot stays in place and the last error is returned.
    pub async fn refresh(&self, brokers: &Brokers, topics: &[String]) -> Result<()> {
        let attempts = brokers.config().fetch_topic_metadata_retries.max(1);
        let mut last_error = Error::NoAvailableBroker;
        for attempt in 1..=attempts {
            match brokers.metadata(topics).await {
                Ok(response) => {
                    let next = Arc::new(MetadataSnapshot::from_response(response));
                    *self.snapshot.write().expect("metadata lock poisoned") = next;
                    debug!(attempt, "metadata snapshot replaced");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "metadata refresh attempt failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
