//! Broker registry: node-id to [`Broker`] mapping for one cluster.
//!
//! Bootstraps from a seed list by walking it in order until one seed
//! answers a Metadata request, then tracks the advertised broker roster.
//! Handles are created lazily and idempotently: two concurrent lookups of
//! the same node observe the same [`Broker`], and a handle's connection is
//! only dialed when it is first used.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::broker::Broker;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::{
    BrokerInfo, DescribeLogDirsRequest, DescribeLogDirsResponse, ListGroupsRequest,
    MetadataRequest, MetadataResponse,
};
use crate::types::BrokerId;

#[derive(Debug, Default)]
struct RegistryState {
    infos: Vec<BrokerInfo>,
    by_id: HashMap<BrokerId, Broker>,
}

/// All brokers of one cluster.
#[derive(Debug)]
pub struct Brokers {
    config: Arc<ClientConfig>,
    state: Mutex<RegistryState>,
}

impl Brokers {
    /// Validate the config, then connect to each seed in order until one
    /// serves a Metadata request. The advertised brokers become the
    /// registry's roster.
    pub async fn bootstrap(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let seeds = config.seed_addresses()?;

        let mut last_error = Error::NoAvailableBroker;
        for seed in &seeds {
            let seed_broker = Broker::new(seed, BrokerId::INVALID, Arc::clone(&config));
            match seed_broker.request(&MetadataRequest::all_topics()).await {
                Ok(response) => {
                    seed_broker.close().await;
                    debug!(
                        seed = %seed,
                        brokers = response.brokers.len(),
                        "bootstrapped from seed"
                    );
                    return Ok(Self {
                        config,
                        state: Mutex::new(RegistryState {
                            infos: response.brokers,
                            by_id: HashMap::new(),
                        }),
                    });
                }
                Err(e) => {
                    warn!(seed = %seed, error = %e, "bootstrap seed failed");
                    seed_broker.close().await;
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    pub fn config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    /// The current roster, as learned from the latest metadata.
    pub async fn infos(&self) -> Vec<BrokerInfo> {
        self.state.lock().await.infos.clone()
    }

    /// The broker handle for `node_id`, creating it from the cached address
    /// on first lookup.
    pub async fn get(&self, node_id: BrokerId) -> Result<Broker> {
        let mut state = self.state.lock().await;
        if let Some(broker) = state.by_id.get(&node_id) {
            return Ok(broker.clone());
        }
        let info = state
            .infos
            .iter()
            .find(|info| info.node_id == node_id)
            .ok_or(Error::UnknownBroker(node_id.value()))?;
        let broker = Broker::new(&info.address(), node_id, Arc::clone(&self.config));
        state.by_id.insert(node_id, broker.clone());
        Ok(broker)
    }

    /// Fetch metadata from any healthy broker, trying the roster in order
    /// and moving on after I/O failures. The response also refreshes the
    /// roster.
    pub async fn metadata(&self, topics: &[String]) -> Result<MetadataResponse> {
        let request = MetadataRequest::new(topics.to_vec());
        let infos = self.infos().await;
        if infos.is_empty() {
            return Err(Error::NoAvailableBroker);
        }

        let mut last_error = Error::NoAvailableBroker;
        for info in &infos {
            let broker = match self.get(info.node_id).await {
                Ok(broker) => broker,
                Err(e) => {
                    last_error = e;
                    continue;
                }
            };
            match broker.request(&request).await {
                Ok(response) => {
                    self.absorb_roster(&response).await;
                    return Ok(response);
                }
                Err(e @ Error::Kafka(_)) => return Err(e),
                Err(e) => {
                    warn!(broker = %broker.address(), error = %e, "metadata request failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Replace the roster with the one a metadata response advertises,
    /// dropping handles for nodes that disappeared or moved.
    async fn absorb_roster(&self, response: &MetadataResponse) {
        if response.brokers.is_empty() {
            return;
        }
        let mut state = self.state.lock().await;
        state.infos = response.brokers.clone();
        let infos = state.infos.clone();
        state.by_id.retain(|node_id, broker| {
            infos
                .iter()
                .any(|info| info.node_id == *node_id && info.address() == broker.address())
        });
    }

    /// List consumer groups across every broker in the roster.
    pub async fn list_groups(&self) -> Result<Vec<String>> {
        let mut groups = Vec::new();
        for info in self.infos().await {
            let broker = self.get(info.node_id).await?;
            let response = broker.request(&ListGroupsRequest).await?;
            groups.extend(response.groups.into_iter().map(|g| g.group_id));
        }
        Ok(groups)
    }

    /// Describe log directories for `topics` on every broker that hosts a
    /// replica of them, keyed by node id. Brokers that fail to answer are
    /// skipped.
    pub async fn describe_log_dirs(
        &self,
        topics: &[String],
    ) -> Result<HashMap<BrokerId, DescribeLogDirsResponse>> {
        let metadata = self.metadata(topics).await?;

        // replica node -> the (topic, partition) pairs it hosts
        let mut per_broker: HashMap<BrokerId, DescribeLogDirsRequest> = HashMap::new();
        for topic in &metadata.topics {
            for partition in &topic.partitions {
                for replica in &partition.replicas {
                    per_broker
                        .entry(*replica)
                        .or_default()
                        .add_topic_partition(&topic.name, partition.partition);
                }
            }
        }

        let mut results = HashMap::new();
        for (node_id, request) in per_broker {
            let broker = self.get(node_id).await?;
            let mut response = match broker.request(&request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(broker = %broker.address(), error = %e, "describe log dirs failed");
                    continue;
                }
            };
            for result in &mut response.results {
                result.topics.retain(|t| topics.contains(&t.name));
            }
            response.results.retain(|r| !r.topics.is_empty());
            results.insert(node_id, response);
        }
        Ok(results)
    }

    /// Close every owned broker connection.
    pub async fn close(&self) {
        let brokers: Vec<Broker> = {
            let state = self.state.lock().await;
            state.by_id.values().cloned().collect()
        };
        for broker in brokers {
            broker.close().await;
        }
    }
}
