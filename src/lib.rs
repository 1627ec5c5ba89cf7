//! # Kavka
//! Rust-native Kafka client protocol core.
//!
//! This crate implements the hard parts of a Kafka client: the binary,
//! version-negotiated wire protocol, request/response multiplexing over
//! long-lived TCP (optionally TLS) connections, cluster metadata routing,
//! and consumer-group coordination. This is pure Rust all the way down; no
//! librdkafka FFI.
//!
//! # Goals
//! - Easy to understand code
//! - Leverage best in class libraries such as [Tokio](https://tokio.rs/), [Nom](https://docs.rs/nom/latest/nom/)
//! - Be a building block for consumers, producers, and admin tools
//!
//! ## Getting started
//!
//! Bootstrap a [`Brokers`](brokers::Brokers) registry from a seed list and
//! issue typed requests through the [`Broker`](broker::Broker) handles it
//! hands out:
//!
//! ```rust,no_run
//! use kavka::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::new("127.0.0.1:9092");
//!     let brokers = Brokers::bootstrap(config).await?;
//!
//!     let metadata = brokers.metadata(&[]).await?;
//!     for broker in &metadata.brokers {
//!         println!("node {} at {}", broker.node_id, broker.address());
//!     }
//!
//!     brokers.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ### Consumer groups
//!
//! [`GroupClient`](group::GroupClient) drives the join/sync/heartbeat
//! cycle with a pluggable [`AssignmentStrategy`](group::AssignmentStrategy)
//! (range by default):
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kavka::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let brokers = Arc::new(Brokers::bootstrap(ClientConfig::new("127.0.0.1:9092")).await?);
//! let mut group = GroupClient::new(brokers, "my-group", vec!["events".to_string()]);
//! group.establish().await?;
//! loop {
//!     tokio::time::sleep(group.heartbeat_interval()).await;
//!     if group.heartbeat().await.is_err() {
//!         group.establish().await?;
//!     }
//! }
//! # }
//! ```
//!
//! ## Resources
//! - [Kafka Protocol Spec](https://kafka.apache.org/protocol.html)
//! - [Confluence Docs](https://cwiki.apache.org/confluence/display/KAFKA/A+Guide+To+The+Kafka+Protocol)

#![forbid(unsafe_code)]

mod encode;
mod parser;

pub mod broker;
pub mod brokers;
pub mod config;
pub mod constants;
pub mod error;
pub mod group;
pub mod metadata;
pub mod network;
pub mod protocol;
pub mod telemetry;
pub mod types;

pub mod prelude {
    //! Main exports for client applications.
    pub use crate::broker::{Broker, FetchStream};
    pub use crate::brokers::Brokers;
    pub use crate::config::{ClientConfig, SaslOptions, TlsOptions};
    pub use crate::error::{Error, KafkaCode, Result};
    pub use crate::group::{AssignmentStrategy, GroupClient, GroupState, RangeAssignor};
    pub use crate::metadata::{MetadataCache, MetadataSnapshot};
    pub use crate::types::{BrokerId, CorrelationId, GenerationId, Offset, PartitionIndex};

    pub use bytes;

    pub mod protocol {
        //! Wire-level request/response types.
        pub use crate::protocol::*;
    }
}
