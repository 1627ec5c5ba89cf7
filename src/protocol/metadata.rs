//! Metadata request/response pair (API key 3).
//!
//! An empty topic list asks for every topic in the cluster. The response
//! carries the full broker roster plus per-topic partition layout, and is
//! what seeds both the broker registry and the partition-leader cache.
//!
//! Version gates: v1 adds broker racks, the controller id, and the
//! per-topic internal flag; v2 the cluster id; v3 throttle time; v4 the
//! `allow_auto_topic_creation` request flag; v5 per-partition offline
//! replicas.

use bytes::{BufMut, Bytes};
use nom::number::complete::{be_i32, be_i8};
use nombytes::NomBytes;

use super::{ApiKey, KafkaRequest, KafkaResponse};
use crate::encode::Wire;
use crate::error::{KafkaCode, Result};
use crate::parser::{
    parse_array, parse_kafka_code, parse_nullable_string, parse_string, run_parser,
};
use crate::types::{BrokerId, PartitionIndex};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRequest {
    /// Topics to describe; empty means all topics.
    pub topics: Vec<String>,
    /// v4+; ignored on the wire below that.
    pub allow_auto_topic_creation: bool,
}

impl MetadataRequest {
    pub fn new(topics: Vec<String>) -> Self {
        Self {
            topics,
            allow_auto_topic_creation: false,
        }
    }

    /// Request metadata for every topic in the cluster.
    pub fn all_topics() -> Self {
        Self::new(Vec::new())
    }
}

impl KafkaRequest for MetadataRequest {
    type Response = MetadataResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::Metadata
    }

    fn body_len(&self, version: i16) -> usize {
        self.topics.wire_len() + if version >= 4 { 1 } else { 0 }
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, version: i16) -> Result<()> {
        self.topics.encode(buffer)?;
        if version >= 4 {
            self.allow_auto_topic_creation.encode(buffer)?;
        }
        Ok(())
    }
}

/// One broker as advertised by the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerInfo {
    pub node_id: BrokerId,
    pub host: String,
    pub port: i32,
    /// v1+.
    pub rack: Option<String>,
}

impl BrokerInfo {
    /// `host:port` form usable as a dial address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionMetadata {
    pub error: KafkaCode,
    pub partition: PartitionIndex,
    /// `BrokerId::INVALID` when the partition currently has no leader.
    pub leader: BrokerId,
    pub replicas: Vec<BrokerId>,
    pub isr: Vec<BrokerId>,
    /// v5+.
    pub offline_replicas: Vec<BrokerId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicMetadata {
    pub error: KafkaCode,
    pub name: String,
    /// v1+.
    pub is_internal: bool,
    pub partitions: Vec<PartitionMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataResponse {
    /// v3+.
    pub throttle_time_ms: i32,
    pub brokers: Vec<BrokerInfo>,
    /// v2+.
    pub cluster_id: Option<String>,
    /// v1+; `BrokerId::INVALID` below that.
    pub controller_id: BrokerId,
    pub topics: Vec<TopicMetadata>,
}

impl MetadataResponse {
    /// Look up one topic by name.
    pub fn topic(&self, name: &str) -> Option<&TopicMetadata> {
        self.topics.iter().find(|t| t.name == name)
    }
}

fn parse_broker(version: i16) -> impl Fn(NomBytes) -> nom::IResult<NomBytes, BrokerInfo> + Copy {
    move |s| {
        let (s, node_id) = be_i32(s)?;
        let (s, host) = parse_string(s)?;
        let (s, port) = be_i32(s)?;
        let (s, rack) = if version >= 1 {
            parse_nullable_string(s)?
        } else {
            (s, None)
        };
        Ok((
            s,
            BrokerInfo {
                node_id: BrokerId(node_id),
                host,
                port,
                rack,
            },
        ))
    }
}

fn parse_broker_id(s: NomBytes) -> nom::IResult<NomBytes, BrokerId> {
    let (s, id) = be_i32(s)?;
    Ok((s, BrokerId(id)))
}

fn parse_partition(
    version: i16,
) -> impl Fn(NomBytes) -> nom::IResult<NomBytes, PartitionMetadata> + Copy {
    move |s| {
        let (s, error) = parse_kafka_code(s)?;
        let (s, partition) = be_i32(s)?;
        let (s, leader) = be_i32(s)?;
        let (s, replicas) = parse_array(parse_broker_id)(s)?;
        let (s, isr) = parse_array(parse_broker_id)(s)?;
        let (s, offline_replicas) = if version >= 5 {
            parse_array(parse_broker_id)(s)?
        } else {
            (s, Vec::new())
        };
        Ok((
            s,
            PartitionMetadata {
                error,
                partition: PartitionIndex(partition),
                leader: BrokerId(leader),
                replicas,
                isr,
                offline_replicas,
            },
        ))
    }
}

fn parse_topic(version: i16) -> impl Fn(NomBytes) -> nom::IResult<NomBytes, TopicMetadata> + Copy {
    move |s| {
        let (s, error) = parse_kafka_code(s)?;
        let (s, name) = parse_string(s)?;
        let (s, is_internal) = if version >= 1 {
            let (s, raw) = be_i8(s)?;
            (s, raw != 0)
        } else {
            (s, false)
        };
        let (s, partitions) = parse_array(parse_partition(version))(s)?;
        Ok((
            s,
            TopicMetadata {
                error,
                name,
                is_internal,
                partitions,
            },
        ))
    }
}

impl KafkaResponse for MetadataResponse {
    fn parse(payload: Bytes, version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, throttle_time_ms) = if version >= 3 { be_i32(s)? } else { (s, 0) };
            let (s, brokers) = parse_array(parse_broker(version))(s)?;
            let (s, cluster_id) = if version >= 2 {
                parse_nullable_string(s)?
            } else {
                (s, None)
            };
            let (s, controller_id) = if version >= 1 {
                let (s, id) = be_i32(s)?;
                (s, BrokerId(id))
            } else {
                (s, BrokerId::INVALID)
            };
            let (s, topics) = parse_array(parse_topic(version))(s)?;
            Ok((
                s,
                MetadataResponse {
                    throttle_time_ms,
                    brokers,
                    cluster_id,
                    controller_id,
                    topics,
                },
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_request;
    use crate::types::CorrelationId;
    use bytes::BytesMut;

    fn put_string(buf: &mut BytesMut, s: &str) {
        buf.put_i16(s.len() as i16);
        buf.put_slice(s.as_bytes());
    }

    /// Build a v0 response with one broker and one single-partition topic.
    fn build_response_v0(leader: i32, partition_error: i16) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_i32(1); // brokers
        buf.put_i32(7);
        put_string(&mut buf, "node7.example");
        buf.put_i32(9092);
        buf.put_i32(1); // topics
        buf.put_i16(0); // topic error
        put_string(&mut buf, "events");
        buf.put_i32(1); // partitions
        buf.put_i16(partition_error);
        buf.put_i32(0); // partition id
        buf.put_i32(leader);
        buf.put_i32(1); // replicas
        buf.put_i32(7);
        buf.put_i32(1); // isr
        buf.put_i32(7);
        buf.freeze()
    }

    #[test]
    fn test_request_encoding_v0() {
        let request = MetadataRequest::new(vec!["a".to_string(), "b".to_string()]);
        let frame = encode_request(&request, 0, CorrelationId(1), "t").unwrap();
        let declared = i32::from_be_bytes(frame[0..4].try_into().unwrap());
        assert_eq!(declared as usize, frame.len() - 4);
        // body: array count + two 1-char strings
        assert_eq!(request.body_len(0), 4 + 3 + 3);
    }

    #[test]
    fn test_request_v4_appends_auto_create_flag() {
        let request = MetadataRequest::all_topics();
        assert_eq!(request.body_len(4), request.body_len(0) + 1);
    }

    #[test]
    fn test_parse_response_v0() {
        let response = MetadataResponse::parse(build_response_v0(7, 0), 0).unwrap();
        assert_eq!(response.brokers.len(), 1);
        assert_eq!(response.brokers[0].node_id, BrokerId(7));
        assert_eq!(response.brokers[0].address(), "node7.example:9092");
        assert_eq!(response.controller_id, BrokerId::INVALID);
        assert_eq!(response.cluster_id, None);

        let topic = response.topic("events").unwrap();
        assert_eq!(topic.partitions.len(), 1);
        assert_eq!(topic.partitions[0].leader, BrokerId(7));
        assert_eq!(topic.partitions[0].replicas, vec![BrokerId(7)]);
    }

    #[test]
    fn test_parse_leaderless_partition() {
        let response = MetadataResponse::parse(build_response_v0(-1, 5), 0).unwrap();
        let partition = &response.topic("events").unwrap().partitions[0];
        assert_eq!(partition.leader, BrokerId::INVALID);
        assert_eq!(partition.error, KafkaCode::LeaderNotAvailable);
    }

    #[test]
    fn test_parse_response_v5() {
        let mut buf = BytesMut::new();
        buf.put_i32(30); // throttle (v3+)
        buf.put_i32(1); // brokers
        buf.put_i32(1);
        put_string(&mut buf, "h");
        buf.put_i32(9092);
        buf.put_i16(-1); // rack null (v1+)
        put_string(&mut buf, "cluster-x"); // cluster id (v2+)
        buf.put_i32(1); // controller (v1+)
        buf.put_i32(1); // topics
        buf.put_i16(0);
        put_string(&mut buf, "t");
        buf.put_i8(0); // is_internal (v1+)
        buf.put_i32(1); // partitions
        buf.put_i16(0);
        buf.put_i32(4);
        buf.put_i32(1);
        buf.put_i32(0); // replicas
        buf.put_i32(0); // isr
        buf.put_i32(1); // offline (v5)
        buf.put_i32(9);

        let response = MetadataResponse::parse(buf.freeze(), 5).unwrap();
        assert_eq!(response.throttle_time_ms, 30);
        assert_eq!(response.cluster_id.as_deref(), Some("cluster-x"));
        assert_eq!(response.controller_id, BrokerId(1));
        let partition = &response.topic("t").unwrap().partitions[0];
        assert_eq!(partition.partition, PartitionIndex(4));
        assert_eq!(partition.offline_replicas, vec![BrokerId(9)]);
    }

    #[test]
    fn test_parse_truncated_fails() {
        assert!(MetadataResponse::parse(Bytes::from_static(&[0, 0]), 0).is_err());
    }
}
