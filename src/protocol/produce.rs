//! Produce request/response pair (API key 0).
//!
//! The record set per partition is carried as opaque BYTES: batch layout,
//! compression, and CRCs belong to the producer layer, not this core.

use bytes::{BufMut, Bytes};
use nom::number::complete::{be_i32, be_i64};
use nombytes::NomBytes;

use super::{ApiKey, KafkaRequest, KafkaResponse};
use crate::encode::Wire;
use crate::error::{KafkaCode, Result};
use crate::parser::{parse_array, parse_kafka_code, parse_string, run_parser};
use crate::types::{Offset, PartitionIndex};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducePartitionData {
    pub partition: PartitionIndex,
    /// Opaque record batch bytes.
    pub record_set: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProduceTopicData {
    pub name: String,
    pub partitions: Vec<ProducePartitionData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProduceRequest {
    /// Required acks: 0, 1, or -1 (all in-sync replicas).
    pub acks: i16,
    pub timeout_ms: i32,
    pub topics: Vec<ProduceTopicData>,
}

impl ProduceRequest {
    pub fn new(acks: i16, timeout_ms: i32) -> Self {
        Self {
            acks,
            timeout_ms,
            topics: Vec::new(),
        }
    }

    /// Append a record set for one partition, grouping by topic.
    pub fn add_record_set(&mut self, topic: &str, partition: PartitionIndex, record_set: Bytes) {
        let data = ProducePartitionData {
            partition,
            record_set,
        };
        match self.topics.iter_mut().find(|t| t.name == topic) {
            Some(t) => t.partitions.push(data),
            None => self.topics.push(ProduceTopicData {
                name: topic.to_string(),
                partitions: vec![data],
            }),
        }
    }
}

impl Wire for ProducePartitionData {
    fn wire_len(&self) -> usize {
        4 + self.record_set.wire_len()
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        self.partition.encode(buffer)?;
        self.record_set.encode(buffer)
    }
}

impl Wire for ProduceTopicData {
    fn wire_len(&self) -> usize {
        self.name.wire_len() + self.partitions.wire_len()
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        self.name.encode(buffer)?;
        self.partitions.encode(buffer)
    }
}

impl KafkaRequest for ProduceRequest {
    type Response = ProduceResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::Produce
    }

    fn body_len(&self, _version: i16) -> usize {
        2 + 4 + self.topics.wire_len()
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, _version: i16) -> Result<()> {
        self.acks.encode(buffer)?;
        self.timeout_ms.encode(buffer)?;
        self.topics.encode(buffer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducePartitionResponse {
    pub partition: PartitionIndex,
    pub error: KafkaCode,
    pub base_offset: Offset,
    /// v2+; -1 when the broker uses create time.
    pub log_append_time_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProduceTopicResponse {
    pub name: String,
    pub partitions: Vec<ProducePartitionResponse>,
}

/// Produce response. Errors are per partition; there is no top-level code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProduceResponse {
    pub topics: Vec<ProduceTopicResponse>,
    /// v1+.
    pub throttle_time_ms: i32,
}

fn parse_partition(
    version: i16,
) -> impl Fn(NomBytes) -> nom::IResult<NomBytes, ProducePartitionResponse> + Copy {
    move |s| {
        let (s, partition) = be_i32(s)?;
        let (s, error) = parse_kafka_code(s)?;
        let (s, base_offset) = be_i64(s)?;
        let (s, log_append_time_ms) = if version >= 2 { be_i64(s)? } else { (s, -1) };
        Ok((
            s,
            ProducePartitionResponse {
                partition: PartitionIndex(partition),
                error,
                base_offset: Offset(base_offset),
                log_append_time_ms,
            },
        ))
    }
}

fn parse_topic(
    version: i16,
) -> impl Fn(NomBytes) -> nom::IResult<NomBytes, ProduceTopicResponse> + Copy {
    move |s| {
        let (s, name) = parse_string(s)?;
        let (s, partitions) = parse_array(parse_partition(version))(s)?;
        Ok((s, ProduceTopicResponse { name, partitions }))
    }
}

impl KafkaResponse for ProduceResponse {
    fn parse(payload: Bytes, version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, topics) = parse_array(parse_topic(version))(s)?;
            let (s, throttle_time_ms) = if version >= 1 { be_i32(s)? } else { (s, 0) };
            Ok((
                s,
                ProduceResponse {
                    topics,
                    throttle_time_ms,
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

    #[test]
    fn test_add_record_set_groups_by_topic() {
        let mut request = ProduceRequest::new(-1, 5000);
        request.add_record_set("t", PartitionIndex(0), Bytes::from_static(b"a"));
        request.add_record_set("t", PartitionIndex(1), Bytes::from_static(b"b"));
        request.add_record_set("u", PartitionIndex(0), Bytes::from_static(b"c"));
        assert_eq!(request.topics.len(), 2);
        assert_eq!(request.topics[0].partitions.len(), 2);
    }

    #[test]
    fn test_frame_length_matches_body_len() {
        let mut request = ProduceRequest::new(1, 1000);
        request.add_record_set("events", PartitionIndex(3), Bytes::from_static(b"batch"));
        let frame = encode_request(&request, 2, CorrelationId(9), "p").unwrap();
        let declared = i32::from_be_bytes(frame[0..4].try_into().unwrap());
        assert_eq!(declared as usize, frame.len() - 4);
    }

    #[test]
    fn test_parse_response_v0() {
        let mut buf = BytesMut::new();
        buf.put_i32(1);
        buf.put_i16(6);
        buf.put_slice(b"events");
        buf.put_i32(1);
        buf.put_i32(3); // partition
        buf.put_i16(0); // error
        buf.put_i64(42); // base offset

        let response = ProduceResponse::parse(buf.freeze(), 0).unwrap();
        let partition = &response.topics[0].partitions[0];
        assert_eq!(partition.partition, PartitionIndex(3));
        assert_eq!(partition.base_offset, Offset(42));
        assert_eq!(partition.log_append_time_ms, -1);
        assert_eq!(response.throttle_time_ms, 0);
    }

    #[test]
    fn test_parse_response_v2() {
        let mut buf = BytesMut::new();
        buf.put_i32(1);
        buf.put_i16(1);
        buf.put_slice(b"t");
        buf.put_i32(1);
        buf.put_i32(0);
        buf.put_i16(6); // NotLeaderForPartition
        buf.put_i64(-1);
        buf.put_i64(1234); // log append time (v2)
        buf.put_i32(50); // throttle (v1+)

        let response = ProduceResponse::parse(buf.freeze(), 2).unwrap();
        let partition = &response.topics[0].partitions[0];
        assert_eq!(partition.error, KafkaCode::NotLeaderForPartition);
        assert_eq!(partition.log_append_time_ms, 1234);
        assert_eq!(response.throttle_time_ms, 50);
    }
}
