//! Fetch request/response pair (API key 1).
//!
//! The client speaks v0 and v10. The v10-only request fields
//! (isolation level, session id/epoch, per-partition leader epoch and log
//! start offset) are omitted below that version; the forgotten-topics
//! section exists from v7.
//!
//! Response handling here covers the framing only: per-partition headers
//! are decoded, record sets stay opaque BYTES. Large fetches should go
//! through [`Broker::request_streaming`](crate::broker::Broker::request_streaming),
//! which hands the body to the caller as it arrives instead of buffering.

use bytes::{BufMut, Bytes};
use nom::number::complete::{be_i32, be_i64};
use nombytes::NomBytes;

use super::{non_zero, ApiKey, KafkaRequest, KafkaResponse};
use crate::encode::Wire;
use crate::error::{KafkaCode, Result};
use crate::parser::{parse_array, parse_kafka_code, parse_nullable_bytes, parse_string, run_parser};
use crate::types::{Offset, PartitionIndex};

/// One partition to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPartition {
    pub partition: PartitionIndex,
    /// v10+.
    pub current_leader_epoch: i32,
    pub fetch_offset: Offset,
    /// v10+.
    pub log_start_offset: Offset,
    pub max_bytes: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchTopic {
    pub name: String,
    pub partitions: Vec<FetchPartition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Always -1 for a consumer client.
    pub replica_id: i32,
    pub max_wait_ms: i32,
    pub min_bytes: i32,
    pub max_bytes: i32,
    /// v10+: 0 = read uncommitted, 1 = read committed.
    pub isolation_level: i8,
    /// v10+.
    pub session_id: i32,
    /// v10+.
    pub session_epoch: i32,
    pub topics: Vec<FetchTopic>,
    /// v7+: partitions to remove from an incremental fetch session.
    pub forgotten_topics: Vec<FetchForgottenTopic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchForgottenTopic {
    pub name: String,
    pub partitions: Vec<PartitionIndex>,
}

impl FetchRequest {
    pub fn new(max_wait_ms: i32, min_bytes: i32) -> Self {
        Self {
            replica_id: -1,
            max_wait_ms,
            min_bytes,
            max_bytes: 0,
            isolation_level: 0,
            session_id: 0,
            session_epoch: -1,
            topics: Vec::new(),
            forgotten_topics: Vec::new(),
        }
    }

    /// Add one partition to fetch. The request-level `max_bytes` grows by
    /// the partition budget.
    pub fn add_partition(
        &mut self,
        topic: &str,
        partition: PartitionIndex,
        fetch_offset: Offset,
        max_bytes: i32,
    ) {
        self.max_bytes += max_bytes;
        let block = FetchPartition {
            partition,
            current_leader_epoch: -1,
            fetch_offset,
            log_start_offset: Offset(-1),
            max_bytes,
        };
        match self.topics.iter_mut().find(|t| t.name == topic) {
            Some(t) => t.partitions.push(block),
            None => self.topics.push(FetchTopic {
                name: topic.to_string(),
                partitions: vec![block],
            }),
        }
    }
}

impl KafkaRequest for FetchRequest {
    type Response = FetchResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::Fetch
    }

    fn body_len(&self, version: i16) -> usize {
        let mut len = 4 + 4 + 4 + 4; // replica_id, max_wait, min_bytes, max_bytes
        if version >= 10 {
            len += 1 + 4 + 4; // isolation_level, session_id, session_epoch
        }
        len += 4;
        for topic in &self.topics {
            len += topic.name.wire_len() + 4;
            for _ in &topic.partitions {
                len += 4 + 8 + 4; // partition, fetch_offset, max_bytes
                if version >= 10 {
                    len += 4 + 8; // current_leader_epoch, log_start_offset
                }
            }
        }
        if version >= 7 {
            len += 4;
            for forgotten in &self.forgotten_topics {
                len += forgotten.name.wire_len() + forgotten.partitions.wire_len();
            }
        }
        len
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, version: i16) -> Result<()> {
        self.replica_id.encode(buffer)?;
        self.max_wait_ms.encode(buffer)?;
        self.min_bytes.encode(buffer)?;
        self.max_bytes.encode(buffer)?;
        if version >= 10 {
            self.isolation_level.encode(buffer)?;
            self.session_id.encode(buffer)?;
            self.session_epoch.encode(buffer)?;
        }

        (self.topics.len() as i32).encode(buffer)?;
        for topic in &self.topics {
            topic.name.encode(buffer)?;
            (topic.partitions.len() as i32).encode(buffer)?;
            for block in &topic.partitions {
                block.partition.encode(buffer)?;
                if version >= 10 {
                    block.current_leader_epoch.encode(buffer)?;
                }
                block.fetch_offset.encode(buffer)?;
                if version >= 10 {
                    block.log_start_offset.encode(buffer)?;
                }
                block.max_bytes.encode(buffer)?;
            }
        }

        if version >= 7 {
            (self.forgotten_topics.len() as i32).encode(buffer)?;
            for forgotten in &self.forgotten_topics {
                forgotten.name.encode(buffer)?;
                forgotten.partitions.encode(buffer)?;
            }
        }
        Ok(())
    }
}

/// A transaction aborted inside the fetched range (v4+).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbortedTransaction {
    pub producer_id: i64,
    pub first_offset: Offset,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPartitionResponse {
    pub partition: PartitionIndex,
    pub error: KafkaCode,
    pub high_watermark: Offset,
    /// v4+.
    pub last_stable_offset: Offset,
    /// v5+.
    pub log_start_offset: Offset,
    /// v4+.
    pub aborted_transactions: Vec<AbortedTransaction>,
    /// Opaque record batch bytes; may be absent when nothing was fetched.
    pub record_set: Option<Bytes>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchTopicResponse {
    pub name: String,
    pub partitions: Vec<FetchPartitionResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    /// v1+.
    pub throttle_time_ms: i32,
    /// v7+.
    pub error_code: KafkaCode,
    /// v7+.
    pub session_id: i32,
    pub topics: Vec<FetchTopicResponse>,
}

fn parse_aborted(s: NomBytes) -> nom::IResult<NomBytes, AbortedTransaction> {
    let (s, producer_id) = be_i64(s)?;
    let (s, first_offset) = be_i64(s)?;
    Ok((
        s,
        AbortedTransaction {
            producer_id,
            first_offset: Offset(first_offset),
        },
    ))
}

fn parse_partition(
    version: i16,
) -> impl Fn(NomBytes) -> nom::IResult<NomBytes, FetchPartitionResponse> + Copy {
    move |s| {
        let (s, partition) = be_i32(s)?;
        let (s, error) = parse_kafka_code(s)?;
        let (s, high_watermark) = be_i64(s)?;
        let (s, last_stable_offset, aborted_transactions) = if version >= 4 {
            let (s, lso) = be_i64(s)?;
            let (s, aborted) = parse_array(parse_aborted)(s)?;
            (s, lso, aborted)
        } else {
            (s, -1, Vec::new())
        };
        let (s, log_start_offset) = if version >= 5 { be_i64(s)? } else { (s, -1) };
        let (s, record_set) = parse_nullable_bytes(s)?;
        Ok((
            s,
            FetchPartitionResponse {
                partition: PartitionIndex(partition),
                error,
                high_watermark: Offset(high_watermark),
                last_stable_offset: Offset(last_stable_offset),
                log_start_offset: Offset(log_start_offset),
                aborted_transactions,
                record_set,
            },
        ))
    }
}

fn parse_topic(
    version: i16,
) -> impl Fn(NomBytes) -> nom::IResult<NomBytes, FetchTopicResponse> + Copy {
    move |s| {
        let (s, name) = parse_string(s)?;
        let (s, partitions) = parse_array(parse_partition(version))(s)?;
        Ok((s, FetchTopicResponse { name, partitions }))
    }
}

impl KafkaResponse for FetchResponse {
    fn parse(payload: Bytes, version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, throttle_time_ms) = if version >= 1 { be_i32(s)? } else { (s, 0) };
            let (s, error_code, session_id) = if version >= 7 {
                let (s, code) = parse_kafka_code(s)?;
                let (s, session) = be_i32(s)?;
                (s, code, session)
            } else {
                (s, KafkaCode::None, 0)
            };
            let (s, topics) = parse_array(parse_topic(version))(s)?;
            Ok((
                s,
                FetchResponse {
                    throttle_time_ms,
                    error_code,
                    session_id,
                    topics,
                },
            ))
        })
    }

    fn error(&self) -> Option<KafkaCode> {
        non_zero(self.error_code)
    }
}
