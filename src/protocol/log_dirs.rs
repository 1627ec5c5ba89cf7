//! DescribeLogDirs request/response pair (API key 35).
//!
//! Reports on-disk partition sizes per log directory of one broker. A null
//! topic list asks about every partition the broker hosts.

use bytes::{BufMut, Bytes};
use nom::number::complete::{be_i32, be_i64, be_i8};
use nombytes::NomBytes;

use super::{ApiKey, KafkaRequest, KafkaResponse};
use crate::encode::Wire;
use crate::error::{KafkaCode, Result};
use crate::parser::{parse_array, parse_kafka_code, parse_string, run_parser};
use crate::types::PartitionIndex;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeLogDirsTopic {
    pub name: String,
    pub partitions: Vec<PartitionIndex>,
}

impl Wire for DescribeLogDirsTopic {
    fn wire_len(&self) -> usize {
        self.name.wire_len() + self.partitions.wire_len()
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        self.name.encode(buffer)?;
        self.partitions.encode(buffer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeLogDirsRequest {
    /// `None` asks about all partitions hosted by the broker.
    pub topics: Option<Vec<DescribeLogDirsTopic>>,
}

impl DescribeLogDirsRequest {
    pub fn all() -> Self {
        Self { topics: None }
    }

    /// Add one partition, grouping by topic and deduplicating repeats.
    pub fn add_topic_partition(&mut self, topic: &str, partition: PartitionIndex) {
        let topics = self.topics.get_or_insert_with(Vec::new);
        let entry = match topics.iter_mut().find(|t| t.name == topic) {
            Some(t) => t,
            None => {
                topics.push(DescribeLogDirsTopic {
                    name: topic.to_string(),
                    partitions: Vec::new(),
                });
                topics.last_mut().expect("just pushed")
            }
        };
        if !entry.partitions.contains(&partition) {
            entry.partitions.push(partition);
        }
    }
}

impl KafkaRequest for DescribeLogDirsRequest {
    type Response = DescribeLogDirsResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::DescribeLogDirs
    }

    fn body_len(&self, _version: i16) -> usize {
        match &self.topics {
            None => 4,
            Some(topics) => topics.wire_len(),
        }
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, _version: i16) -> Result<()> {
        match &self.topics {
            None => (-1i32).encode(buffer),
            Some(topics) => topics.encode(buffer),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogDirPartition {
    pub partition: PartitionIndex,
    pub size_bytes: i64,
    pub offset_lag: i64,
    pub is_future: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogDirTopic {
    pub name: String,
    pub partitions: Vec<LogDirPartition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogDirResult {
    pub error: KafkaCode,
    pub log_dir: String,
    pub topics: Vec<LogDirTopic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeLogDirsResponse {
    pub throttle_time_ms: i32,
    pub results: Vec<LogDirResult>,
}

fn parse_log_dir_partition(s: NomBytes) -> nom::IResult<NomBytes, LogDirPartition> {
    let (s, partition) = be_i32(s)?;
    let (s, size_bytes) = be_i64(s)?;
    let (s, offset_lag) = be_i64(s)?;
    let (s, is_future) = be_i8(s)?;
    Ok((
        s,
        LogDirPartition {
            partition: PartitionIndex(partition),
            size_bytes,
            offset_lag,
            is_future: is_future != 0,
        },
    ))
}

fn parse_log_dir_topic(s: NomBytes) -> nom::IResult<NomBytes, LogDirTopic> {
    let (s, name) = parse_string(s)?;
    let (s, partitions) = parse_array(parse_log_dir_partition)(s)?;
    Ok((s, LogDirTopic { name, partitions }))
}

fn parse_log_dir_result(s: NomBytes) -> nom::IResult<NomBytes, LogDirResult> {
    let (s, error) = parse_kafka_code(s)?;
    let (s, log_dir) = parse_string(s)?;
    let (s, topics) = parse_array(parse_log_dir_topic)(s)?;
    Ok((
        s,
        LogDirResult {
            error,
            log_dir,
            topics,
        },
    ))
}

impl KafkaResponse for DescribeLogDirsResponse {
    fn parse(payload: Bytes, _version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, throttle_time_ms) = be_i32(s)?;
            let (s, results) = parse_array(parse_log_dir_result)(s)?;
            Ok((
                s,
                DescribeLogDirsResponse {
                    throttle_time_ms,
                    results,
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
    fn test_all_topics_encodes_null_array() {
        let request = DescribeLogDirsRequest::all();
        let mut buf = Vec::new();
        request.encode_body(&mut buf, 0).unwrap();
        assert_eq!(buf, vec![0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_add_topic_partition_groups_and_dedupes() {
        let mut request = DescribeLogDirsRequest::default();
        request.add_topic_partition("t", PartitionIndex(0));
        request.add_topic_partition("t", PartitionIndex(0));
        request.add_topic_partition("t", PartitionIndex(1));
        let topics = request.topics.as_ref().unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].partitions.len(), 2);
    }

    #[test]
    fn test_framing() {
        let mut request = DescribeLogDirsRequest::default();
        request.add_topic_partition("events", PartitionIndex(2));
        let frame = encode_request(&request, 0, CorrelationId(1), "admin").unwrap();
        let declared = i32::from_be_bytes(frame[0..4].try_into().unwrap());
        assert_eq!(declared as usize, frame.len() - 4);
    }

    #[test]
    fn test_parse_response() {
        let mut buf = BytesMut::new();
        buf.put_i32(0); // throttle
        buf.put_i32(1); // results
        buf.put_i16(0); // error
        buf.put_i16(9);
        buf.put_slice(b"/data/log");
        buf.put_i32(1); // topics
        buf.put_i16(1);
        buf.put_slice(b"t");
        buf.put_i32(1); // partitions
        buf.put_i32(4);
        buf.put_i64(1 << 30);
        buf.put_i64(12);
        buf.put_i8(0);

        let response = DescribeLogDirsResponse::parse(buf.freeze(), 0).unwrap();
        let result = &response.results[0];
        assert_eq!(result.log_dir, "/data/log");
        let partition = &result.topics[0].partitions[0];
        assert_eq!(partition.partition, PartitionIndex(4));
        assert_eq!(partition.size_bytes, 1 << 30);
        assert!(!partition.is_future);
    }
}
