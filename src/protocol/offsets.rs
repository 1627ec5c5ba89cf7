//! Offset management pairs: ListOffsets (API key 2), OffsetCommit (8), and
//! OffsetFetch (9).
//!
//! ListOffsets resolves log boundaries (or timestamps) to offsets on the
//! partition leader. OffsetCommit/OffsetFetch store and read group offsets
//! through the group coordinator; OffsetFetch v0 and v1 are identical on
//! the wire, but v0 reads ZooKeeper-era offsets while v1 reads offsets
//! committed to Kafka, so v1 is the version this client prefers.

use bytes::{BufMut, Bytes};
use nom::number::complete::{be_i32, be_i64};
use nombytes::NomBytes;

use super::{ApiKey, KafkaRequest, KafkaResponse};
use crate::encode::Wire;
use crate::error::{KafkaCode, Result};
use crate::parser::{
    parse_array, parse_kafka_code, parse_nullable_string, parse_string, run_parser,
};
use crate::types::{Offset, PartitionIndex};

// ============================================================================
// ListOffsets
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOffsetsPartition {
    pub partition: PartitionIndex,
    /// A timestamp in ms, or `Offset::LATEST` / `Offset::EARLIEST` as i64
    /// sentinels (-1 / -2).
    pub timestamp_ms: i64,
    /// v0 only: how many offsets to return.
    pub max_num_offsets: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOffsetsTopic {
    pub name: String,
    pub partitions: Vec<ListOffsetsPartition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOffsetsRequest {
    pub replica_id: i32,
    pub topics: Vec<ListOffsetsTopic>,
}

impl ListOffsetsRequest {
    pub fn new() -> Self {
        Self {
            replica_id: -1,
            topics: Vec::new(),
        }
    }

    pub fn add_partition(&mut self, topic: &str, partition: PartitionIndex, timestamp_ms: i64) {
        let block = ListOffsetsPartition {
            partition,
            timestamp_ms,
            max_num_offsets: 1,
        };
        match self.topics.iter_mut().find(|t| t.name == topic) {
            Some(t) => t.partitions.push(block),
            None => self.topics.push(ListOffsetsTopic {
                name: topic.to_string(),
                partitions: vec![block],
            }),
        }
    }
}

impl KafkaRequest for ListOffsetsRequest {
    type Response = ListOffsetsResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::ListOffsets
    }

    fn body_len(&self, version: i16) -> usize {
        let per_partition = if version >= 1 { 4 + 8 } else { 4 + 8 + 4 };
        let mut len = 4 + 4;
        for topic in &self.topics {
            len += topic.name.wire_len() + 4 + topic.partitions.len() * per_partition;
        }
        len
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, version: i16) -> Result<()> {
        self.replica_id.encode(buffer)?;
        (self.topics.len() as i32).encode(buffer)?;
        for topic in &self.topics {
            topic.name.encode(buffer)?;
            (topic.partitions.len() as i32).encode(buffer)?;
            for block in &topic.partitions {
                block.partition.encode(buffer)?;
                block.timestamp_ms.encode(buffer)?;
                if version == 0 {
                    block.max_num_offsets.encode(buffer)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOffsetsPartitionResponse {
    pub partition: PartitionIndex,
    pub error: KafkaCode,
    /// v1+; -1 below that.
    pub timestamp_ms: i64,
    /// v0 returns a list; v1 exactly one. Kept as a list either way.
    pub offsets: Vec<Offset>,
}

impl ListOffsetsPartitionResponse {
    /// The resolved offset, when one was returned.
    pub fn offset(&self) -> Option<Offset> {
        self.offsets.first().copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOffsetsTopicResponse {
    pub name: String,
    pub partitions: Vec<ListOffsetsPartitionResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOffsetsResponse {
    pub topics: Vec<ListOffsetsTopicResponse>,
}

fn parse_offset(s: NomBytes) -> nom::IResult<NomBytes, Offset> {
    let (s, raw) = be_i64(s)?;
    Ok((s, Offset(raw)))
}

fn parse_list_offsets_partition(
    version: i16,
) -> impl Fn(NomBytes) -> nom::IResult<NomBytes, ListOffsetsPartitionResponse> + Copy {
    move |s| {
        let (s, partition) = be_i32(s)?;
        let (s, error) = parse_kafka_code(s)?;
        if version >= 1 {
            let (s, timestamp_ms) = be_i64(s)?;
            let (s, offset) = be_i64(s)?;
            Ok((
                s,
                ListOffsetsPartitionResponse {
                    partition: PartitionIndex(partition),
                    error,
                    timestamp_ms,
                    offsets: vec![Offset(offset)],
                },
            ))
        } else {
            let (s, offsets) = parse_array(parse_offset)(s)?;
            Ok((
                s,
                ListOffsetsPartitionResponse {
                    partition: PartitionIndex(partition),
                    error,
                    timestamp_ms: -1,
                    offsets,
                },
            ))
        }
    }
}

fn parse_list_offsets_topic(
    version: i16,
) -> impl Fn(NomBytes) -> nom::IResult<NomBytes, ListOffsetsTopicResponse> + Copy {
    move |s| {
        let (s, name) = parse_string(s)?;
        let (s, partitions) = parse_array(parse_list_offsets_partition(version))(s)?;
        Ok((s, ListOffsetsTopicResponse { name, partitions }))
    }
}

impl KafkaResponse for ListOffsetsResponse {
    fn parse(payload: Bytes, version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, topics) = parse_array(parse_list_offsets_topic(version))(s)?;
            Ok((s, ListOffsetsResponse { topics }))
        })
    }
}

// ============================================================================
// OffsetCommit
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetCommitPartition {
    pub partition: PartitionIndex,
    pub offset: Offset,
    /// v1 only.
    pub timestamp_ms: i64,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetCommitTopic {
    pub name: String,
    pub partitions: Vec<OffsetCommitPartition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetCommitRequest {
    pub group_id: String,
    /// v1+.
    pub generation_id: i32,
    /// v1+.
    pub member_id: String,
    /// v2+; -1 keeps the broker default.
    pub retention_time_ms: i64,
    pub topics: Vec<OffsetCommitTopic>,
}

impl OffsetCommitRequest {
    pub fn new(group_id: &str, generation_id: i32, member_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            generation_id,
            member_id: member_id.to_string(),
            retention_time_ms: -1,
            topics: Vec::new(),
        }
    }

    pub fn add_partition(&mut self, topic: &str, partition: PartitionIndex, offset: Offset) {
        let block = OffsetCommitPartition {
            partition,
            offset,
            timestamp_ms: -1,
            metadata: None,
        };
        match self.topics.iter_mut().find(|t| t.name == topic) {
            Some(t) => t.partitions.push(block),
            None => self.topics.push(OffsetCommitTopic {
                name: topic.to_string(),
                partitions: vec![block],
            }),
        }
    }
}

impl KafkaRequest for OffsetCommitRequest {
    type Response = OffsetCommitResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::OffsetCommit
    }

    fn body_len(&self, version: i16) -> usize {
        let mut len = self.group_id.wire_len();
        if version >= 1 {
            len += 4 + self.member_id.wire_len();
        }
        if version >= 2 {
            len += 8;
        }
        len += 4;
        for topic in &self.topics {
            len += topic.name.wire_len() + 4;
            for block in &topic.partitions {
                len += 4 + 8 + block.metadata.wire_len();
                if version == 1 {
                    len += 8;
                }
            }
        }
        len
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, version: i16) -> Result<()> {
        self.group_id.encode(buffer)?;
        if version >= 1 {
            self.generation_id.encode(buffer)?;
            self.member_id.encode(buffer)?;
        }
        if version >= 2 {
            self.retention_time_ms.encode(buffer)?;
        }
        (self.topics.len() as i32).encode(buffer)?;
        for topic in &self.topics {
            topic.name.encode(buffer)?;
            (topic.partitions.len() as i32).encode(buffer)?;
            for block in &topic.partitions {
                block.partition.encode(buffer)?;
                block.offset.encode(buffer)?;
                if version == 1 {
                    block.timestamp_ms.encode(buffer)?;
                }
                block.metadata.encode(buffer)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetCommitPartitionResponse {
    pub partition: PartitionIndex,
    pub error: KafkaCode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetCommitTopicResponse {
    pub name: String,
    pub partitions: Vec<OffsetCommitPartitionResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetCommitResponse {
    pub topics: Vec<OffsetCommitTopicResponse>,
}

impl OffsetCommitResponse {
    /// The first non-zero per-partition error, if any commit failed.
    pub fn first_error(&self) -> Option<KafkaCode> {
        self.topics
            .iter()
            .flat_map(|t| &t.partitions)
            .find(|p| p.error != KafkaCode::None)
            .map(|p| p.error)
    }
}

fn parse_commit_partition(s: NomBytes) -> nom::IResult<NomBytes, OffsetCommitPartitionResponse> {
    let (s, partition) = be_i32(s)?;
    let (s, error) = parse_kafka_code(s)?;
    Ok((
        s,
        OffsetCommitPartitionResponse {
            partition: PartitionIndex(partition),
            error,
        },
    ))
}

fn parse_commit_topic(s: NomBytes) -> nom::IResult<NomBytes, OffsetCommitTopicResponse> {
    let (s, name) = parse_string(s)?;
    let (s, partitions) = parse_array(parse_commit_partition)(s)?;
    Ok((s, OffsetCommitTopicResponse { name, partitions }))
}

impl KafkaResponse for OffsetCommitResponse {
    fn parse(payload: Bytes, _version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, topics) = parse_array(parse_commit_topic)(s)?;
            Ok((s, OffsetCommitResponse { topics }))
        })
    }
}

// ============================================================================
// OffsetFetch
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetFetchTopic {
    pub name: String,
    pub partitions: Vec<PartitionIndex>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetFetchRequest {
    pub group_id: String,
    pub topics: Vec<OffsetFetchTopic>,
}

impl OffsetFetchRequest {
    pub fn new(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            topics: Vec::new(),
        }
    }

    /// Add one partition, deduplicating repeats.
    pub fn add_partition(&mut self, topic: &str, partition: PartitionIndex) {
        let entry = match self.topics.iter_mut().find(|t| t.name == topic) {
            Some(t) => t,
            None => {
                self.topics.push(OffsetFetchTopic {
                    name: topic.to_string(),
                    partitions: Vec::new(),
                });
                self.topics.last_mut().expect("just pushed")
            }
        };
        if !entry.partitions.contains(&partition) {
            entry.partitions.push(partition);
        }
    }
}

impl KafkaRequest for OffsetFetchRequest {
    type Response = OffsetFetchResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::OffsetFetch
    }

    // v0 and v1 are identical on the wire.
    fn body_len(&self, _version: i16) -> usize {
        let mut len = self.group_id.wire_len() + 4;
        for topic in &self.topics {
            len += topic.name.wire_len() + topic.partitions.wire_len();
        }
        len
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, _version: i16) -> Result<()> {
        self.group_id.encode(buffer)?;
        (self.topics.len() as i32).encode(buffer)?;
        for topic in &self.topics {
            topic.name.encode(buffer)?;
            topic.partitions.encode(buffer)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetFetchPartitionResponse {
    pub partition: PartitionIndex,
    /// `Offset::LATEST` (-1) when the group has no committed offset.
    pub offset: Offset,
    pub metadata: Option<String>,
    pub error: KafkaCode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetFetchTopicResponse {
    pub name: String,
    pub partitions: Vec<OffsetFetchPartitionResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetFetchResponse {
    pub topics: Vec<OffsetFetchTopicResponse>,
}

fn parse_fetch_partition(s: NomBytes) -> nom::IResult<NomBytes, OffsetFetchPartitionResponse> {
    let (s, partition) = be_i32(s)?;
    let (s, offset) = be_i64(s)?;
    let (s, metadata) = parse_nullable_string(s)?;
    let (s, error) = parse_kafka_code(s)?;
    Ok((
        s,
        OffsetFetchPartitionResponse {
            partition: PartitionIndex(partition),
            offset: Offset(offset),
            metadata,
            error,
        },
    ))
}

fn parse_fetch_topic(s: NomBytes) -> nom::IResult<NomBytes, OffsetFetchTopicResponse> {
    let (s, name) = parse_string(s)?;
    let (s, partitions) = parse_array(parse_fetch_partition)(s)?;
    Ok((s, OffsetFetchTopicResponse { name, partitions }))
}

impl KafkaResponse for OffsetFetchResponse {
    fn parse(payload: Bytes, _version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, topics) = parse_array(parse_fetch_topic)(s)?;
            Ok((s, OffsetFetchResponse { topics }))
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
    fn test_list_offsets_frame_length() {
        let mut request = ListOffsetsRequest::new();
        request.add_partition("t", PartitionIndex(0), Offset::LATEST.value());
        for version in [0, 1] {
            let frame = encode_request(&request, version, CorrelationId(1), "c").unwrap();
            let declared = i32::from_be_bytes(frame[0..4].try_into().unwrap());
            assert_eq!(declared as usize, frame.len() - 4, "version {version}");
        }
    }

    #[test]
    fn test_list_offsets_v0_includes_max_num_offsets() {
        let mut request = ListOffsetsRequest::new();
        request.add_partition("t", PartitionIndex(0), -1);
        assert_eq!(request.body_len(0), request.body_len(1) + 4);
    }

    #[test]
    fn test_list_offsets_parse_v1() {
        let mut buf = BytesMut::new();
        buf.put_i32(1);
        buf.put_i16(1);
        buf.put_slice(b"t");
        buf.put_i32(1);
        buf.put_i32(0); // partition
        buf.put_i16(0); // error
        buf.put_i64(-1); // timestamp
        buf.put_i64(900); // offset
        let response = ListOffsetsResponse::parse(buf.freeze(), 1).unwrap();
        let partition = &response.topics[0].partitions[0];
        assert_eq!(partition.offset(), Some(Offset(900)));
    }

    #[test]
    fn test_list_offsets_parse_v0_offset_list() {
        let mut buf = BytesMut::new();
        buf.put_i32(1);
        buf.put_i16(1);
        buf.put_slice(b"t");
        buf.put_i32(1);
        buf.put_i32(3);
        buf.put_i16(0);
        buf.put_i32(2); // two offsets
        buf.put_i64(10);
        buf.put_i64(0);
        let response = ListOffsetsResponse::parse(buf.freeze(), 0).unwrap();
        let partition = &response.topics[0].partitions[0];
        assert_eq!(partition.offsets, vec![Offset(10), Offset(0)]);
        assert_eq!(partition.timestamp_ms, -1);
    }

    #[test]
    fn test_offset_commit_version_gates() {
        let mut request = OffsetCommitRequest::new("g", 5, "m-1");
        request.add_partition("t", PartitionIndex(0), Offset(10));
        // v1 adds generation+member and the per-partition timestamp;
        // v2 swaps the timestamp for a request-level retention time.
        let v0 = request.body_len(0);
        let v1 = request.body_len(1);
        let v2 = request.body_len(2);
        assert_eq!(v1, v0 + 4 + (2 + 3) + 8);
        assert_eq!(v2, v1 - 8 + 8);
        for version in [0, 1, 2] {
            let frame = encode_request(&request, version, CorrelationId(2), "c").unwrap();
            let declared = i32::from_be_bytes(frame[0..4].try_into().unwrap());
            assert_eq!(declared as usize, frame.len() - 4, "version {version}");
        }
    }

    #[test]
    fn test_offset_commit_parse_response() {
        let mut buf = BytesMut::new();
        buf.put_i32(1);
        buf.put_i16(1);
        buf.put_slice(b"t");
        buf.put_i32(2);
        buf.put_i32(0);
        buf.put_i16(0);
        buf.put_i32(1);
        buf.put_i16(KafkaCode::IllegalGeneration as i16);
        let response = OffsetCommitResponse::parse(buf.freeze(), 2).unwrap();
        assert_eq!(response.first_error(), Some(KafkaCode::IllegalGeneration));
    }

    #[test]
    fn test_offset_fetch_dedupes_partitions() {
        let mut request = OffsetFetchRequest::new("g");
        request.add_partition("t", PartitionIndex(1));
        request.add_partition("t", PartitionIndex(1));
        request.add_partition("t", PartitionIndex(2));
        assert_eq!(request.topics[0].partitions.len(), 2);
    }

    #[test]
    fn test_offset_fetch_round_trip_framing() {
        let mut request = OffsetFetchRequest::new("g");
        request.add_partition("t", PartitionIndex(0));
        let frame = encode_request(&request, 1, CorrelationId(3), "c").unwrap();
        let declared = i32::from_be_bytes(frame[0..4].try_into().unwrap());
        assert_eq!(declared as usize, frame.len() - 4);
    }

    #[test]
    fn test_offset_fetch_parse_no_committed_offset() {
        let mut buf = BytesMut::new();
        buf.put_i32(1);
        buf.put_i16(1);
        buf.put_slice(b"t");
        buf.put_i32(1);
        buf.put_i32(0);
        buf.put_i64(-1); // no committed offset
        buf.put_i16(-1); // null metadata
        buf.put_i16(0); // error
        let response = OffsetFetchResponse::parse(buf.freeze(), 1).unwrap();
        let partition = &response.topics[0].partitions[0];
        assert_eq!(partition.offset, Offset::LATEST);
        assert!(!partition.offset.is_valid());
        assert_eq!(partition.metadata, None);
    }
}
