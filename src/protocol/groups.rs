//! Consumer-group pairs: FindCoordinator (API key 10), JoinGroup (11),
//! Heartbeat (12), LeaveGroup (13), SyncGroup (14), DescribeGroups (15),
//! and ListGroups (16).
//!
//! Two opaque blobs ride inside these messages and are defined here too:
//!
//! - [`ProtocolMetadata`]: what a member sends in JoinGroup to describe its
//!   subscriptions. The coordinator never looks inside; the group leader
//!   parses it when computing an assignment.
//! - [`MemberAssignment`]: what the leader hands back through SyncGroup,
//!   one blob per member.

use bytes::{BufMut, Bytes, BytesMut};
use nom::number::complete::{be_i16, be_i32};
use nombytes::NomBytes;

use super::{non_zero, ApiKey, KafkaRequest, KafkaResponse};
use crate::encode::Wire;
use crate::error::{Error, KafkaCode, Result};
use crate::parser::{
    parse_array, parse_bytes, parse_kafka_code, parse_nullable_bytes, parse_string, run_parser,
};
use crate::types::{GenerationId, PartitionIndex};

// ============================================================================
// FindCoordinator
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindCoordinatorRequest {
    pub group_id: String,
}

impl FindCoordinatorRequest {
    pub fn new(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
        }
    }
}

impl KafkaRequest for FindCoordinatorRequest {
    type Response = FindCoordinatorResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::FindCoordinator
    }

    fn body_len(&self, _version: i16) -> usize {
        self.group_id.wire_len()
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, _version: i16) -> Result<()> {
        self.group_id.encode(buffer)
    }
}

/// The broker coordinating a group: node id plus dial address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coordinator {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
}

impl Coordinator {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindCoordinatorResponse {
    pub error_code: KafkaCode,
    pub coordinator: Coordinator,
}

impl KafkaResponse for FindCoordinatorResponse {
    fn parse(payload: Bytes, _version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, error_code) = parse_kafka_code(s)?;
            let (s, node_id) = be_i32(s)?;
            let (s, host) = parse_string(s)?;
            let (s, port) = be_i32(s)?;
            Ok((
                s,
                FindCoordinatorResponse {
                    error_code,
                    coordinator: Coordinator {
                        node_id,
                        host,
                        port,
                    },
                },
            ))
        })
    }

    fn error(&self) -> Option<KafkaCode> {
        non_zero(self.error_code)
    }
}

// ============================================================================
// JoinGroup
// ============================================================================

/// One candidate protocol a member offers when joining: a strategy name
/// (e.g. `"range"`) plus its encoded [`ProtocolMetadata`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupProtocol {
    pub name: String,
    pub metadata: Bytes,
}

impl Wire for GroupProtocol {
    fn wire_len(&self) -> usize {
        self.name.wire_len() + self.metadata.wire_len()
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        self.name.encode(buffer)?;
        self.metadata.encode(buffer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinGroupRequest {
    pub group_id: String,
    pub session_timeout_ms: i32,
    /// v1+.
    pub rebalance_timeout_ms: i32,
    /// Empty on the first attempt; the coordinator assigns one.
    pub member_id: String,
    pub protocol_type: String,
    pub protocols: Vec<GroupProtocol>,
}

impl KafkaRequest for JoinGroupRequest {
    type Response = JoinGroupResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::JoinGroup
    }

    fn body_len(&self, version: i16) -> usize {
        self.group_id.wire_len()
            + 4
            + if version >= 1 { 4 } else { 0 }
            + self.member_id.wire_len()
            + self.protocol_type.wire_len()
            + self.protocols.wire_len()
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, version: i16) -> Result<()> {
        self.group_id.encode(buffer)?;
        self.session_timeout_ms.encode(buffer)?;
        if version >= 1 {
            self.rebalance_timeout_ms.encode(buffer)?;
        }
        self.member_id.encode(buffer)?;
        self.protocol_type.encode(buffer)?;
        self.protocols.encode(buffer)
    }
}

/// A member as reported in the JoinGroup response. Only the leader receives
/// a non-empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinGroupMember {
    pub member_id: String,
    /// The member's encoded [`ProtocolMetadata`].
    pub metadata: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinGroupResponse {
    pub error_code: KafkaCode,
    pub generation_id: GenerationId,
    /// The protocol the coordinator selected across all members.
    pub protocol_name: String,
    pub leader_id: String,
    pub member_id: String,
    pub members: Vec<JoinGroupMember>,
}

impl JoinGroupResponse {
    /// Whether this member was elected leader of the generation.
    pub fn is_leader(&self) -> bool {
        !self.leader_id.is_empty() && self.leader_id == self.member_id
    }
}

fn parse_join_member(s: NomBytes) -> nom::IResult<NomBytes, JoinGroupMember> {
    let (s, member_id) = parse_string(s)?;
    let (s, metadata) = parse_bytes(s)?;
    Ok((
        s,
        JoinGroupMember {
            member_id,
            metadata,
        },
    ))
}

impl KafkaResponse for JoinGroupResponse {
    fn parse(payload: Bytes, _version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, error_code) = parse_kafka_code(s)?;
            let (s, generation_id) = be_i32(s)?;
            let (s, protocol_name) = parse_string(s)?;
            let (s, leader_id) = parse_string(s)?;
            let (s, member_id) = parse_string(s)?;
            let (s, members) = parse_array(parse_join_member)(s)?;
            Ok((
                s,
                JoinGroupResponse {
                    error_code,
                    generation_id: GenerationId(generation_id),
                    protocol_name,
                    leader_id,
                    member_id,
                    members,
                },
            ))
        })
    }

    fn error(&self) -> Option<KafkaCode> {
        non_zero(self.error_code)
    }
}

// ============================================================================
// SyncGroup
// ============================================================================

/// One member's slot in the leader's SyncGroup payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberGroupAssignment {
    pub member_id: String,
    /// Encoded [`MemberAssignment`] blob.
    pub assignment: Bytes,
}

impl Wire for MemberGroupAssignment {
    fn wire_len(&self) -> usize {
        self.member_id.wire_len() + self.assignment.wire_len()
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        self.member_id.encode(buffer)?;
        self.assignment.encode(buffer)
    }
}

/// The full assignment the leader distributes: one entry per member.
/// Non-leaders send this empty.
pub type GroupAssignment = Vec<MemberGroupAssignment>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncGroupRequest {
    pub group_id: String,
    pub generation_id: GenerationId,
    pub member_id: String,
    pub assignments: GroupAssignment,
}

impl KafkaRequest for SyncGroupRequest {
    type Response = SyncGroupResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::SyncGroup
    }

    fn body_len(&self, _version: i16) -> usize {
        self.group_id.wire_len() + 4 + self.member_id.wire_len() + self.assignments.wire_len()
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, _version: i16) -> Result<()> {
        self.group_id.encode(buffer)?;
        self.generation_id.encode(buffer)?;
        self.member_id.encode(buffer)?;
        self.assignments.encode(buffer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncGroupResponse {
    pub error_code: KafkaCode,
    /// This member's encoded [`MemberAssignment`]; empty until the group is
    /// stable.
    pub assignment: Bytes,
}

impl KafkaResponse for SyncGroupResponse {
    fn parse(payload: Bytes, _version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, error_code) = parse_kafka_code(s)?;
            let (s, assignment) = parse_bytes(s)?;
            Ok((
                s,
                SyncGroupResponse {
                    error_code,
                    assignment,
                },
            ))
        })
    }

    fn error(&self) -> Option<KafkaCode> {
        non_zero(self.error_code)
    }
}

// ============================================================================
// Heartbeat / LeaveGroup
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatRequest {
    pub group_id: String,
    pub generation_id: GenerationId,
    pub member_id: String,
}

impl KafkaRequest for HeartbeatRequest {
    type Response = HeartbeatResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::Heartbeat
    }

    fn body_len(&self, _version: i16) -> usize {
        self.group_id.wire_len() + 4 + self.member_id.wire_len()
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, _version: i16) -> Result<()> {
        self.group_id.encode(buffer)?;
        self.generation_id.encode(buffer)?;
        self.member_id.encode(buffer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatResponse {
    pub error_code: KafkaCode,
}

impl KafkaResponse for HeartbeatResponse {
    fn parse(payload: Bytes, _version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, error_code) = parse_kafka_code(s)?;
            Ok((s, HeartbeatResponse { error_code }))
        })
    }

    fn error(&self) -> Option<KafkaCode> {
        non_zero(self.error_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaveGroupRequest {
    pub group_id: String,
    pub member_id: String,
}

impl KafkaRequest for LeaveGroupRequest {
    type Response = LeaveGroupResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::LeaveGroup
    }

    fn body_len(&self, _version: i16) -> usize {
        self.group_id.wire_len() + self.member_id.wire_len()
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, _version: i16) -> Result<()> {
        self.group_id.encode(buffer)?;
        self.member_id.encode(buffer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaveGroupResponse {
    pub error_code: KafkaCode,
}

impl KafkaResponse for LeaveGroupResponse {
    fn parse(payload: Bytes, _version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, error_code) = parse_kafka_code(s)?;
            Ok((s, LeaveGroupResponse { error_code }))
        })
    }

    fn error(&self) -> Option<KafkaCode> {
        non_zero(self.error_code)
    }
}

// ============================================================================
// ListGroups / DescribeGroups
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListGroupsRequest;

impl KafkaRequest for ListGroupsRequest {
    type Response = ListGroupsResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::ListGroups
    }

    fn body_len(&self, _version: i16) -> usize {
        0
    }

    fn encode_body<B: BufMut>(&self, _buffer: &mut B, _version: i16) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListedGroup {
    pub group_id: String,
    pub protocol_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListGroupsResponse {
    pub error_code: KafkaCode,
    pub groups: Vec<ListedGroup>,
}

fn parse_listed_group(s: NomBytes) -> nom::IResult<NomBytes, ListedGroup> {
    let (s, group_id) = parse_string(s)?;
    let (s, protocol_type) = parse_string(s)?;
    Ok((
        s,
        ListedGroup {
            group_id,
            protocol_type,
        },
    ))
}

impl KafkaResponse for ListGroupsResponse {
    fn parse(payload: Bytes, _version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, error_code) = parse_kafka_code(s)?;
            let (s, groups) = parse_array(parse_listed_group)(s)?;
            Ok((s, ListGroupsResponse { error_code, groups }))
        })
    }

    fn error(&self) -> Option<KafkaCode> {
        non_zero(self.error_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeGroupsRequest {
    pub group_ids: Vec<String>,
}

impl KafkaRequest for DescribeGroupsRequest {
    type Response = DescribeGroupsResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::DescribeGroups
    }

    fn body_len(&self, _version: i16) -> usize {
        self.group_ids.wire_len()
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, _version: i16) -> Result<()> {
        self.group_ids.encode(buffer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribedMember {
    pub member_id: String,
    pub client_id: String,
    pub client_host: String,
    /// Encoded [`ProtocolMetadata`].
    pub metadata: Bytes,
    /// Encoded [`MemberAssignment`].
    pub assignment: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribedGroup {
    pub error_code: KafkaCode,
    pub group_id: String,
    pub state: String,
    pub protocol_type: String,
    pub protocol: String,
    pub members: Vec<DescribedMember>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeGroupsResponse {
    pub groups: Vec<DescribedGroup>,
}

fn parse_described_member(s: NomBytes) -> nom::IResult<NomBytes, DescribedMember> {
    let (s, member_id) = parse_string(s)?;
    let (s, client_id) = parse_string(s)?;
    let (s, client_host) = parse_string(s)?;
    let (s, metadata) = parse_bytes(s)?;
    let (s, assignment) = parse_bytes(s)?;
    Ok((
        s,
        DescribedMember {
            member_id,
            client_id,
            client_host,
            metadata,
            assignment,
        },
    ))
}

fn parse_described_group(s: NomBytes) -> nom::IResult<NomBytes, DescribedGroup> {
    let (s, error_code) = parse_kafka_code(s)?;
    let (s, group_id) = parse_string(s)?;
    let (s, state) = parse_string(s)?;
    let (s, protocol_type) = parse_string(s)?;
    let (s, protocol) = parse_string(s)?;
    let (s, members) = parse_array(parse_described_member)(s)?;
    Ok((
        s,
        DescribedGroup {
            error_code,
            group_id,
            state,
            protocol_type,
            protocol,
            members,
        },
    ))
}

impl KafkaResponse for DescribeGroupsResponse {
    fn parse(payload: Bytes, _version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, groups) = parse_array(parse_described_group)(s)?;
            Ok((s, DescribeGroupsResponse { groups }))
        })
    }
}

// ============================================================================
// Subscription and assignment blobs
// ============================================================================

/// Subscription metadata carried opaquely through JoinGroup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolMetadata {
    pub version: i16,
    pub subscription: Vec<String>,
    pub user_data: Option<Bytes>,
}

impl ProtocolMetadata {
    pub fn new(subscription: Vec<String>) -> Self {
        Self {
            version: 0,
            subscription,
            user_data: None,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let len = 2 + self.subscription.wire_len() + self.user_data.wire_len();
        let mut buffer = BytesMut::with_capacity(len);
        // Wire writes into a BytesMut never fail.
        self.version.encode(&mut buffer).expect("buffer write");
        self.subscription.encode(&mut buffer).expect("buffer write");
        self.user_data.encode(&mut buffer).expect("buffer write");
        buffer.freeze()
    }

    pub fn from_bytes(payload: Bytes) -> Result<Self> {
        if payload.is_empty() {
            return Err(Error::Parsing(payload));
        }
        run_parser(payload, |s| {
            let (s, version) = be_i16(s)?;
            let (s, subscription) = parse_array(parse_string)(s)?;
            let (s, user_data) = parse_nullable_bytes(s)?;
            Ok((
                s,
                ProtocolMetadata {
                    version,
                    subscription,
                    user_data,
                },
            ))
        })
    }
}

/// One topic's partitions inside a [`MemberAssignment`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionAssignment {
    pub topic: String,
    pub partitions: Vec<PartitionIndex>,
}

impl Wire for PartitionAssignment {
    fn wire_len(&self) -> usize {
        self.topic.wire_len() + self.partitions.wire_len()
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        self.topic.encode(buffer)?;
        self.partitions.encode(buffer)
    }
}

/// The per-member assignment blob distributed through SyncGroup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberAssignment {
    pub version: i16,
    pub partition_assignments: Vec<PartitionAssignment>,
    pub user_data: Option<Bytes>,
}

impl MemberAssignment {
    /// The assigned partitions for one topic, if any.
    pub fn partitions_for(&self, topic: &str) -> Option<&[PartitionIndex]> {
        self.partition_assignments
            .iter()
            .find(|p| p.topic == topic)
            .map(|p| p.partitions.as_slice())
    }

    pub fn to_bytes(&self) -> Bytes {
        let len = 2 + self.partition_assignments.wire_len() + self.user_data.wire_len();
        let mut buffer = BytesMut::with_capacity(len);
        self.version.encode(&mut buffer).expect("buffer write");
        self.partition_assignments
            .encode(&mut buffer)
            .expect("buffer write");
        self.user_data.encode(&mut buffer).expect("buffer write");
        buffer.freeze()
    }

    pub fn from_bytes(payload: Bytes) -> Result<Self> {
        if payload.is_empty() {
            return Err(Error::Parsing(payload));
        }
        run_parser(payload, |s| {
            let (s, version) = be_i16(s)?;
            let (s, partition_assignments) = parse_array(parse_partition_assignment)(s)?;
            // Some writers truncate the blob after the assignments.
            let (s, user_data) = if s.clone().into_bytes().is_empty() {
                (s, None)
            } else {
                parse_nullable_bytes(s)?
            };
            Ok((
                s,
                MemberAssignment {
                    version,
                    partition_assignments,
                    user_data,
                },
            ))
        })
    }
}

fn parse_partition_index(s: NomBytes) -> nom::IResult<NomBytes, PartitionIndex> {
    let (s, raw) = be_i32(s)?;
    Ok((s, PartitionIndex(raw)))
}

fn parse_partition_assignment(s: NomBytes) -> nom::IResult<NomBytes, PartitionAssignment> {
    let (s, topic) = parse_string(s)?;
    let (s, partitions) = parse_array(parse_partition_index)(s)?;
    Ok((s, PartitionAssignment { topic, partitions }))
}
