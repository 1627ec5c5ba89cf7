//! Wire protocol requests & responses.
//!
//! This module implements the client side of the bytecode protocol outlined
//! in the [Kafka Documentation](https://kafka.apache.org/protocol.html):
//! one encoder per request kind and one decoder per response kind, both
//! parameterized by the negotiated API version. Fields introduced at a
//! later version than the one being encoded are omitted from the wire.
//!
//! Message pairs are grouped by API family, one file each. The pairing is
//! expressed through [`KafkaRequest::Response`], so the decoder for an
//! exchange is selected statically by the request type and runs at the same
//! version the request was encoded with.

pub mod api_versions;
pub mod fetch;
pub mod groups;
pub mod log_dirs;
pub mod metadata;
pub mod offsets;
pub mod produce;
pub mod sasl;
pub mod versions;

use bytes::{BufMut, Bytes, BytesMut};
use nom::number::complete::be_i32;
use nombytes::NomBytes;

use crate::constants::FRAME_HEADER_SIZE;
use crate::encode::Wire;
use crate::error::{KafkaCode, Result};
use crate::types::CorrelationId;

// re exporting the message pairs for ease
pub use self::{
    api_versions::{ApiVersionsRequest, ApiVersionsResponse},
    fetch::{FetchPartition, FetchRequest, FetchResponse, FetchTopic},
    groups::{
        DescribeGroupsRequest, DescribeGroupsResponse, FindCoordinatorRequest,
        FindCoordinatorResponse, GroupAssignment, GroupProtocol, HeartbeatRequest,
        HeartbeatResponse, JoinGroupMember, JoinGroupRequest, JoinGroupResponse,
        LeaveGroupRequest, LeaveGroupResponse, ListGroupsRequest, ListGroupsResponse,
        MemberAssignment, MemberGroupAssignment, PartitionAssignment, ProtocolMetadata,
        SyncGroupRequest, SyncGroupResponse,
    },
    log_dirs::{DescribeLogDirsRequest, DescribeLogDirsResponse},
    metadata::{BrokerInfo, MetadataRequest, MetadataResponse, PartitionMetadata, TopicMetadata},
    offsets::{
        ListOffsetsRequest, ListOffsetsResponse, OffsetCommitRequest, OffsetCommitResponse,
        OffsetFetchRequest, OffsetFetchResponse,
    },
    produce::{ProduceRequest, ProduceResponse},
    sasl::{
        SaslAuthenticateRequest, SaslAuthenticateResponse, SaslHandshakeRequest,
        SaslHandshakeResponse, SaslMechanism,
    },
    versions::{pick_version, ApiVersionRange},
};

/// API keys for the Kafka protocol operations this client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiKey {
    Produce,
    Fetch,
    ListOffsets,
    Metadata,
    OffsetCommit,
    OffsetFetch,
    FindCoordinator,
    JoinGroup,
    Heartbeat,
    LeaveGroup,
    SyncGroup,
    DescribeGroups,
    ListGroups,
    SaslHandshake,
    ApiVersions,
    DescribeLogDirs,
    SaslAuthenticate,
    Unknown(i16),
}

impl From<i16> for ApiKey {
    fn from(value: i16) -> Self {
        match value {
            0 => ApiKey::Produce,
            1 => ApiKey::Fetch,
            2 => ApiKey::ListOffsets,
            3 => ApiKey::Metadata,
            8 => ApiKey::OffsetCommit,
            9 => ApiKey::OffsetFetch,
            10 => ApiKey::FindCoordinator,
            11 => ApiKey::JoinGroup,
            12 => ApiKey::Heartbeat,
            13 => ApiKey::LeaveGroup,
            14 => ApiKey::SyncGroup,
            15 => ApiKey::DescribeGroups,
            16 => ApiKey::ListGroups,
            17 => ApiKey::SaslHandshake,
            18 => ApiKey::ApiVersions,
            35 => ApiKey::DescribeLogDirs,
            36 => ApiKey::SaslAuthenticate,
            n => ApiKey::Unknown(n),
        }
    }
}

impl From<ApiKey> for i16 {
    fn from(key: ApiKey) -> Self {
        match key {
            ApiKey::Produce => 0,
            ApiKey::Fetch => 1,
            ApiKey::ListOffsets => 2,
            ApiKey::Metadata => 3,
            ApiKey::OffsetCommit => 8,
            ApiKey::OffsetFetch => 9,
            ApiKey::FindCoordinator => 10,
            ApiKey::JoinGroup => 11,
            ApiKey::Heartbeat => 12,
            ApiKey::LeaveGroup => 13,
            ApiKey::SyncGroup => 14,
            ApiKey::DescribeGroups => 15,
            ApiKey::ListGroups => 16,
            ApiKey::SaslHandshake => 17,
            ApiKey::ApiVersions => 18,
            ApiKey::DescribeLogDirs => 35,
            ApiKey::SaslAuthenticate => 36,
            ApiKey::Unknown(n) => n,
        }
    }
}

impl ApiKey {
    /// Static name for logging, avoiding an allocation per request.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKey::Produce => "Produce",
            ApiKey::Fetch => "Fetch",
            ApiKey::ListOffsets => "ListOffsets",
            ApiKey::Metadata => "Metadata",
            ApiKey::OffsetCommit => "OffsetCommit",
            ApiKey::OffsetFetch => "OffsetFetch",
            ApiKey::FindCoordinator => "FindCoordinator",
            ApiKey::JoinGroup => "JoinGroup",
            ApiKey::Heartbeat => "Heartbeat",
            ApiKey::LeaveGroup => "LeaveGroup",
            ApiKey::SyncGroup => "SyncGroup",
            ApiKey::DescribeGroups => "DescribeGroups",
            ApiKey::ListGroups => "ListGroups",
            ApiKey::SaslHandshake => "SaslHandshake",
            ApiKey::ApiVersions => "ApiVersions",
            ApiKey::DescribeLogDirs => "DescribeLogDirs",
            ApiKey::SaslAuthenticate => "SaslAuthenticate",
            ApiKey::Unknown(_) => "Unknown",
        }
    }
}

/// The common request header prepended to every request.
///
/// Wire layout: `api_key: i16 | api_version: i16 | correlation_id: i32 |
/// client_id: STRING`.
#[derive(Debug, Clone)]
pub struct RequestHeader {
    pub api_key: ApiKey,
    pub api_version: i16,
    pub correlation_id: CorrelationId,
    pub client_id: String,
}

impl Wire for RequestHeader {
    fn wire_len(&self) -> usize {
        2 + 2 + 4 + self.client_id.wire_len()
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        i16::from(self.api_key).encode(buffer)?;
        self.api_version.encode(buffer)?;
        self.correlation_id.encode(buffer)?;
        self.client_id.encode(buffer)?;
        Ok(())
    }
}

/// The common response header: just the echoed correlation id.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub correlation_id: CorrelationId,
}

pub fn parse_response_header(s: NomBytes) -> nom::IResult<NomBytes, ResponseHeader> {
    let (s, correlation_id) = be_i32(s)?;
    Ok((
        s,
        ResponseHeader {
            correlation_id: CorrelationId(correlation_id),
        },
    ))
}

/// A request the client can send to a broker.
///
/// Implementations encode only the body; the frame length prefix and the
/// [`RequestHeader`] are added by [`encode_request`].
pub trait KafkaRequest {
    /// The response type decoded for this request.
    type Response: KafkaResponse;

    fn api_key(&self) -> ApiKey;

    /// Exact encoded body size at `version`, for up-front frame sizing.
    fn body_len(&self, version: i16) -> usize;

    fn encode_body<B: BufMut>(&self, buffer: &mut B, version: i16) -> Result<()>;
}

/// A response decoded from a broker.
pub trait KafkaResponse: Sized {
    /// Parse the response body. `payload` starts after the frame length and
    /// the response header have been stripped.
    fn parse(payload: Bytes, version: i16) -> Result<Self>;

    /// The top-level error code, for responses that carry one. Responses
    /// with only per-topic or per-partition errors return `None` here and
    /// callers inspect those directly.
    fn error(&self) -> Option<KafkaCode> {
        None
    }
}

/// Serialize a complete request frame: `i32 size | header | body`.
///
/// The buffer is sized exactly from [`Wire::wire_len`] and
/// [`KafkaRequest::body_len`], so encoding never reallocates.
pub fn encode_request<R: KafkaRequest>(
    request: &R,
    version: i16,
    correlation_id: CorrelationId,
    client_id: &str,
) -> Result<Bytes> {
    let header = RequestHeader {
        api_key: request.api_key(),
        api_version: version,
        correlation_id,
        client_id: client_id.to_string(),
    };
    let total = header.wire_len() + request.body_len(version);

    let mut buffer = BytesMut::with_capacity(FRAME_HEADER_SIZE + total);
    (total as i32).encode(&mut buffer)?;
    header.encode(&mut buffer)?;
    request.encode_body(&mut buffer, version)?;

    debug_assert_eq!(buffer.len(), FRAME_HEADER_SIZE + total);
    Ok(buffer.freeze())
}

/// Convert a non-`None` error code into `Some` for [`KafkaResponse::error`]
/// implementations.
pub(crate) fn non_zero(code: KafkaCode) -> Option<KafkaCode> {
    if code == KafkaCode::None {
        None
    } else {
        Some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_round_trip() {
        for raw in [0i16, 1, 2, 3, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 35, 36] {
            let key = ApiKey::from(raw);
            assert_eq!(i16::from(key), raw);
            assert_ne!(key.as_str(), "Unknown");
        }
        assert_eq!(ApiKey::from(99), ApiKey::Unknown(99));
        assert_eq!(i16::from(ApiKey::Unknown(99)), 99);
    }

    #[test]
    fn test_request_header_encoding() {
        let header = RequestHeader {
            api_key: ApiKey::Metadata,
            api_version: 5,
            correlation_id: CorrelationId(7),
            client_id: "cli".to_string(),
        };
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        assert_eq!(
            buf,
            vec![
                0x00, 0x03, // api_key
                0x00, 0x05, // api_version
                0x00, 0x00, 0x00, 0x07, // correlation_id
                0x00, 0x03, b'c', b'l', b'i', // client_id
            ]
        );
        assert_eq!(header.wire_len(), buf.len());
    }

    #[test]
    fn test_parse_response_header() {
        let data = NomBytes::new(Bytes::from(42i32.to_be_bytes().to_vec()));
        let (_, header) = parse_response_header(data).unwrap();
        assert_eq!(header.correlation_id, CorrelationId(42));
    }

    #[test]
    fn test_encode_request_frame_length() {
        let request = groups::HeartbeatRequest {
            group_id: "g".to_string(),
            generation_id: crate::types::GenerationId(3),
            member_id: "m".to_string(),
        };
        let frame = encode_request(&request, 0, CorrelationId(1), "test").unwrap();
        let declared = i32::from_be_bytes(frame[0..4].try_into().unwrap());
        assert_eq!(declared as usize, frame.len() - 4);
    }
}
