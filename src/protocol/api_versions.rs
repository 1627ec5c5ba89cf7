//! ApiVersions request/response pair (API key 18).
//!
//! Sent as the first exchange on every new connection, before the broker's
//! version table is known, so it always goes out at version 0. The response
//! seeds version negotiation for everything that follows.

use bytes::{BufMut, Bytes};
use nom::number::complete::{be_i16, be_i32};
use nombytes::NomBytes;

use super::{non_zero, ApiKey, ApiVersionRange, KafkaRequest, KafkaResponse};
use crate::error::{Error, KafkaCode, Result};
use crate::parser::{parse_array, parse_kafka_code, run_parser};

/// ApiVersions request. The body is empty at both supported versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiVersionsRequest;

impl ApiVersionsRequest {
    /// Highest wire version this pair implements.
    pub const MAX_VERSION: i16 = 1;

    /// Validate an externally supplied version before use.
    pub fn check_version(version: i16) -> Result<()> {
        if (0..=Self::MAX_VERSION).contains(&version) {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "unsupported ApiVersions version {version}"
            )))
        }
    }
}

impl KafkaRequest for ApiVersionsRequest {
    type Response = ApiVersionsResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::ApiVersions
    }

    fn body_len(&self, _version: i16) -> usize {
        0
    }

    fn encode_body<B: BufMut>(&self, _buffer: &mut B, version: i16) -> Result<()> {
        Self::check_version(version)
    }
}

/// ApiVersions response: the broker's supported version range per API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiVersionsResponse {
    pub error_code: KafkaCode,
    pub api_versions: Vec<ApiVersionRange>,
    /// v1+; zero below that.
    pub throttle_time_ms: i32,
}

fn parse_version_range(s: NomBytes) -> nom::IResult<NomBytes, ApiVersionRange> {
    let (s, api_key) = be_i16(s)?;
    let (s, min_version) = be_i16(s)?;
    let (s, max_version) = be_i16(s)?;
    Ok((
        s,
        ApiVersionRange::new(ApiKey::from(api_key), min_version, max_version),
    ))
}

impl KafkaResponse for ApiVersionsResponse {
    fn parse(payload: Bytes, version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, error_code) = parse_kafka_code(s)?;
            let (s, api_versions) = parse_array(parse_version_range)(s)?;
            let (s, throttle_time_ms) = if version >= 1 { be_i32(s)? } else { (s, 0) };
            Ok((
                s,
                ApiVersionsResponse {
                    error_code,
                    api_versions,
                    throttle_time_ms,
                },
            ))
        })
    }

    fn error(&self) -> Option<KafkaCode> {
        non_zero(self.error_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_request;
    use crate::types::CorrelationId;
    use bytes::BytesMut;

    fn build_response(error_code: i16, ranges: &[(i16, i16, i16)], throttle: Option<i32>) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_i16(error_code);
        buf.put_i32(ranges.len() as i32);
        for (key, min, max) in ranges {
            buf.put_i16(*key);
            buf.put_i16(*min);
            buf.put_i16(*max);
        }
        if let Some(t) = throttle {
            buf.put_i32(t);
        }
        buf.freeze()
    }

    #[test]
    fn test_check_version() {
        assert!(ApiVersionsRequest::check_version(0).is_ok());
        assert!(ApiVersionsRequest::check_version(1).is_ok());
        assert!(ApiVersionsRequest::check_version(2).is_err());
        assert!(ApiVersionsRequest::check_version(-1).is_err());
    }

    #[test]
    fn test_request_body_is_empty() {
        let frame = encode_request(&ApiVersionsRequest, 0, CorrelationId(1), "init").unwrap();
        // size + header only: 4 + (2 + 2 + 4 + 2 + 4)
        assert_eq!(frame.len(), 4 + 14);
    }

    #[test]
    fn test_parse_response_v0() {
        let payload = build_response(0, &[(3, 0, 5), (1, 0, 10), (18, 0, 1)], None);
        let response = ApiVersionsResponse::parse(payload, 0).unwrap();
        assert_eq!(response.error_code, KafkaCode::None);
        assert_eq!(response.api_versions.len(), 3);
        assert_eq!(
            response.api_versions[0],
            ApiVersionRange::new(ApiKey::Metadata, 0, 5)
        );
        assert_eq!(response.throttle_time_ms, 0);
        assert_eq!(response.error(), None);
    }

    #[test]
    fn test_parse_response_v1_reads_throttle() {
        let payload = build_response(0, &[(18, 0, 1)], Some(25));
        let response = ApiVersionsResponse::parse(payload, 1).unwrap();
        assert_eq!(response.throttle_time_ms, 25);
    }

    #[test]
    fn test_parse_response_error_code() {
        let payload = build_response(35, &[], None);
        let response = ApiVersionsResponse::parse(payload, 0).unwrap();
        assert_eq!(response.error(), Some(KafkaCode::UnsupportedVersion));
    }

    #[test]
    fn test_parse_truncated_response_fails() {
        let payload = Bytes::from_static(&[0x00]);
        assert!(ApiVersionsResponse::parse(payload, 0).is_err());
    }
}
