//! SASL pairs: SaslHandshake (API key 17) and SaslAuthenticate (36).
//!
//! Both run during connection bring-up, after ApiVersions and before any
//! application request. The handshake announces the mechanism; the
//! authenticate call carries the mechanism-specific token. Only PLAIN
//! produces a token in this core.

use bytes::{BufMut, Bytes, BytesMut};

use super::{non_zero, ApiKey, KafkaRequest, KafkaResponse};
use crate::encode::Wire;
use crate::error::{KafkaCode, Result};
use crate::parser::{
    parse_array, parse_bytes, parse_kafka_code, parse_nullable_string, parse_string, run_parser,
};

/// Supported SASL mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaslMechanism {
    /// PLAIN mechanism (username/password in cleartext).
    /// Should only be used over TLS.
    Plain,
    /// SCRAM-SHA-256 mechanism.
    ScramSha256,
    /// SCRAM-SHA-512 mechanism.
    ScramSha512,
}

impl SaslMechanism {
    /// The mechanism name as used in the Kafka protocol.
    pub fn name(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        }
    }

    /// Parse a mechanism name as used in the Kafka protocol.
    pub fn from_name(name: &str) -> Option<SaslMechanism> {
        match name.to_uppercase().as_str() {
            "PLAIN" => Some(SaslMechanism::Plain),
            "SCRAM-SHA-256" => Some(SaslMechanism::ScramSha256),
            "SCRAM-SHA-512" => Some(SaslMechanism::ScramSha512),
            _ => None,
        }
    }
}

/// Build the PLAIN initial response: `[authzid] NUL authcid NUL passwd`.
pub fn plain_token(user: &str, password: &str) -> Bytes {
    let mut token = BytesMut::with_capacity(2 + user.len() + password.len());
    token.put_u8(0);
    token.put_slice(user.as_bytes());
    token.put_u8(0);
    token.put_slice(password.as_bytes());
    token.freeze()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaslHandshakeRequest {
    pub mechanism: String,
}

impl SaslHandshakeRequest {
    pub fn new(mechanism: SaslMechanism) -> Self {
        Self {
            mechanism: mechanism.name().to_string(),
        }
    }
}

impl KafkaRequest for SaslHandshakeRequest {
    type Response = SaslHandshakeResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::SaslHandshake
    }

    fn body_len(&self, _version: i16) -> usize {
        self.mechanism.wire_len()
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, _version: i16) -> Result<()> {
        self.mechanism.encode(buffer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaslHandshakeResponse {
    pub error_code: KafkaCode,
    /// Mechanisms the broker accepts.
    pub mechanisms: Vec<String>,
}

impl KafkaResponse for SaslHandshakeResponse {
    fn parse(payload: Bytes, _version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, error_code) = parse_kafka_code(s)?;
            let (s, mechanisms) = parse_array(parse_string)(s)?;
            Ok((
                s,
                SaslHandshakeResponse {
                    error_code,
                    mechanisms,
                },
            ))
        })
    }

    fn error(&self) -> Option<KafkaCode> {
        non_zero(self.error_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaslAuthenticateRequest {
    pub auth_bytes: Bytes,
}

impl SaslAuthenticateRequest {
    pub fn new(auth_bytes: Bytes) -> Self {
        Self { auth_bytes }
    }
}

impl KafkaRequest for SaslAuthenticateRequest {
    type Response = SaslAuthenticateResponse;

    fn api_key(&self) -> ApiKey {
        ApiKey::SaslAuthenticate
    }

    fn body_len(&self, _version: i16) -> usize {
        self.auth_bytes.wire_len()
    }

    fn encode_body<B: BufMut>(&self, buffer: &mut B, _version: i16) -> Result<()> {
        self.auth_bytes.encode(buffer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaslAuthenticateResponse {
    pub error_code: KafkaCode,
    pub error_message: Option<String>,
    /// Server challenge for multi-step mechanisms; empty for PLAIN.
    pub auth_bytes: Bytes,
}

impl KafkaResponse for SaslAuthenticateResponse {
    fn parse(payload: Bytes, _version: i16) -> Result<Self> {
        run_parser(payload, |s| {
            let (s, error_code) = parse_kafka_code(s)?;
            let (s, error_message) = parse_nullable_string(s)?;
            let (s, auth_bytes) = parse_bytes(s)?;
            Ok((
                s,
                SaslAuthenticateResponse {
                    error_code,
                    error_message,
                    auth_bytes,
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

    #[test]
    fn test_mechanism_names_round_trip() {
        for mechanism in [
            SaslMechanism::Plain,
            SaslMechanism::ScramSha256,
            SaslMechanism::ScramSha512,
        ] {
            assert_eq!(SaslMechanism::from_name(mechanism.name()), Some(mechanism));
        }
        assert_eq!(SaslMechanism::from_name("plain"), Some(SaslMechanism::Plain));
        assert_eq!(SaslMechanism::from_name("GSSAPI"), None);
    }

    #[test]
    fn test_plain_token_layout() {
        let token = plain_token("alice", "secret");
        assert_eq!(&token[..], b"\0alice\0secret");
    }

    #[test]
    fn test_handshake_framing() {
        let request = SaslHandshakeRequest::new(SaslMechanism::Plain);
        let frame = encode_request(&request, 1, CorrelationId(1), "sasl").unwrap();
        let declared = i32::from_be_bytes(frame[0..4].try_into().unwrap());
        assert_eq!(declared as usize, frame.len() - 4);
    }

    #[test]
    fn test_handshake_response_unsupported_mechanism() {
        let mut buf = BytesMut::new();
        buf.put_i16(KafkaCode::UnsupportedSaslMechanism as i16);
        buf.put_i32(1);
        buf.put_i16(5);
        buf.put_slice(b"PLAIN");
        let response = SaslHandshakeResponse::parse(buf.freeze(), 1).unwrap();
        assert_eq!(response.error(), Some(KafkaCode::UnsupportedSaslMechanism));
        assert_eq!(response.mechanisms, vec!["PLAIN".to_string()]);
    }

    #[test]
    fn test_authenticate_response_failure() {
        let mut buf = BytesMut::new();
        buf.put_i16(KafkaCode::SaslAuthenticationFailed as i16);
        buf.put_i16(11);
        buf.put_slice(b"bad secrets");
        buf.put_i32(0);
        let response = SaslAuthenticateResponse::parse(buf.freeze(), 0).unwrap();
        assert_eq!(response.error(), Some(KafkaCode::SaslAuthenticationFailed));
        assert_eq!(response.error_message.as_deref(), Some("bad secrets"));
    }
}
