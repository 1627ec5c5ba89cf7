//! Crate & protocol level errors.
//!
//! The client uses a two-layer error model:
//!
//! - [`Error`]: connection, configuration, and codec failures raised by the
//!   client itself. I/O and codec errors close the affected connection; the
//!   next request on that broker reopens it.
//! - [`KafkaCode`]: wire protocol error codes reported by a broker inside an
//!   otherwise well-formed response. These leave the connection healthy and
//!   surface as [`Error::Kafka`].

use bytes::Bytes;
use num_derive::FromPrimitive;
use std::{io, result};
use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

/// Client-side errors.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
    /// An error in the network.
    #[error("IO error: {0:?}")]
    Io(io::ErrorKind),

    /// Could not parse data received from a broker.
    #[error("parsing error: invalid data ({} bytes)", .0.len())]
    Parsing(Bytes),

    /// A length prefix was negative (other than the -1 null sentinel) or
    /// larger than the enclosing frame allows.
    #[error("bad length prefix: {0}")]
    BadLength(i32),

    /// Invalid client configuration. Fatal; raised at construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// A broker answered with a non-zero protocol error code.
    #[error("kafka protocol error: {0:?}")]
    Kafka(KafkaCode),

    /// A response carried a correlation id other than the one sent.
    #[error("correlation id mismatch: sent {sent}, received {received}")]
    CorrelationMismatch { sent: i32, received: i32 },

    /// No broker in the registry could serve the request.
    #[error("no available broker")]
    NoAvailableBroker,

    /// A node id that is not part of the current cluster snapshot.
    #[error("unknown broker node {0}")]
    UnknownBroker(i32),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Io(a), Error::Io(b)) => a == b,
            (Error::Parsing(a), Error::Parsing(b)) => a == b,
            (Error::BadLength(a), Error::BadLength(b)) => a == b,
            (Error::Config(a), Error::Config(b)) => a == b,
            (Error::Kafka(a), Error::Kafka(b)) => a == b,
            (
                Error::CorrelationMismatch { sent, received },
                Error::CorrelationMismatch {
                    sent: s2,
                    received: r2,
                },
            ) => sent == s2 && received == r2,
            (Error::NoAvailableBroker, Error::NoAvailableBroker) => true,
            (Error::UnknownBroker(a), Error::UnknownBroker(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e.kind())
    }
}

impl Error {
    /// Whether this error indicates the connection it occurred on is in an
    /// unknown state and must be closed.
    pub fn poisons_connection(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Parsing(_) | Error::BadLength(_) | Error::CorrelationMismatch { .. }
        )
    }
}

/// Various errors reported by a remote Kafka server.
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, Default)]
pub enum KafkaCode {
    /// An unexpected server error.
    Unknown = -1,
    #[default]
    None = 0,
    /// The requested offset is outside the range of offsets
    /// maintained by the server for the given topic/partition.
    OffsetOutOfRange = 1,
    /// This indicates that a message contents does not match its CRC.
    CorruptMessage = 2,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition = 3,
    /// The message has a negative size.
    InvalidMessageSize = 4,
    /// No leader exists for this partition right now, typically because
    /// a leadership election is in progress.
    LeaderNotAvailable = 5,
    /// The request was sent to a replica that is not the leader for the
    /// partition. The client's metadata is out of date.
    NotLeaderForPartition = 6,
    /// The request exceeded the user-specified time limit.
    RequestTimedOut = 7,
    /// Used mostly by tools when a broker is not alive.
    BrokerNotAvailable = 8,
    /// A replica is expected on a broker, but is not.
    ReplicaNotAvailable = 9,
    /// The produce payload exceeded the broker's maximum message size.
    MessageSizeTooLarge = 10,
    /// Internal error code for broker-to-broker communication.
    StaleControllerEpoch = 11,
    /// Offset metadata string exceeded the configured maximum.
    OffsetMetadataTooLarge = 12,
    /// The server disconnected before a response was received.
    NetworkException = 13,
    /// The coordinator is still loading group state after a leadership
    /// change on the offsets topic. Retry after a backoff.
    GroupLoadInProgress = 14,
    /// The group coordinator is not available (offsets topic not yet
    /// created, or the coordinator is not active).
    GroupCoordinatorNotAvailable = 15,
    /// This broker is not the coordinator for the addressed group.
    NotCoordinatorForGroup = 16,
    /// The request addressed an invalid or internal topic.
    InvalidTopic = 17,
    /// A produce batch exceeded the maximum segment size.
    RecordListTooLarge = 18,
    /// Fewer in-sync replicas than required and requiredAcks is -1.
    NotEnoughReplicas = 19,
    /// The message was written, but with fewer in-sync replicas than
    /// required.
    NotEnoughReplicasAfterAppend = 20,
    /// The requested requiredAcks is invalid.
    InvalidRequiredAcks = 21,
    /// The generation id in a group request is not the current generation.
    IllegalGeneration = 22,
    /// The member's protocol type/protocols are incompatible with the group.
    InconsistentGroupProtocol = 23,
    /// The group id is empty or null.
    InvalidGroupId = 24,
    /// The member id is not in the current generation.
    UnknownMemberId = 25,
    /// The requested session timeout is outside the broker's allowed range.
    InvalidSessionTimeout = 26,
    /// The coordinator has begun rebalancing the group; the client should
    /// rejoin.
    RebalanceInProgress = 27,
    /// An offset commit was rejected because of oversize metadata.
    InvalidCommitOffsetSize = 28,
    /// Not authorized to access the requested topic.
    TopicAuthorizationFailed = 29,
    /// Not authorized to access the group.
    GroupAuthorizationFailed = 30,
    /// Not authorized to use an inter-broker or administrative API.
    ClusterAuthorizationFailed = 31,
    /// The timestamp of the message is out of acceptable range.
    InvalidTimestamp = 32,
    /// The broker does not support the requested SASL mechanism.
    UnsupportedSaslMechanism = 33,
    /// Request is not valid given the current SASL state.
    IllegalSaslState = 34,
    /// The version of API is not supported.
    UnsupportedVersion = 35,
    /// Topic with this name already exists.
    TopicAlreadyExists = 36,
    /// This is not the correct controller for this cluster.
    NotController = 41,
    /// The message format version on the broker does not support the request.
    UnsupportedForMessageFormat = 43,
    /// The log directory is offline.
    KafkaStorageError = 56,
    /// SASL Authentication failed.
    SaslAuthenticationFailed = 58,
}

impl KafkaCode {
    /// Coordinator errors that require the group client to discard its
    /// coordinator and re-run FindCoordinator.
    pub fn requires_rediscovery(self) -> bool {
        matches!(
            self,
            KafkaCode::NotCoordinatorForGroup
                | KafkaCode::GroupCoordinatorNotAvailable
                | KafkaCode::GroupLoadInProgress
        )
    }

    /// Group membership errors that require re-joining under the existing
    /// coordinator.
    pub fn requires_rejoin(self) -> bool {
        matches!(
            self,
            KafkaCode::RebalanceInProgress
                | KafkaCode::IllegalGeneration
                | KafkaCode::UnknownMemberId
        )
    }
}
