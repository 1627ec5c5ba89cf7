//! Centralized protocol and client constants.
//!
//! This module consolidates the magic numbers used throughout the client:
//! wire-protocol bounds, default timeouts, and the well-known client ids
//! used during connection bring-up.

// =============================================================================
// Protocol Constants (Kafka Wire Protocol)
// =============================================================================

/// Maximum allowed size of a protocol array.
///
/// Array length prefixes arrive off the wire before any validation, so any
/// count above this is rejected as malformed rather than allocated.
pub const MAX_PROTOCOL_ARRAY_SIZE: i32 = 1_000_000;

/// Maximum allowed response frame size (100 MB).
///
/// A length prefix above this closes the connection instead of allocating.
pub const MAX_FRAME_SIZE: i32 = 100 * 1024 * 1024;

/// Size of the frame length prefix in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

// =============================================================================
// Client Defaults
// =============================================================================

/// Default client id stamped into request headers when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "kavka";

/// Client id used for the ApiVersions exchange during connection bring-up.
pub const BRING_UP_CLIENT_ID: &str = "kavka-init";

/// Client id used for the SASL handshake/authenticate exchanges.
pub const SASL_CLIENT_ID: &str = "kavka-sasl";

/// Default dialer timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;

/// Default response-read timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default TCP keepalive interval in milliseconds.
pub const DEFAULT_KEEPALIVE_MS: u64 = 7_200_000;

/// Default metadata refresh interval in milliseconds.
///
/// The client itself never schedules refreshes; this is the recommended
/// ticker period for whoever drives
/// [`MetadataCache::refresh`](crate::metadata::MetadataCache::refresh).
pub const DEFAULT_METADATA_MAX_AGE_MS: u64 = 300_000;

/// Default number of attempts for a topic metadata fetch.
pub const DEFAULT_METADATA_RETRIES: u32 = 3;

/// Default consumer-group session timeout in milliseconds.
pub const DEFAULT_SESSION_TIMEOUT_MS: i32 = 30_000;

/// Default consumer-group rebalance timeout in milliseconds.
pub const DEFAULT_REBALANCE_TIMEOUT_MS: i32 = 60_000;

/// Protocol type sent in JoinGroup for consumer groups.
pub const CONSUMER_PROTOCOL_TYPE: &str = "consumer";
