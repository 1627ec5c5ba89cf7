//! Type-safe wrappers for Kafka protocol primitives.
//!
//! These newtypes keep semantically different integers apart even though
//! they share a wire representation (a node id and a partition index are
//! both `i32` on the wire).

use bytes::BufMut;
use std::fmt;

use crate::encode::Wire;
use crate::error::Result;

/// A Kafka broker (node) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BrokerId(pub i32);

impl BrokerId {
    /// Invalid broker id; used by metadata to mark a leaderless partition.
    pub const INVALID: Self = BrokerId(-1);

    #[inline]
    pub const fn new(value: i32) -> Self {
        BrokerId(value)
    }

    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Check if this is a valid (non-negative) broker id.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i32> for BrokerId {
    fn from(value: i32) -> Self {
        BrokerId(value)
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Wire for BrokerId {
    fn wire_len(&self) -> usize {
        4
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A per-connection request correlation id.
///
/// The client assigns these strictly monotonically per connection, starting
/// at 1, and the broker echoes the value in its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CorrelationId(pub i32);

impl CorrelationId {
    #[inline]
    pub const fn new(value: i32) -> Self {
        CorrelationId(value)
    }

    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// The next correlation id in sequence.
    #[inline]
    pub const fn next(self) -> Self {
        CorrelationId(self.0.wrapping_add(1))
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Wire for CorrelationId {
    fn wire_len(&self) -> usize {
        4
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A partition index within a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PartitionIndex(pub i32);

impl PartitionIndex {
    #[inline]
    pub const fn new(value: i32) -> Self {
        PartitionIndex(value)
    }

    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl From<i32> for PartitionIndex {
    fn from(value: i32) -> Self {
        PartitionIndex(value)
    }
}

impl fmt::Display for PartitionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Wire for PartitionIndex {
    fn wire_len(&self) -> usize {
        4
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A consumer-group generation id.
///
/// Incremented by the coordinator on every successful rebalance; group
/// requests carrying a stale generation are rejected with
/// `IllegalGeneration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GenerationId(pub i32);

impl GenerationId {
    /// Sentinel used before the first successful join.
    pub const NONE: Self = GenerationId(-1);

    #[inline]
    pub const fn new(value: i32) -> Self {
        GenerationId(value)
    }

    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Wire for GenerationId {
    fn wire_len(&self) -> usize {
        4
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A message offset within a partition.
///
/// # Special Values
///
/// - `-1` (`LATEST`): in ListOffsets requests, "the end of the log"; in
///   offset-fetch responses, "no committed offset".
/// - `-2` (`EARLIEST`): "the beginning of the log".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset(pub i64);

impl Offset {
    /// Special offset meaning "latest available message" (end of log).
    pub const LATEST: Self = Offset(-1);

    /// Special offset meaning "earliest available message".
    pub const EARLIEST: Self = Offset(-2);

    #[inline]
    pub const fn new(value: i64) -> Self {
        Offset(value)
    }

    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Check if this is a concrete (non-negative) offset.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Offset(value)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Wire for Offset {
    fn wire_len(&self) -> usize {
        8
    }

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        self.0.encode(buffer)
    }
}
