//! Consumer-group membership client.
//!
//! Drives the FindCoordinator -> JoinGroup -> (leader only: assign) ->
//! SyncGroup -> Heartbeat cycle for one group member:
//!
//! ```text
//! Unjoined --FindCoordinator ok--> Discovered --JoinGroup ok--> Joined
//!     ^                                ^                          |
//!     |                                |            SyncGroup ok  |
//!     |      rebalance / illegal       |                          v
//!     +--- coordinator errors ---------+----------------------- Stable
//! ```
//!
//! The caller owns threading and scheduling: heartbeats are sent when the
//! caller invokes [`heartbeat`](GroupClient::heartbeat) (at
//! [`heartbeat_interval`](GroupClient::heartbeat_interval) pacing or
//! faster), and a failed transition is retried by calling
//! [`establish`](GroupClient::establish) again. The member id assigned at
//! first join is sticky: it survives coordinator re-discovery and re-joins
//! so the server can keep the member's identity.

mod assignor;

pub use assignor::{AssignmentStrategy, RangeAssignor};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::brokers::Brokers;
use crate::constants::{
    CONSUMER_PROTOCOL_TYPE, DEFAULT_REBALANCE_TIMEOUT_MS, DEFAULT_SESSION_TIMEOUT_MS,
};
use crate::error::{Error, Result};
use crate::protocol::{
    FindCoordinatorRequest, GroupAssignment, GroupProtocol, HeartbeatRequest, JoinGroupRequest,
    LeaveGroupRequest, MemberAssignment, OffsetCommitRequest, OffsetFetchRequest,
    OffsetFetchResponse, ProtocolMetadata, SyncGroupRequest,
};
use crate::types::{BrokerId, GenerationId, Offset, PartitionIndex};

/// Where one member stands in the rebalance protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// No coordinator known.
    Unjoined,
    /// Coordinator known, not a member of the current generation.
    Discovered,
    /// Joined a generation, assignment not yet synced.
    Joined,
    /// Full member with a synced assignment; heartbeating keeps it alive.
    Stable,
}

/// One member of one consumer group.
pub struct GroupClient {
    brokers: Arc<Brokers>,
    group_id: String,
    subscriptions: Vec<String>,
    strategy: Box<dyn AssignmentStrategy>,
    session_timeout_ms: i32,
    rebalance_timeout_ms: i32,

    state: GroupState,
    coordinator: Option<Broker>,
    member_id: String,
    generation_id: GenerationId,
    leader_id: String,
    /// Computed by the leader between join and sync.
    pending_assignments: GroupAssignment,
    assignment: Option<MemberAssignment>,
}

impl GroupClient {
    pub fn new(brokers: Arc<Brokers>, group_id: &str, subscriptions: Vec<String>) -> Self {
        Self {
            brokers,
            group_id: group_id.to_string(),
            subscriptions,
            strategy: Box::new(RangeAssignor),
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            rebalance_timeout_ms: DEFAULT_REBALANCE_TIMEOUT_MS,
            state: GroupState::Unjoined,
            coordinator: None,
            member_id: String::new(),
            generation_id: GenerationId::NONE,
            leader_id: String::new(),
            pending_assignments: Vec::new(),
            assignment: None,
        }
    }

    /// Replace the assignment strategy announced at join time.
    pub fn with_strategy(mut self, strategy: Box<dyn AssignmentStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_timeouts(mut self, session_timeout_ms: i32, rebalance_timeout_ms: i32) -> Self {
        self.session_timeout_ms = session_timeout_ms;
        self.rebalance_timeout_ms = rebalance_timeout_ms;
        self
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    /// The member id assigned by the coordinator; empty before first join.
    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn generation_id(&self) -> GenerationId {
        self.generation_id
    }

    /// Whether this member led the last completed join.
    pub fn is_leader(&self) -> bool {
        !self.leader_id.is_empty() && self.leader_id == self.member_id
    }

    /// This member's assignment from the last successful sync.
    pub fn assignment(&self) -> Option<&MemberAssignment> {
        self.assignment.as_ref()
    }

    /// Recommended heartbeat pacing: a third of the session timeout.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms.max(3) as u64 / 3)
    }

    /// Drive the state machine to `Stable`: discover the coordinator if
    /// needed, join, run the assignment strategy when elected leader, and
    /// sync. On error the state reflects how far the member got; calling
    /// again resumes from there.
    pub async fn establish(&mut self) -> Result<()> {
        if self.coordinator.is_none() || self.state == GroupState::Unjoined {
            self.discover().await?;
        }
        self.join().await?;
        self.sync().await?;
        Ok(())
    }

    /// Locate the group's coordinator by asking any broker in the roster.
    pub async fn discover(&mut self) -> Result<()> {
        let request = FindCoordinatorRequest::new(&self.group_id);
        let infos = self.brokers.infos().await;
        if infos.is_empty() {
            return Err(Error::NoAvailableBroker);
        }

        let mut last_error = Error::NoAvailableBroker;
        for info in &infos {
            let broker = match self.brokers.get(info.node_id).await {
                Ok(broker) => broker,
                Err(e) => {
                    last_error = e;
                    continue;
                }
            };
            match broker.request(&request).await {
                Ok(response) => {
                    let coordinator = response.coordinator;
                    debug!(
                        group = %self.group_id,
                        node = coordinator.node_id,
                        address = %coordinator.address(),
                        "found coordinator"
                    );
                    // Prefer the registry's handle so the coordinator
                    // connection is shared; fall back to a direct handle
                    // when the node is not in the roster yet.
                    let node_id = BrokerId(coordinator.node_id);
                    let handle = match self.brokers.get(node_id).await {
                        Ok(handle) => handle,
                        Err(_) => Broker::new(
                            &coordinator.address(),
                            node_id,
                            Arc::clone(self.brokers.config()),
                        ),
                    };
                    self.coordinator = Some(handle);
                    self.state = GroupState::Discovered;
                    return Ok(());
                }
                Err(e @ Error::Kafka(_)) => return Err(e),
                Err(e) => {
                    warn!(broker = %broker.address(), error = %e, "find coordinator failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Join the group's next generation, keeping any previously assigned
    /// member id.
    async fn join(&mut self) -> Result<()> {
        let metadata = ProtocolMetadata::new(self.subscriptions.clone()).to_bytes();
        let request = JoinGroupRequest {
            group_id: self.group_id.clone(),
            session_timeout_ms: self.session_timeout_ms,
            rebalance_timeout_ms: self.rebalance_timeout_ms,
            member_id: self.member_id.clone(),
            protocol_type: CONSUMER_PROTOCOL_TYPE.to_string(),
            protocols: vec![GroupProtocol {
                name: self.strategy.name().to_string(),
                metadata,
            }],
        };

        let coordinator = self.coordinator()?;
        let response = match coordinator.request(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.note_failure(&e);
                return Err(e);
            }
        };

        self.member_id = response.member_id.clone();
        self.generation_id = response.generation_id;
        self.leader_id = response.leader_id.clone();
        self.state = GroupState::Joined;
        info!(
            group = %self.group_id,
            member = %self.member_id,
            generation = %self.generation_id,
            leader = self.is_leader(),
            "joined group"
        );

        // The leader alone receives the member list and computes the
        // assignment; everyone else syncs with an empty one.
        if response.is_leader() && !response.members.is_empty() {
            let topics = self.subscribed_topics(&response.members);
            let metadata = match self.brokers.metadata(&topics).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    self.note_failure(&e);
                    return Err(e);
                }
            };
            self.pending_assignments = self.strategy.assign(&response.members, &metadata.topics);
        } else {
            self.pending_assignments = Vec::new();
        }
        Ok(())
    }

    /// Distribute (or receive) the generation's assignment.
    async fn sync(&mut self) -> Result<()> {
        let request = SyncGroupRequest {
            group_id: self.group_id.clone(),
            generation_id: self.generation_id,
            member_id: self.member_id.clone(),
            assignments: std::mem::take(&mut self.pending_assignments),
        };

        let coordinator = self.coordinator()?;
        let response = match coordinator.request(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.note_failure(&e);
                return Err(e);
            }
        };

        self.assignment = if response.assignment.is_empty() {
            None
        } else {
            Some(MemberAssignment::from_bytes(response.assignment)?)
        };
        self.state = GroupState::Stable;
        debug!(group = %self.group_id, member = %self.member_id, "group stable");
        Ok(())
    }

    /// One heartbeat to the coordinator. Coordinator and membership errors
    /// push the state machine back so the next [`establish`] recovers.
    ///
    /// [`establish`]: GroupClient::establish
    pub async fn heartbeat(&mut self) -> Result<()> {
        let request = HeartbeatRequest {
            group_id: self.group_id.clone(),
            generation_id: self.generation_id,
            member_id: self.member_id.clone(),
        };
        let coordinator = self.coordinator()?;
        match coordinator.request(&request).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.note_failure(&e);
                Err(e)
            }
        }
    }

    /// Leave the group, abandoning the member identity.
    pub async fn leave(&mut self) -> Result<()> {
        let request = LeaveGroupRequest {
            group_id: self.group_id.clone(),
            member_id: self.member_id.clone(),
        };
        let coordinator = self.coordinator()?;
        let result = coordinator.request(&request).await.map(|_| ());
        self.state = GroupState::Unjoined;
        self.coordinator = None;
        self.member_id.clear();
        self.generation_id = GenerationId::NONE;
        self.leader_id.clear();
        self.assignment = None;
        result
    }

    /// Commit offsets through the coordinator under the current
    /// generation.
    pub async fn commit_offsets(
        &mut self,
        offsets: &[(String, PartitionIndex, Offset)],
    ) -> Result<()> {
        let mut request = OffsetCommitRequest::new(
            &self.group_id,
            self.generation_id.value(),
            &self.member_id,
        );
        for (topic, partition, offset) in offsets {
            request.add_partition(topic, *partition, *offset);
        }

        let coordinator = self.coordinator()?;
        let response = match coordinator.request(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.note_failure(&e);
                return Err(e);
            }
        };
        if let Some(code) = response.first_error() {
            let error = Error::Kafka(code);
            self.note_failure(&error);
            return Err(error);
        }
        Ok(())
    }

    /// Read committed offsets for `partitions` through the coordinator.
    pub async fn fetch_offsets(
        &mut self,
        partitions: &[(String, PartitionIndex)],
    ) -> Result<OffsetFetchResponse> {
        let mut request = OffsetFetchRequest::new(&self.group_id);
        for (topic, partition) in partitions {
            request.add_partition(topic, *partition);
        }
        let coordinator = self.coordinator()?;
        match coordinator.request(&request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.note_failure(&e);
                Err(e)
            }
        }
    }

    /// Topics any member of the generation subscribes to.
    fn subscribed_topics(&self, members: &[crate::protocol::JoinGroupMember]) -> Vec<String> {
        let mut topics: BTreeSet<String> = self.subscriptions.iter().cloned().collect();
        for member in members {
            if let Ok(metadata) = ProtocolMetadata::from_bytes(member.metadata.clone()) {
                topics.extend(metadata.subscription);
            }
        }
        topics.into_iter().collect()
    }

    fn coordinator(&self) -> Result<Broker> {
        self.coordinator
            .clone()
            .ok_or(Error::NoAvailableBroker)
    }

    /// Route a failed coordinator exchange to the right recovery state.
    /// The member id is retained so a retained server-side identity is
    /// reused at the next join.
    fn note_failure(&mut self, error: &Error) {
        match error {
            Error::Kafka(code) if code.requires_rediscovery() => {
                debug!(group = %self.group_id, code = ?code, "coordinator lost, rediscovering");
                self.coordinator = None;
                self.state = GroupState::Unjoined;
            }
            Error::Kafka(code) if code.requires_rejoin() => {
                debug!(group = %self.group_id, code = ?code, "generation lost, rejoining");
                self.state = GroupState::Discovered;
            }
            Error::Kafka(_) => {
                self.state = GroupState::Unjoined;
            }
            _ => {
                // I/O and codec failures: the broker already closed the
                // connection; discovery re-runs on the next attempt.
                self.coordinator = None;
                self.state = GroupState::Unjoined;
            }
        }
    }
}
