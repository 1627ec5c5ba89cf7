//! Partition assignment strategies.
//!
//! The group leader runs one of these over the joined members and the
//! subscribed topics' metadata to produce the per-member assignment blobs
//! distributed through SyncGroup.

use std::collections::BTreeMap;

use tracing::warn;

use crate::protocol::{
    GroupAssignment, JoinGroupMember, MemberAssignment, MemberGroupAssignment,
    PartitionAssignment, ProtocolMetadata, TopicMetadata,
};
use crate::types::PartitionIndex;

/// A pluggable partition assignment strategy.
pub trait AssignmentStrategy: Send + Sync {
    /// The protocol name announced in JoinGroup (e.g. `"range"`).
    fn name(&self) -> &'static str;

    /// Distribute the partitions of `topics` over `members`. Every member
    /// gets an entry in the result, possibly with an empty assignment.
    fn assign(&self, members: &[JoinGroupMember], topics: &[TopicMetadata]) -> GroupAssignment;
}

/// Range assignment: per topic, members sorted by member id get contiguous
/// runs of the partition ids sorted ascending.
///
/// With `n` partitions and `m` subscribed members, the first `n % m`
/// members own `n / m + 1` partitions each and the rest own `n / m`.
/// Topics are assigned independently; a member's blob is the union across
/// topics it subscribes to.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeAssignor;

impl RangeAssignor {
    fn subscription_of(member: &JoinGroupMember) -> Vec<String> {
        match ProtocolMetadata::from_bytes(member.metadata.clone()) {
            Ok(metadata) => metadata.subscription,
            Err(e) => {
                warn!(member = %member.member_id, error = %e, "unreadable member metadata");
                Vec::new()
            }
        }
    }
}

impl AssignmentStrategy for RangeAssignor {
    fn name(&self) -> &'static str {
        "range"
    }

    fn assign(&self, members: &[JoinGroupMember], topics: &[TopicMetadata]) -> GroupAssignment {
        // member id -> accumulated assignment; BTreeMap keeps the output
        // ordered by member id.
        let mut accumulated: BTreeMap<String, MemberAssignment> = members
            .iter()
            .map(|m| (m.member_id.clone(), MemberAssignment::default()))
            .collect();

        let subscriptions: Vec<(String, Vec<String>)> = members
            .iter()
            .map(|m| (m.member_id.clone(), Self::subscription_of(m)))
            .collect();

        for topic in topics {
            let mut partitions: Vec<PartitionIndex> =
                topic.partitions.iter().map(|p| p.partition).collect();
            partitions.sort();

            let mut subscribed: Vec<&str> = subscriptions
                .iter()
                .filter(|(_, topics)| topics.iter().any(|t| t == &topic.name))
                .map(|(id, _)| id.as_str())
                .collect();
            subscribed.sort();
            subscribed.dedup();

            if subscribed.is_empty() || partitions.is_empty() {
                continue;
            }

            let floor = partitions.len() / subscribed.len();
            let remainder = partitions.len() % subscribed.len();
            let mut start = 0;
            for (index, member_id) in subscribed.iter().enumerate() {
                let count = if index < remainder { floor + 1 } else { floor };
                if count == 0 {
                    continue;
                }
                let run = partitions[start..start + count].to_vec();
                start += count;
                accumulated
                    .get_mut(*member_id)
                    .expect("subscribed member is in the group")
                    .partition_assignments
                    .push(PartitionAssignment {
                        topic: topic.name.clone(),
                        partitions: run,
                    });
            }
        }

        accumulated
            .into_iter()
            .map(|(member_id, assignment)| MemberGroupAssignment {
                member_id,
                assignment: assignment.to_bytes(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KafkaCode;
    use crate::protocol::PartitionMetadata;
    use crate::types::BrokerId;

    fn member(id: &str, topics: &[&str]) -> JoinGroupMember {
        JoinGroupMember {
            member_id: id.to_string(),
            metadata: ProtocolMetadata::new(topics.iter().map(|t| t.to_string()).collect())
                .to_bytes(),
        }
    }

    fn topic(name: &str, partition_ids: &[i32]) -> TopicMetadata {
        TopicMetadata {
            error: KafkaCode::None,
            name: name.to_string(),
            is_internal: false,
            partitions: partition_ids
                .iter()
                .map(|id| PartitionMetadata {
                    error: KafkaCode::None,
                    partition: PartitionIndex(*id),
                    leader: BrokerId(0),
                    replicas: vec![BrokerId(0)],
                    isr: vec![BrokerId(0)],
                    offline_replicas: Vec::new(),
                })
                .collect(),
        }
    }

    fn decode(assignment: &GroupAssignment, member_id: &str) -> Vec<(String, Vec<i32>)> {
        let blob = assignment
            .iter()
            .find(|a| a.member_id == member_id)
            .unwrap()
            .assignment
            .clone();
        let decoded = MemberAssignment::from_bytes(blob).unwrap();
        decoded
            .partition_assignments
            .iter()
            .map(|p| {
                (
                    p.topic.clone(),
                    p.partitions.iter().map(|x| x.value()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_uneven_assignment_favors_first_members() {
        // 5 partitions over 3 members, member ids given out of order:
        // m1 -> [0, 1], m2 -> [2, 3], m3 -> [4].
        let members = vec![
            member("m2", &["t"]),
            member("m1", &["t"]),
            member("m3", &["t"]),
        ];
        let topics = vec![topic("t", &[3, 1, 4, 0, 2])];

        let assignment = RangeAssignor.assign(&members, &topics);
        assert_eq!(decode(&assignment, "m1"), vec![("t".to_string(), vec![0, 1])]);
        assert_eq!(decode(&assignment, "m2"), vec![("t".to_string(), vec![2, 3])]);
        assert_eq!(decode(&assignment, "m3"), vec![("t".to_string(), vec![4])]);
    }

    #[test]
    fn test_even_assignment_is_contiguous_in_order() {
        // 10 partitions over 5 members: two contiguous partitions each.
        let ids = ["a", "b", "c", "d", "e"];
        let members: Vec<_> = ids.iter().map(|id| member(id, &["t"])).collect();
        let topics = vec![topic("t", &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9])];

        let assignment = RangeAssignor.assign(&members, &topics);
        for (index, id) in ids.iter().enumerate() {
            let expected = vec![(
                "t".to_string(),
                vec![2 * index as i32, 2 * index as i32 + 1],
            )];
            assert_eq!(decode(&assignment, id), expected, "member {id}");
        }
    }

    #[test]
    fn test_assignment_partitions_the_set_exactly() {
        let members = vec![
            member("x", &["t"]),
            member("y", &["t"]),
            member("z", &["t"]),
        ];
        let topics = vec![topic("t", &[0, 1, 2, 3, 4, 5, 6])];

        let assignment = RangeAssignor.assign(&members, &topics);
        let mut all: Vec<i32> = Vec::new();
        for id in ["x", "y", "z"] {
            for (_, partitions) in decode(&assignment, id) {
                all.extend(partitions);
            }
        }
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_unsubscribed_member_receives_nothing_for_topic() {
        let members = vec![member("a", &["t"]), member("b", &["other"])];
        let topics = vec![topic("t", &[0, 1])];

        let assignment = RangeAssignor.assign(&members, &topics);
        assert_eq!(decode(&assignment, "a"), vec![("t".to_string(), vec![0, 1])]);
        assert!(decode(&assignment, "b").is_empty());
        // Unsubscribed members still get an (empty) entry.
        assert_eq!(assignment.len(), 2);
    }

    #[test]
    fn test_more_members_than_partitions() {
        let members = vec![
            member("a", &["t"]),
            member("b", &["t"]),
            member("c", &["t"]),
        ];
        let topics = vec![topic("t", &[0, 1])];

        let assignment = RangeAssignor.assign(&members, &topics);
        assert_eq!(decode(&assignment, "a"), vec![("t".to_string(), vec![0])]);
        assert_eq!(decode(&assignment, "b"), vec![("t".to_string(), vec![1])]);
        assert!(decode(&assignment, "c").is_empty());
    }

    #[test]
    fn test_multiple_topics_union() {
        let members = vec![member("a", &["t", "u"]), member("b", &["t"])];
        let topics = vec![topic("t", &[0, 1]), topic("u", &[0])];

        let assignment = RangeAssignor.assign(&members, &topics);
        assert_eq!(
            decode(&assignment, "a"),
            vec![
                ("t".to_string(), vec![0]),
                ("u".to_string(), vec![0]),
            ]
        );
        assert_eq!(decode(&assignment, "b"), vec![("t".to_string(), vec![1])]);
    }
}
