//! Partition resolver: pick a node for a key under a replica policy
//! (§4.7).

use meridian_core::{Error, Key};
use rand::seq::IteratorRandom;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::node::Node;
use crate::partition::Partitions;

/// Replica selection policy, an exact mirror of the §4.7 table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplicaPolicy {
    Master,
    MasterProles,
    Sequence,
    PreferRack,
    Random,
}

/// Strong-consistency read mode, which remaps the policy per §4.7.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadModeSc {
    Session,
    Linearize,
    AllowReplica,
    AllowUnavailable,
}

impl ReadModeSc {
    /// `SESSION -> MASTER`, `LINEARIZE -> SEQUENCE` (downgrading
    /// `PREFER_RACK` to `SEQUENCE`), `ALLOW_*` pass the policy through
    /// unchanged.
    pub fn remap(self, policy: ReplicaPolicy) -> ReplicaPolicy {
        match self {
            ReadModeSc::Session => ReplicaPolicy::Master,
            ReadModeSc::Linearize => ReplicaPolicy::Sequence,
            ReadModeSc::AllowReplica | ReadModeSc::AllowUnavailable => policy,
        }
    }
}

/// Per-command attempt state. `sequence` is never shared across
/// commands — each command owns its own counter (§5).
pub struct Attempt {
    pub sequence: u32,
    pub rack_fallback: Option<Arc<Node>>,
}

impl Attempt {
    pub fn new() -> Self {
        Self {
            sequence: 0,
            rack_fallback: None,
        }
    }

    /// §4.7 retry rule: advance `sequence` on every retry EXCEPT when
    /// the prior failure was a timeout under `LINEARIZE`, which must
    /// retry the same replica to preserve linearizability.
    pub fn advance_if_allowed(&mut self, was_timeout: bool, read_mode: Option<ReadModeSc>) {
        let holds_sequence = was_timeout && read_mode == Some(ReadModeSc::Linearize);
        if !holds_sequence {
            self.sequence = self.sequence.wrapping_add(1);
        }
    }
}

impl Default for Attempt {
    fn default() -> Self {
        Self::new()
    }
}

/// Round-robin counter shared across all `MASTER_PROLES` selections for
/// one namespace/resolver instance.
#[derive(Default)]
pub struct ProleCursor {
    counter: AtomicU32,
}

impl ProleCursor {
    pub fn next(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

/// Resolve `key` to a node under `policy`, given this namespace's
/// partition table.
pub fn get_node(
    partitions: &Partitions,
    key: &Key,
    policy: ReplicaPolicy,
    attempt: &Attempt,
    prole_cursor: &ProleCursor,
    rack_id: Option<&str>,
    all_nodes: &[Arc<Node>],
) -> Result<Arc<Node>, Error> {
    let partition_id = key.partition_id();
    let row_count = partitions.replicas.len();
    if row_count == 0 {
        return Err(Error::InvalidNode("no replica rows published for namespace".into()));
    }

    match policy {
        ReplicaPolicy::Master => active_or_err(&partitions.replicas[0], partition_id),
        ReplicaPolicy::MasterProles => {
            let start = prole_cursor.next() as usize % row_count;
            for offset in 0..row_count {
                let row = (start + offset) % row_count;
                if let Some(node) = partitions.replicas[row][partition_id as usize].as_ref() {
                    if node.is_active() {
                        return Ok(Arc::clone(node));
                    }
                }
            }
            Err(Error::InvalidNode(format!("no active replica for partition {partition_id}")))
        }
        ReplicaPolicy::Sequence => sequence_pick(partitions, partition_id, attempt.sequence),
        ReplicaPolicy::PreferRack => prefer_rack_pick(partitions, &key.namespace, partition_id, attempt, rack_id, row_count),
        ReplicaPolicy::Random => all_nodes
            .iter()
            .filter(|n| n.is_active())
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| Error::InvalidNode("no active node in cluster".into())),
    }
}

fn active_or_err(row: &[Option<Arc<Node>>], partition_id: u16) -> Result<Arc<Node>, Error> {
    match row[partition_id as usize].as_ref() {
        Some(node) if node.is_active() => Ok(Arc::clone(node)),
        _ => Err(Error::InvalidNode(format!("no active master for partition {partition_id}"))),
    }
}

fn sequence_pick(partitions: &Partitions, partition_id: u16, sequence: u32) -> Result<Arc<Node>, Error> {
    let row_count = partitions.replicas.len();
    let start = sequence as usize % row_count;
    for offset in 0..row_count {
        let row = (start + offset) % row_count;
        if let Some(node) = partitions.replicas[row][partition_id as usize].as_ref() {
            if node.is_active() {
                return Ok(Arc::clone(node));
            }
        }
    }
    Err(Error::InvalidNode(format!("no active replica for partition {partition_id}")))
}

/// As `SEQUENCE`, but prefers a node on the client's rack; keeps the
/// first active node seen as a fallback. The command engine is
/// responsible for treating this fallback as authoritative once it has
/// exhausted the command's retry budget (the "final attempt" rule);
/// this function only ever returns a rack match or the fallback.
fn prefer_rack_pick(
    partitions: &Partitions,
    namespace: &str,
    partition_id: u16,
    attempt: &Attempt,
    rack_id: Option<&str>,
    row_count: usize,
) -> Result<Arc<Node>, Error> {
    let start = attempt.sequence as usize % row_count;
    let mut fallback: Option<Arc<Node>> = attempt.rack_fallback.clone();
    for offset in 0..row_count {
        let row = (start + offset) % row_count;
        if let Some(node) = partitions.replicas[row][partition_id as usize].as_ref() {
            if !node.is_active() {
                continue;
            }
            if fallback.is_none() {
                fallback = Some(Arc::clone(node));
            }
            if let Some(rack) = rack_id {
                let node_rack = node.racks.read().unwrap().get(namespace).copied();
                if node_rack == rack.parse::<u32>().ok() {
                    return Ok(Arc::clone(node));
                }
            }
        }
    }
    fallback.ok_or_else(|| Error::InvalidNode(format!("no active replica for partition {partition_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{Host, PARTITION_COUNT};
    use meridian_proto::partitions::Bitmap;

    fn active_node(name: &str) -> Arc<Node> {
        let node = Node::new(name, Host::new("127.0.0.1", 3000), 1, meridian_net::PoolConfig::default());
        node.set_state(crate::node::NodeState::Active);
        Arc::new(node)
    }

    fn inactive_node(name: &str) -> Arc<Node> {
        Arc::new(Node::new(name, Host::new("127.0.0.1", 3001), 1, meridian_net::PoolConfig::default()))
    }

    fn single_replica_partitions(node: Option<Arc<Node>>, partition_id: u16) -> Partitions {
        let mut row = vec![None; PARTITION_COUNT];
        row[partition_id as usize] = node;
        Partitions {
            replicas: vec![row],
            regimes: vec![0; PARTITION_COUNT],
        }
    }

    #[test]
    fn never_returns_inactive_node() {
        let key = Key::new("ns", "set", b"k1".to_vec());
        let pid = key.partition_id();
        let partitions = single_replica_partitions(Some(inactive_node("A")), pid);
        let attempt = Attempt::new();
        let cursor = ProleCursor::default();
        let result = get_node(&partitions, &key, ReplicaPolicy::Master, &attempt, &cursor, None, &[]);
        assert!(result.is_err());
    }

    #[test]
    fn master_policy_returns_replica_zero() {
        let key = Key::new("ns", "set", b"k1".to_vec());
        let pid = key.partition_id();
        let node_a = active_node("A");
        let partitions = single_replica_partitions(Some(Arc::clone(&node_a)), pid);
        let attempt = Attempt::new();
        let cursor = ProleCursor::default();
        let resolved = get_node(&partitions, &key, ReplicaPolicy::Master, &attempt, &cursor, None, &[]).unwrap();
        assert_eq!(resolved.name, "A");
    }

    #[test]
    fn sequence_policy_wraps_through_rows() {
        let key = Key::new("ns", "set", b"k1".to_vec());
        let pid = key.partition_id();
        let node_a = active_node("A");
        let node_b = active_node("B");
        let mut row0 = vec![None; PARTITION_COUNT];
        row0[pid as usize] = None;
        let mut row1 = vec![None; PARTITION_COUNT];
        row1[pid as usize] = Some(Arc::clone(&node_b));
        let partitions = Partitions {
            replicas: vec![row0, row1],
            regimes: vec![0; PARTITION_COUNT],
        };
        let mut attempt = Attempt::new();
        attempt.sequence = 0;
        let resolved = get_node(&partitions, &key, ReplicaPolicy::Sequence, &attempt, &ProleCursor::default(), None, &[]).unwrap();
        assert_eq!(resolved.name, "B");
        let _ = node_a;
    }

    #[test]
    fn linearize_timeout_holds_sequence() {
        let mut attempt = Attempt::new();
        attempt.sequence = 3;
        attempt.advance_if_allowed(true, Some(ReadModeSc::Linearize));
        assert_eq!(attempt.sequence, 3, "a linearize timeout must not advance sequence");
        attempt.advance_if_allowed(false, Some(ReadModeSc::Linearize));
        assert_eq!(attempt.sequence, 4, "a non-timeout failure still advances sequence");
    }

    #[test]
    fn non_linearize_timeout_advances_sequence() {
        let mut attempt = Attempt::new();
        attempt.advance_if_allowed(true, None);
        assert_eq!(attempt.sequence, 1);
    }

    #[test]
    fn read_mode_sc_remaps_policy() {
        assert_eq!(ReadModeSc::Session.remap(ReplicaPolicy::Sequence), ReplicaPolicy::Master);
        assert_eq!(ReadModeSc::Linearize.remap(ReplicaPolicy::PreferRack), ReplicaPolicy::Sequence);
        assert_eq!(ReadModeSc::AllowReplica.remap(ReplicaPolicy::PreferRack), ReplicaPolicy::PreferRack);
    }

    #[test]
    fn random_policy_only_returns_active_nodes() {
        let key = Key::new("ns", "set", b"k1".to_vec());
        let inactive = inactive_node("dead");
        let active = active_node("alive");
        let nodes = vec![inactive, Arc::clone(&active)];
        let partitions = single_replica_partitions(None, key.partition_id());
        let resolved = get_node(&partitions, &key, ReplicaPolicy::Random, &Attempt::new(), &ProleCursor::default(), None, &nodes).unwrap();
        assert_eq!(resolved.name, "alive");
    }

    #[test]
    fn empty_replica_table_is_rejected() {
        let key = Key::new("ns", "set", b"k1".to_vec());
        let partitions = Partitions {
            replicas: vec![],
            regimes: vec![0; PARTITION_COUNT],
        };
        let result = get_node(&partitions, &key, ReplicaPolicy::Master, &Attempt::new(), &ProleCursor::default(), None, &[]);
        assert!(result.is_err());
        let _ = Bitmap::zeroed();
    }
}
