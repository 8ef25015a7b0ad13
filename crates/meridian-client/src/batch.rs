//! Batch planner: group keys by `(namespace, partition_id) -> node`,
//! `BATCH_MSG_REPEAT` compaction for consecutive keys sharing
//! namespace/set/bin-names, and response reassembly by stable original
//! position (§4.8).

use std::collections::HashMap;
use std::sync::Arc;

use meridian_cluster::{get_node, Attempt, Node, Partitions, ProleCursor, ReplicaPolicy};
use meridian_core::{Error, Key};

/// Marks a batch-key entry as carrying full namespace/set/bin-name
/// info. Mutually exclusive with `BATCH_MSG_REPEAT`.
pub const BATCH_MSG_INFO: u8 = 1 << 1;

/// Marks a batch-key entry as repeating the previous entry's
/// namespace/set/bin-names; only the digest follows.
pub const BATCH_MSG_REPEAT: u8 = 1 << 0;

/// One key in a batch request, with the bin filter that applies to it.
/// `None` means "return every bin" (`GET_ALL`).
pub struct BatchKeyEntry<'a> {
    pub key: &'a Key,
    pub bin_names: &'a [String],
}

/// One node's share of a batch command: which original positions (into
/// the caller's key list) it owns, in original order.
pub struct NodeGroup {
    pub node: Arc<Node>,
    pub positions: Vec<usize>,
}

/// Resolve every key to a node under `policy`, grouping consecutive
/// occurrences of the same node together while preserving the order
/// nodes were first seen in (so sub-request dispatch order is stable
/// across retries of the same plan).
pub fn plan_batch(
    keys: &[Key],
    partitions: &Partitions,
    policy: ReplicaPolicy,
    prole_cursor: &ProleCursor,
    rack_id: Option<&str>,
    all_nodes: &[Arc<Node>],
) -> Result<Vec<NodeGroup>, Error> {
    let mut order: Vec<String> = Vec::new();
    let mut by_node: HashMap<String, NodeGroup> = HashMap::new();

    for (position, key) in keys.iter().enumerate() {
        let attempt = Attempt::new();
        let node = get_node(partitions, key, policy, &attempt, prole_cursor, rack_id, all_nodes)?;
        match by_node.get_mut(&node.name) {
            Some(group) => group.positions.push(position),
            None => {
                order.push(node.name.clone());
                by_node.insert(
                    node.name.clone(),
                    NodeGroup {
                        node,
                        positions: vec![position],
                    },
                );
            }
        }
    }

    Ok(order
        .into_iter()
        .map(|name| by_node.remove(&name).expect("inserted above"))
        .collect())
}

/// Encode one node's sub-request key section, applying
/// `BATCH_MSG_REPEAT` compaction whenever an entry's
/// `(namespace, set, bin_names)` exactly matches the previous entry's.
pub fn encode_batch_keys(entries: &[BatchKeyEntry<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut prev: Option<(&str, &str, &[String])> = None;

    for entry in entries {
        let current = (entry.key.namespace.as_str(), entry.key.set.as_str(), entry.bin_names);
        let digest = entry.key.digest();

        if prev == Some(current) {
            out.push(BATCH_MSG_REPEAT);
            out.extend_from_slice(&digest);
            continue;
        }

        out.push(BATCH_MSG_INFO);
        out.extend_from_slice(&digest);
        out.extend_from_slice(&(entry.key.namespace.len() as u16).to_be_bytes());
        out.extend_from_slice(entry.key.namespace.as_bytes());
        out.extend_from_slice(&(entry.key.set.len() as u16).to_be_bytes());
        out.extend_from_slice(entry.key.set.as_bytes());
        out.push(entry.bin_names.len() as u8);
        for name in entry.bin_names {
            out.push(name.len() as u8);
            out.extend_from_slice(name.as_bytes());
        }
        prev = Some(current);
    }

    out
}

/// Scatter each node group's per-position results back into a
/// caller-sized `Vec<Option<T>>`, using the stable `positions` offsets
/// recorded by `plan_batch` rather than result arrival order.
pub fn reassemble<T>(total: usize, groups: &[NodeGroup], results: Vec<Vec<T>>) -> Vec<Option<T>> {
    let mut out: Vec<Option<T>> = (0..total).map(|_| None).collect();
    for (group, group_results) in groups.iter().zip(results) {
        for (position, result) in group.positions.iter().zip(group_results) {
            out[*position] = Some(result);
        }
    }
    out
}
