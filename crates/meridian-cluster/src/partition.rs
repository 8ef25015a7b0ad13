//! Partition map: `namespace -> Partitions`, a 2-D replica table plus a
//! parallel regime array, published copy-on-write (§3, §4.6).

use meridian_core::PARTITION_COUNT;
use meridian_proto::partitions::NamespaceReplicas;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::node::Node;

/// One namespace's replica table: `replicas[replica_index][partition_id]`
/// is a weak back-reference to a `Node` (the map does not keep nodes
/// alive), plus a parallel `regimes` array used to resolve conflicting
/// claims from different nodes about the same partition.
pub struct Partitions {
    pub replicas: Vec<Vec<Option<Arc<Node>>>>,
    pub regimes: Vec<u32>,
}

impl Partitions {
    fn empty(replica_count: usize) -> Self {
        Self {
            replicas: vec![vec![None; PARTITION_COUNT]; replica_count],
            regimes: vec![0; PARTITION_COUNT],
        }
    }

    /// Apply one node's view of a namespace's replica bitmaps, keeping
    /// whichever regime for each partition is higher (ties keep the
    /// existing claim — last-writer-within-an-iteration resolves ties by
    /// tend iteration order, i.e. whichever update is merged last wins
    /// on equal regimes).
    fn merge_from(&mut self, reported: &NamespaceReplicas, owner: &Arc<Node>) {
        if reported.replicas.len() > self.replicas.len() {
            self.replicas.resize_with(reported.replicas.len(), || vec![None; PARTITION_COUNT]);
        }
        for (replica_idx, bitmap) in reported.replicas.iter().enumerate() {
            for partition_id in 0..PARTITION_COUNT as u16 {
                if !bitmap.is_set(partition_id) {
                    continue;
                }
                let idx = partition_id as usize;
                if reported.regime >= self.regimes[idx] {
                    self.regimes[idx] = reported.regime;
                    self.replicas[replica_idx][idx] = Some(Arc::clone(owner));
                }
            }
        }
    }
}

/// The full `namespace -> Partitions` table, published behind a
/// `RwLock<Arc<..>>` so tend-thread updates never block data-plane
/// readers: a reader clones the `Arc` once and sees a self-consistent
/// snapshot even if tend replaces the map moments later.
#[derive(Default)]
pub struct PartitionMapStore {
    current: RwLock<Arc<HashMap<String, Partitions>>>,
}

impl PartitionMapStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, Partitions>> {
        Arc::clone(&self.current.read().unwrap())
    }

    /// Copy-on-write rebuild: the first namespace update in a tend
    /// iteration shallow-clones the previously published map (the
    /// `Partitions` entries themselves are moved, not deep-cloned,
    /// except for the one namespace being updated) and later updates in
    /// the same iteration mutate that clone; call `publish` once at the
    /// end of the iteration.
    pub fn begin_update(&self) -> PartitionMapBuilder {
        PartitionMapBuilder {
            base: self.snapshot(),
            pending: HashMap::new(),
        }
    }

    pub fn publish(&self, builder: PartitionMapBuilder) {
        let mut merged: HashMap<String, Partitions> = HashMap::new();
        for (ns, partitions) in Arc::try_unwrap(builder.base).unwrap_or_else(|arc| (*arc).clone_shallow()) {
            merged.insert(ns, partitions);
        }
        for (ns, partitions) in builder.pending {
            merged.insert(ns, partitions);
        }
        *self.current.write().unwrap() = Arc::new(merged);
    }

    /// Whether any namespace's replica table still names `node_name` as a
    /// holder of any partition. The reap step (§4.6 step 5) uses this
    /// alongside `reference_count` so a node isn't dropped while it's
    /// still the only copy of live data, even if nothing currently lists
    /// it in a peer list.
    pub fn holds_partitions_for(&self, node_name: &str) -> bool {
        self.snapshot().values().any(|partitions| {
            partitions
                .replicas
                .iter()
                .any(|row| row.iter().any(|slot| slot.as_deref().is_some_and(|n| n.name == node_name)))
        })
    }
}

/// Helper trait so `publish` can fall back to cloning namespace entries
/// when another reader still holds the previous snapshot's `Arc`
/// (expected: `Partitions` holds only `Arc<Node>` weak references and a
/// `Vec<u32>`, both cheap to clone at the namespace granularity).
trait ShallowClone {
    fn clone_shallow(&self) -> HashMap<String, Partitions>;
}

impl ShallowClone for HashMap<String, Partitions> {
    fn clone_shallow(&self) -> HashMap<String, Partitions> {
        self.iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    Partitions {
                        replicas: v.replicas.clone(),
                        regimes: v.regimes.clone(),
                    },
                )
            })
            .collect()
    }
}

/// An in-progress copy-on-write update, accumulating per-namespace
/// rebuilds before a single atomic `publish`.
pub struct PartitionMapBuilder {
    base: Arc<HashMap<String, Partitions>>,
    pending: HashMap<String, Partitions>,
}

impl PartitionMapBuilder {
    /// Merge one node's reported replica table for `reported.namespace`
    /// into this builder's working copy of that namespace.
    pub fn merge_namespace(&mut self, reported: &NamespaceReplicas, owner: &Arc<Node>) {
        let entry = self.pending.entry(reported.namespace.clone()).or_insert_with(|| {
            self.base
                .get(&reported.namespace)
                .map(|p| Partitions {
                    replicas: p.replicas.clone(),
                    regimes: p.regimes.clone(),
                })
                .unwrap_or_else(|| Partitions::empty(reported.replicas.len().max(1)))
        });
        entry.merge_from(reported, owner);
    }
}
