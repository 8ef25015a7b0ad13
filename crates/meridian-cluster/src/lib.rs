//! meridian-cluster — node state machine, partition map, tend loop, and
//! partition resolver (§4.5-4.7).

pub mod node;
pub mod partition;
pub mod resolver;
pub mod tend;

pub use node::{Node, NodeState};
pub use partition::{PartitionMapBuilder, PartitionMapStore, Partitions};
pub use resolver::{get_node, Attempt, ProleCursor, ReadModeSc, ReplicaPolicy};
pub use tend::{TendIteration, WakeSignal};

use meridian_core::{Error, Host};
use meridian_net::PoolConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Owns the node array, the seed list, and the current partition map.
/// Auth credentials and connection dialing are injected by
/// `meridian-client`, which is the only crate that knows how to wire a
/// `Cluster` to real sockets; this crate models cluster *state*, not
/// the act of tending it over a network.
pub struct Cluster {
    seeds: Vec<Host>,
    nodes: RwLock<Vec<Arc<Node>>>,
    by_name: RwLock<HashMap<String, Arc<Node>>>,
    partitions: PartitionMapStore,
    wake: Arc<WakeSignal>,
    pool_config: PoolConfig,
    pool_shards: usize,
}

impl Cluster {
    pub fn new(seeds: Vec<Host>, pool_config: PoolConfig, pool_shards: usize) -> Self {
        Self {
            seeds,
            nodes: RwLock::new(Vec::new()),
            by_name: RwLock::new(HashMap::new()),
            partitions: PartitionMapStore::new(),
            wake: Arc::new(WakeSignal::new()),
            pool_config,
            pool_shards,
        }
    }

    pub fn seeds(&self) -> &[Host] {
        &self.seeds
    }

    pub fn wake_tend(&self) {
        self.wake.wake();
    }

    pub fn wake_signal(&self) -> Arc<WakeSignal> {
        Arc::clone(&self.wake)
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().unwrap().clone()
    }

    pub fn active_nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().unwrap().iter().filter(|n| n.is_active()).cloned().collect()
    }

    pub fn node_by_name(&self, name: &str) -> Option<Arc<Node>> {
        self.by_name.read().unwrap().get(name).cloned()
    }

    pub fn partitions(&self) -> &PartitionMapStore {
        &self.partitions
    }

    /// Publish a freshly-validated node into the cluster's node array
    /// and name index (§3: "created by validator ... published into the
    /// cluster's node array and name→node map").
    pub fn publish_node(&self, node: Arc<Node>) {
        self.by_name.write().unwrap().insert(node.name.clone(), Arc::clone(&node));
        self.nodes.write().unwrap().push(node);
    }

    fn new_node(&self, name: &str, host: Host) -> Arc<Node> {
        Arc::new(Node::new(name, host, self.pool_shards, self.pool_config))
    }

    /// §4.6 step 5: remove nodes that are inactive, have accumulated 5+
    /// failures, or are unreferenced AND hold no partitions.
    pub fn reap_dead_nodes(&self) {
        let mut nodes = self.nodes.write().unwrap();
        let mut by_name = self.by_name.write().unwrap();
        let (keep, drop): (Vec<_>, Vec<_>) = nodes.drain(..).partition(|n| {
            let unreferenced_and_idle =
                n.reference_count.load(std::sync::atomic::Ordering::Acquire) == 0 && !self.partitions.holds_partitions_for(&n.name);
            !(n.state() == NodeState::Inactive || n.eligible_for_removal() || unreferenced_and_idle)
        });
        for removed in drop {
            removed.close();
            by_name.remove(&removed.name);
        }
        *nodes = keep;
    }

    /// Validate and publish a seed/peer `host`, returning the new node
    /// on success. The actual handshake (info batch + auth) is supplied
    /// by the caller as `validate`, since this crate has no socket code.
    pub fn validate_and_publish(
        &self,
        host: Host,
        validate: impl FnOnce(&Host) -> Result<String, Error>,
    ) -> Result<Arc<Node>, Error> {
        let name = validate(&host)?;
        let node = self.new_node(&name, host);
        node.set_state(NodeState::Active);
        self.publish_node(Arc::clone(&node));
        Ok(node)
    }
}
