//! A single cluster node: identity, feature bits, generation counters,
//! and lifecycle state (§4.5).
//!
//! Grounded on `warpgrid-cluster::membership`'s `Member`/`NodeInfo`
//! shape (heartbeat-driven liveness, dead-node reaping after a failure
//! threshold) — here the "heartbeat" is the tend loop's periodic info
//! batch rather than a gRPC heartbeat RPC.

use meridian_core::{FeatureBits, Host};
use meridian_net::NodeConnPools;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::RwLock;

/// Node lifecycle state, an exact mirror of the state list in §4.5.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeState {
    Validating = 0,
    Active = 1,
    Inactive = 2,
    Closed = 3,
}

impl NodeState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => NodeState::Validating,
            1 => NodeState::Active,
            2 => NodeState::Inactive,
            _ => NodeState::Closed,
        }
    }
}

/// After this many consecutive failed refresh steps, a node is eligible
/// for removal from the cluster.
pub const FAILURE_REMOVAL_THRESHOLD: u32 = 5;

/// One node known to the cluster. Connection pools and the rack map are
/// each owned exclusively by this node and replaced wholesale rather
/// than mutated in place.
pub struct Node {
    pub name: String,
    pub host: Host,
    pub aliases: RwLock<Vec<Host>>,
    pub features: RwLock<FeatureBits>,
    state: AtomicU8,
    pub failures: AtomicU32,
    pub peers_generation: AtomicU32,
    pub partition_generation: AtomicU32,
    pub rebalance_generation: AtomicU32,
    pub error_generation: AtomicU32,
    pub racks: RwLock<HashMap<String, u32>>,
    pub pools: NodeConnPools,
    /// Set by a tend iteration when this node's `partition-generation`
    /// advanced since last seen, so the partition map rebuild step knows
    /// to fetch `replicas` from it this round.
    pub partition_changed: std::sync::atomic::AtomicBool,
    /// Set when `peers-generation` advanced.
    pub rebalance_changed: std::sync::atomic::AtomicBool,
    /// How many other nodes' peer lists currently reference this node,
    /// reset to zero at the start of every tend iteration.
    pub reference_count: AtomicU32,
}

impl Node {
    pub fn new(name: impl Into<String>, host: Host, pool_shards: usize, pool_config: meridian_net::PoolConfig) -> Self {
        Self {
            name: name.into(),
            host,
            aliases: RwLock::new(Vec::new()),
            features: RwLock::new(FeatureBits::empty()),
            state: AtomicU8::new(NodeState::Validating as u8),
            failures: AtomicU32::new(0),
            peers_generation: AtomicU32::new(0),
            partition_generation: AtomicU32::new(0),
            rebalance_generation: AtomicU32::new(0),
            error_generation: AtomicU32::new(0),
            racks: RwLock::new(HashMap::new()),
            pools: NodeConnPools::new(pool_shards, pool_config),
            partition_changed: std::sync::atomic::AtomicBool::new(false),
            rebalance_changed: std::sync::atomic::AtomicBool::new(false),
            reference_count: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: NodeState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Used by the data plane; never blocks on the tend thread.
    pub fn is_active(&self) -> bool {
        self.state() == NodeState::Active
    }

    pub fn mark_refresh_success(&self) {
        self.failures.store(0, Ordering::Release);
    }

    pub fn mark_refresh_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// §4.5: eligible for removal after 5 consecutive refresh failures.
    pub fn eligible_for_removal(&self) -> bool {
        self.failures.load(Ordering::Acquire) >= FAILURE_REMOVAL_THRESHOLD
    }

    /// `Active -> Inactive` per a name mismatch, a dead refresh, or
    /// because it's unreferenced and holds no partitions; also reflected
    /// into `state`.
    pub fn retire(&self) {
        self.set_state(NodeState::Inactive);
    }

    pub fn close(&self) {
        self.set_state(NodeState::Closed);
    }

    /// §4.5: "quick restart" detection — peers-generation moved
    /// backward relative to the last observed value.
    pub fn observe_peers_generation(&self, new_gen: u32) -> bool {
        let prev = self.peers_generation.swap(new_gen, Ordering::AcqRel);
        new_gen < prev
    }
}
