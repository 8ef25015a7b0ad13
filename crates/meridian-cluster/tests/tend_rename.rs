//! E2E scenario 5: a node whose reported name changes between tend
//! iterations (a cluster rename, or the client having cached a stale
//! name) is forced `Inactive` immediately rather than silently renamed
//! in place (§4.5: "if node name mismatches the cached name, force
//! Inactive immediately").

use meridian_cluster::{Cluster, NodeState};
use meridian_core::Host;
use meridian_net::PoolConfig;

/// Simulates one `Refresh` step of the tend loop: if the freshly-fetched
/// `node` info-key no longer matches the cached name, the node is
/// retired rather than renamed.
fn refresh(cluster: &Cluster, cached_name: &str, reported_name: &str) {
    let node = cluster.node_by_name(cached_name).expect("node must be published before refresh");
    if reported_name != cached_name {
        node.retire();
        return;
    }
    node.mark_refresh_success();
}

#[test]
fn name_mismatch_forces_node_inactive() {
    let cluster = Cluster::new(vec![], PoolConfig::default(), 1);
    let node = cluster
        .validate_and_publish(Host::new("10.0.0.1", 3000), |_h| Ok("OLD_NAME".to_string()))
        .unwrap();
    assert_eq!(node.state(), NodeState::Active);

    refresh(&cluster, "OLD_NAME", "NEW_NAME");

    assert_eq!(node.state(), NodeState::Inactive);
}

#[test]
fn matching_name_keeps_node_active_and_resets_failures() {
    let cluster = Cluster::new(vec![], PoolConfig::default(), 1);
    let node = cluster
        .validate_and_publish(Host::new("10.0.0.1", 3000), |_h| Ok("N1".to_string()))
        .unwrap();
    node.mark_refresh_failure();
    node.mark_refresh_failure();

    refresh(&cluster, "N1", "N1");

    assert_eq!(node.state(), NodeState::Active);
    assert!(!node.eligible_for_removal());
}
