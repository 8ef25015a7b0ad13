//! Single-seed cluster bootstrap: one seed host validates successfully
//! and becomes the sole active node (§4.6 step 2).

use meridian_cluster::{Cluster, NodeState};
use meridian_core::{Error, Host};
use meridian_net::PoolConfig;

#[test]
fn single_seed_becomes_active_node() {
    let seed = Host::new("10.0.0.1", 3000);
    let cluster = Cluster::new(vec![seed.clone()], PoolConfig::default(), 1);

    let node = cluster
        .validate_and_publish(seed, |_host| Ok("BB9020011AC4202".to_string()))
        .expect("seed validation should succeed");

    assert_eq!(node.state(), NodeState::Active);
    assert_eq!(cluster.active_nodes().len(), 1);
    assert!(cluster.node_by_name("BB9020011AC4202").is_some());
}

#[test]
fn all_seeds_failing_surfaces_an_error() {
    let seeds = vec![Host::new("10.0.0.1", 3000), Host::new("10.0.0.2", 3000)];
    let cluster = Cluster::new(seeds.clone(), PoolConfig::default(), 1);

    let mut last_err = None;
    for seed in &seeds {
        match cluster.validate_and_publish(seed.clone(), |_h| {
            Err(Error::Connection("connection refused".into()))
        }) {
            Ok(_) => panic!("expected validation to fail for every seed"),
            Err(e) => last_err = Some(e),
        }
    }

    assert!(last_err.is_some());
    assert_eq!(cluster.nodes().len(), 0);
}
