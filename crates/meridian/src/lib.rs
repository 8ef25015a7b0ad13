//! MeridianDB client — a single-crate facade over `meridian-client` and
//! the value types an application actually needs at the call site.
//! Mirrors `warpd`'s role as the one binary that wires every other
//! crate together, except the product here is a library surface
//! rather than a standalone daemon (§6).

pub use meridian_client::{
    plan_batch, reassemble, run_command, BasePolicy, BatchKeyEntry, BatchPolicy, Client, ClientPolicy, CommitLevel, Concurrency,
    ConsistencyLevel, Dispatch, Expiration, GenerationPolicy, NodeGroup, PartitionTracker, QueryPolicy, ReadModeAp,
    RecordExistsAction, ResolveNode, ScanPolicy, WritePolicy,
};

pub use meridian_cluster::{Cluster, Node, NodeState, ReadModeSc, ReplicaPolicy};

pub use meridian_auth::{AuthMode, SessionToken};

pub use meridian_core::{CommandError, Error, ErrorKind, FeatureBits, Host, Key, Result, PARTITION_COUNT};
