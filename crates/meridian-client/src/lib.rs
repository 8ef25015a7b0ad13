//! meridian-client — policies, the command-dispatch state machine, the
//! batch planner, scan/query partition tracking, and the public
//! `Client` facade (§4.8).

pub mod batch;
pub mod client;
pub mod command;
pub mod policy;
pub mod scan;

pub use batch::{plan_batch, reassemble, BatchKeyEntry, NodeGroup};
pub use client::Client;
pub use command::{run_command, Dispatch, ResolveNode};
pub use policy::{
    BasePolicy, BatchPolicy, ClientPolicy, CommitLevel, Concurrency, ConsistencyLevel, Expiration, GenerationPolicy, QueryPolicy,
    ReadModeAp, RecordExistsAction, ScanPolicy, WritePolicy,
};
pub use scan::PartitionTracker;
