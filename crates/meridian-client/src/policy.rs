//! Policy types controlling how commands are dispatched, retried, and
//! read/written (§4.8).
//!
//! Directly adapted from the `windpike` reference client's `policy.rs`
//! in the wider example pack — field names, default constants, and doc
//! register are reused since this is exactly the policy surface a
//! client like this needs; ported from `tokio::time::{Duration,
//! Instant}` to `std::time`, since this core is blocking-first.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Common parameters used for read operations; the base every other
/// policy extends.
#[derive(Clone, Debug)]
pub struct BasePolicy {
    pub consistency_level: ConsistencyLevel,
    /// Deadline for the whole command including retries (`totalTimeout`).
    pub timeout: Duration,
    pub max_retries: Option<usize>,
    pub sleep_between_retries: Duration,
    pub socket_timeout: Duration,
    pub send_key: bool,
    pub read_mode_ap: ReadModeAp,
    pub read_mode_sc: meridian_cluster::ReadModeSc,
}

impl BasePolicy {
    pub const DEFAULT_MAX_RETRIES: usize = 2;
    pub const DEFAULT_SEND_KEY: bool = false;
    pub const DEFAULT_SLEEP_BETWEEN_RETRIES: Duration = Duration::from_millis(500);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(30);

    /// Wall-clock deadline for this command, captured at command start.
    pub fn deadline(&self) -> Option<Instant> {
        (!self.timeout.is_zero()).then(|| Instant::now() + self.timeout)
    }

    /// §4.8: `socketTimeout = min(remaining total budget, socketTimeout)`.
    pub fn effective_socket_timeout(&self, deadline: Option<Instant>) -> Duration {
        match deadline {
            Some(d) => {
                let remaining = d.saturating_duration_since(Instant::now());
                remaining.min(self.socket_timeout)
            }
            None => self.socket_timeout,
        }
    }
}

impl Default for BasePolicy {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            max_retries: Some(Self::DEFAULT_MAX_RETRIES),
            sleep_between_retries: Self::DEFAULT_SLEEP_BETWEEN_RETRIES,
            socket_timeout: Self::DEFAULT_SOCKET_TIMEOUT,
            consistency_level: ConsistencyLevel::default(),
            send_key: Self::DEFAULT_SEND_KEY,
            read_mode_ap: ReadModeAp::default(),
            read_mode_sc: meridian_cluster::ReadModeSc::Session,
        }
    }
}

impl AsRef<Self> for BasePolicy {
    fn as_ref(&self) -> &Self {
        self
    }
}

/// How many replicas a read must agree with, for `available`-mode
/// namespaces.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConsistencyLevel {
    #[default]
    One = 0,
    All = 1,
}

/// `available`-mode read behavior (as opposed to strong-consistency's
/// `ReadModeSc`, which lives in `meridian-cluster` since it drives
/// replica-policy remapping directly).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReadModeAp {
    /// Read from the master replica only. **Default**.
    #[default]
    One,
    /// Read from all replicas and return the first response.
    All,
}

/// Parameters for `Client::new`. Derives `serde::{Serialize,
/// Deserialize}` so a host application can load it from a TOML file,
/// the way `warp-core::config::WarpConfig::from_file` does.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ClientPolicy {
    pub timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub max_conns_per_node: u32,
    pub conn_pools_per_node: usize,
    pub fail_if_not_connected: bool,
    pub buffer_reclaim_threshold: usize,
    pub tend_interval: Duration,
    pub error_rate_window: u64,
    pub ip_map: Option<HashMap<String, String>>,
    pub use_services_alternate: bool,
    pub cluster_name: Option<String>,
    pub rack_id: Option<String>,
}

impl ClientPolicy {
    pub const DEFAULT_BUFFER_RECLAIM_THRESHOLD: usize = 65536;
    pub const DEFAULT_FAIL_IF_NOT_CONNECTED: bool = true;
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(55);
    pub const DEFAULT_MAX_CONNS_PER_NODE: u32 = 256;
    pub const DEFAULT_CONN_POOLS_PER_NODE: usize = 1;
    pub const DEFAULT_TEND_INTERVAL: Duration = Duration::from_secs(1);
    pub const DEFAULT_ERROR_RATE_WINDOW: u64 = 100;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_USE_SERVICES_ALTERNATE: bool = false;
}

impl ClientPolicy {
    /// Load a policy from a TOML file, mirroring
    /// `warp-core::config::WarpConfig::from_file` — except returning
    /// `meridian_core::Error` rather than `anyhow::Error`, since
    /// library crates in this workspace never surface `anyhow`.
    pub fn from_file(path: &std::path::Path) -> Result<Self, meridian_core::Error> {
        let content = std::fs::read_to_string(path).map_err(meridian_core::Error::Io)?;
        toml::from_str(&content).map_err(|e| meridian_core::Error::Configuration(e.to_string()))
    }
}

impl Default for ClientPolicy {
    fn default() -> Self {
        Self {
            timeout: Some(Self::DEFAULT_TIMEOUT),
            idle_timeout: Some(Self::DEFAULT_IDLE_TIMEOUT),
            max_conns_per_node: Self::DEFAULT_MAX_CONNS_PER_NODE,
            conn_pools_per_node: Self::DEFAULT_CONN_POOLS_PER_NODE,
            fail_if_not_connected: Self::DEFAULT_FAIL_IF_NOT_CONNECTED,
            buffer_reclaim_threshold: Self::DEFAULT_BUFFER_RECLAIM_THRESHOLD,
            tend_interval: Self::DEFAULT_TEND_INTERVAL,
            error_rate_window: Self::DEFAULT_ERROR_RATE_WINDOW,
            ip_map: None,
            use_services_alternate: Self::DEFAULT_USE_SERVICES_ALTERNATE,
            cluster_name: None,
            rack_id: None,
        }
    }
}

/// Parameters for all batch operations.
#[derive(Clone, Debug)]
pub struct BatchPolicy {
    pub base_policy: BasePolicy,
    pub concurrency: Concurrency,
    pub allow_inline: bool,
    pub send_set_name: bool,
}

impl BatchPolicy {
    pub const DEFAULT_ALLOW_INLINE: bool = true;
    pub const DEFAULT_SEND_SET_NAME: bool = false;
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            base_policy: BasePolicy::default(),
            concurrency: Concurrency::default(),
            allow_inline: Self::DEFAULT_ALLOW_INLINE,
            send_set_name: Self::DEFAULT_SEND_SET_NAME,
        }
    }
}

impl AsRef<BasePolicy> for BatchPolicy {
    fn as_ref(&self) -> &BasePolicy {
        &self.base_policy
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Concurrency {
    #[default]
    Sequential,
    Parallel(usize),
}

/// Parameters for foreground/background scans.
#[derive(Clone, Debug)]
pub struct ScanPolicy {
    pub base_policy: BasePolicy,
    pub max_records: Option<u64>,
    pub records_per_second: Option<u32>,
    pub concurrent_nodes: bool,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            base_policy: BasePolicy::default(),
            max_records: None,
            records_per_second: None,
            concurrent_nodes: true,
        }
    }
}

impl AsRef<BasePolicy> for ScanPolicy {
    fn as_ref(&self) -> &BasePolicy {
        &self.base_policy
    }
}

/// Parameters for secondary-index queries (foreground and background).
#[derive(Clone, Debug)]
pub struct QueryPolicy {
    pub base_policy: BasePolicy,
    pub max_concurrent_nodes: usize,
    pub records_per_second: Option<u32>,
    pub fail_on_cluster_change: bool,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            base_policy: BasePolicy::default(),
            max_concurrent_nodes: 0,
            records_per_second: None,
            fail_on_cluster_change: true,
        }
    }
}

impl AsRef<BasePolicy> for QueryPolicy {
    fn as_ref(&self) -> &BasePolicy {
        &self.base_policy
    }
}

/// Parameters for write/delete/operate commands.
#[derive(Clone, Debug)]
pub struct WritePolicy {
    pub base_policy: BasePolicy,
    pub record_exists_action: RecordExistsAction,
    pub generation_policy: GenerationPolicy,
    pub commit_level: CommitLevel,
    pub generation: u32,
    pub expiration: Expiration,
    pub respond_per_each_op: bool,
    pub durable_delete: bool,
}

impl WritePolicy {
    pub fn new(generation: u32, expiration: Expiration) -> Self {
        Self {
            generation,
            expiration,
            ..Self::default()
        }
    }
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            base_policy: BasePolicy::default(),
            record_exists_action: RecordExistsAction::default(),
            generation_policy: GenerationPolicy::default(),
            commit_level: CommitLevel::default(),
            generation: 0,
            expiration: Expiration::default(),
            respond_per_each_op: false,
            durable_delete: false,
        }
    }
}

impl AsRef<BasePolicy> for WritePolicy {
    fn as_ref(&self) -> &BasePolicy {
        &self.base_policy
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum RecordExistsAction {
    #[default]
    Update = 0,
    UpdateOnly,
    Replace,
    ReplaceOnly,
    CreateOnly,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum GenerationPolicy {
    #[default]
    None = 0,
    ExpectGenEqual,
    ExpectGenGreater,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum CommitLevel {
    #[default]
    All = 0,
    Master,
}

#[derive(Clone, Copy, Debug, Default)]
pub enum Expiration {
    Seconds(u32),
    #[default]
    NamespaceDefault,
    Never,
    DontUpdate,
}

impl From<Expiration> for u32 {
    fn from(value: Expiration) -> Self {
        match value {
            Expiration::Seconds(secs) => secs,
            Expiration::NamespaceDefault => 0,
            Expiration::Never => u32::MAX,
            Expiration::DontUpdate => u32::MAX - 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_policy_defaults_match_documented_constants() {
        let policy = BasePolicy::default();
        assert_eq!(policy.max_retries, Some(2));
        assert_eq!(policy.timeout, Duration::from_secs(30));
    }

    #[test]
    fn deadline_is_none_for_zero_timeout() {
        let mut policy = BasePolicy::default();
        policy.timeout = Duration::ZERO;
        assert!(policy.deadline().is_none());
    }

    #[test]
    fn effective_socket_timeout_clamps_to_remaining_budget() {
        let mut policy = BasePolicy::default();
        policy.socket_timeout = Duration::from_secs(30);
        let deadline = Some(Instant::now() + Duration::from_millis(10));
        let effective = policy.effective_socket_timeout(deadline);
        assert!(effective <= Duration::from_secs(1));
    }

    #[test]
    fn expiration_converts_to_wire_u32() {
        assert_eq!(u32::from(Expiration::Seconds(60)), 60);
        assert_eq!(u32::from(Expiration::NamespaceDefault), 0);
        assert_eq!(u32::from(Expiration::Never), u32::MAX);
    }

    #[test]
    fn write_policy_new_sets_generation_and_expiration() {
        let policy = WritePolicy::new(7, Expiration::Seconds(120));
        assert_eq!(policy.generation, 7);
        assert!(matches!(policy.expiration, Expiration::Seconds(120)));
    }

    #[test]
    fn client_policy_round_trips_through_a_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meridian.toml");
        let mut policy = ClientPolicy::default();
        policy.cluster_name = Some("prod-east".to_string());
        policy.max_conns_per_node = 64;
        std::fs::write(&path, toml::to_string_pretty(&policy).unwrap()).unwrap();

        let loaded = ClientPolicy::from_file(&path).unwrap();
        assert_eq!(loaded.cluster_name.as_deref(), Some("prod-east"));
        assert_eq!(loaded.max_conns_per_node, 64);
    }

    #[test]
    fn client_policy_from_file_surfaces_a_configuration_error_on_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not = [valid toml").unwrap();
        let err = ClientPolicy::from_file(&path).unwrap_err();
        assert_eq!(err.kind(), meridian_core::ErrorKind::Configuration);
    }
}
