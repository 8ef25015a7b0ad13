//! The public `Client` facade (§4.8): wires `meridian-cluster`,
//! `meridian-net`, `meridian-auth`, and `meridian-proto` together behind
//! one entry point, the way `warpd`'s `run_standalone` wires a runtime,
//! a scheduler, and a proxy together behind one process entry point —
//! except this is a library constructor, not a binary subcommand.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meridian_auth::{AuthMode, LoginState, SessionStore};
use meridian_cluster::{Cluster, Node, NodeState};
use meridian_core::{Error, Host};
use meridian_net::Connection;
use meridian_proto::{compress, frame, info, partitions, Frame, FrameType};

use crate::policy::ClientPolicy;

/// Dial a plain connection. TLS dialing plugs in at the same call site
/// via `Connection::connect_tls`; this crate's policy surface doesn't
/// yet expose a TLS config slot, so only the plain path is wired here
/// (see `DESIGN.md`).
fn dial(host: &Host, connect_timeout: Duration) -> Result<Connection, Error> {
    Connection::connect_plain(host, connect_timeout)
}

/// Send one info request and parse its reply. Used for both the
/// bootstrap handshake and every tend-loop refresh.
fn info_request(conn: &mut Connection, keys: &[&str], socket_timeout: Duration) -> Result<HashMap<String, String>, Error> {
    conn.set_timeout(Some(socket_timeout))?;
    let payload = info::build_request(keys);
    let frame = Frame::new(FrameType::Uncompressed, payload);
    conn.write_all(&frame.encode())?;

    let mut header_buf = [0u8; 8];
    conn.read_fully(&mut header_buf)?;
    let (_version, frame_type, len) = frame::decode_header(&header_buf)?;
    let mut body = vec![0u8; len as usize];
    conn.read_fully(&mut body)?;

    let plaintext = match frame_type {
        FrameType::Uncompressed => body,
        FrameType::Compressed => compress::inflate(&body)?,
    };
    info::parse_reply(&plaintext)
}

/// Admin opcodes for the dedicated login/authenticate framing (§4.4).
/// This does not share a buffer or header shape with the data plane's
/// 22-byte `MessageHeader` — the spec calls out that login uses "a
/// dedicated short-lived admin framing" and leaves its exact layout
/// unspecified, so this is the minimal shape that carries the
/// `FieldTlv`s `meridian-auth` already builds: one op byte, one result
/// byte, a field count, then the fields themselves.
mod admin {
    pub const OP_LOGIN: u8 = 0;
    pub const OP_AUTHENTICATE: u8 = 1;
}

fn send_admin_command(
    conn: &mut Connection,
    op: u8,
    fields: &[meridian_proto::FieldTlv],
    socket_timeout: Duration,
) -> Result<(u8, HashMap<u8, Vec<u8>>), Error> {
    conn.set_timeout(Some(socket_timeout))?;
    let mut payload = vec![op, 0, fields.len() as u8];
    for field in fields {
        field.encode_into(&mut payload);
    }
    let frame = Frame::new(FrameType::Uncompressed, payload);
    conn.write_all(&frame.encode())?;

    let mut header_buf = [0u8; 8];
    conn.read_fully(&mut header_buf)?;
    let (_version, frame_type, len) = frame::decode_header(&header_buf)?;
    let mut body = vec![0u8; len as usize];
    conn.read_fully(&mut body)?;
    let body = match frame_type {
        FrameType::Uncompressed => body,
        FrameType::Compressed => compress::inflate(&body)?,
    };

    if body.len() < 3 {
        return Err(Error::Protocol("truncated admin reply".into()));
    }
    let result = body[1];
    let field_count = body[2] as usize;
    let mut offset = 3;
    let mut out_fields = HashMap::new();
    for _ in 0..field_count {
        let (tlv, consumed) = meridian_proto::FieldTlv::decode(&body[offset..])?;
        out_fields.insert(tlv.field_type, tlv.data);
        offset += consumed;
    }
    Ok((result, out_fields))
}

/// Exchange credentials for a session token over a freshly-dialed
/// connection, per §4.4's "Login" operation.
fn login(conn: &mut Connection, auth: &AuthMode, socket_timeout: Duration) -> Result<meridian_auth::SessionToken, Error> {
    let (user, credential): (String, Vec<u8>) = match auth {
        AuthMode::Internal { user, password } => {
            // Internal mode never puts the plaintext password on the
            // wire; it is hashed with a slow KDF first (§4.3).
            let salt = meridian_auth::kdf::generate_salt();
            let hashed = meridian_auth::kdf::hash_password(password, &salt)?;
            (user.clone(), hashed.into_bytes())
        }
        AuthMode::External { user, password } => (user.clone(), password.clone().into_bytes()),
        AuthMode::Pki => return Err(Error::Authentication("PKI mode authenticates via the TLS client certificate, not Login".into())),
    };
    let fields = meridian_auth::login_fields(&user, &credential);
    let (result, reply_fields) = send_admin_command(conn, admin::OP_LOGIN, &fields, socket_timeout)?;
    if result != 0 {
        return Err(Error::Authentication(format!("login rejected with result code {result}")));
    }
    let token = reply_fields
        .get(&meridian_auth::admin_field::SESSION_TOKEN)
        .ok_or_else(|| Error::Authentication("login reply missing session token".into()))?
        .clone();
    let ttl_seconds = reply_fields
        .get(&meridian_auth::admin_field::SESSION_TTL)
        .and_then(|bytes| bytes.get(0..4))
        .map(|bytes| u32::from_be_bytes(bytes.try_into().unwrap()))
        .unwrap_or(0);
    Ok(meridian_auth::SessionToken {
        token,
        expires_at: meridian_auth::expiration_from_ttl_seconds(ttl_seconds),
    })
}

/// Present a session token on a freshly-dialed connection, per §4.4's
/// "Authenticate" operation.
fn authenticate(conn: &mut Connection, user: &str, token: &[u8], socket_timeout: Duration) -> Result<(), Error> {
    let fields = meridian_auth::authenticate_fields(user, token);
    let (result, _) = send_admin_command(conn, admin::OP_AUTHENTICATE, &fields, socket_timeout)?;
    if result != 0 {
        return Err(Error::Authentication(format!("authenticate rejected with result code {result}")));
    }
    Ok(())
}

/// The public entry point: owns the cluster, the auth session, and the
/// dedicated tend thread for as long as the client is alive.
pub struct Client {
    cluster: Arc<Cluster>,
    auth: AuthMode,
    session: Arc<SessionStore>,
    login_state: Arc<LoginState>,
    policy: ClientPolicy,
    closed: Arc<AtomicBool>,
    tend_handle: Option<std::thread::JoinHandle<()>>,
}

impl Client {
    /// Connect to `hosts`, validating each as a seed (§4.6 step 2), then
    /// start the dedicated tend thread. Fails only if every seed fails
    /// and `policy.fail_if_not_connected` is set.
    pub fn new(policy: ClientPolicy, hosts: Vec<Host>, auth: AuthMode) -> Result<Self, Error> {
        if hosts.is_empty() {
            return Err(Error::Configuration("at least one seed host is required".into()));
        }
        let connect_timeout = policy.timeout.unwrap_or(Duration::from_secs(30));
        let pool_config = meridian_net::PoolConfig {
            min_size: 1,
            max_size: policy.max_conns_per_node as usize,
        };
        let cluster = Arc::new(Cluster::new(hosts.clone(), pool_config, policy.conn_pools_per_node));
        let session = Arc::new(SessionStore::new());
        let login_state = Arc::new(LoginState::new());

        let mut last_err = None;
        let mut validated_any = false;
        for host in &hosts {
            let validation = cluster.validate_and_publish(host.clone(), |h| {
                let mut conn = dial(h, connect_timeout)?;
                if auth.requires_tls() {
                    tracing::debug!(host = %h, "auth mode requires TLS; plain dial used (no policy TLS config wired yet)");
                }
                if !matches!(auth, AuthMode::Pki) && auth_needs_login(&auth) {
                    let token = login(&mut conn, &auth, policy.timeout.unwrap_or(Duration::from_secs(30)))?;
                    session.set(token);
                }
                let reply = info_request(&mut conn, &["node"], policy.timeout.unwrap_or(Duration::from_secs(30)))?;
                reply
                    .get("node")
                    .cloned()
                    .ok_or_else(|| Error::Protocol("info reply missing 'node' key".into()))
            });
            match validation {
                Ok(_) => validated_any = true,
                Err(e) => last_err = Some(e),
            }
        }

        if !validated_any {
            if policy.fail_if_not_connected {
                return Err(last_err.unwrap_or(Error::Connection("no seed host could be validated".into())));
            }
        }

        let closed = Arc::new(AtomicBool::new(false));
        let tend_cluster = Arc::clone(&cluster);
        let tend_closed = Arc::clone(&closed);
        let wake = cluster.wake_signal();
        let tend_interval = policy.tend_interval;
        let error_rate_window = policy.error_rate_window;
        let handle = meridian_cluster::tend::spawn(
            wake,
            tend_interval,
            move || tend_closed.load(Ordering::Acquire),
            move |iteration| {
                tend_once(&tend_cluster, connect_timeout);
                if iteration.should_balance_pools() {
                    // Pool shrink-to-min is a per-node op; nodes own their
                    // pools directly, so nothing else to coordinate here.
                    for node in tend_cluster.nodes() {
                        node.pools.scale_down_to_min();
                    }
                }
                if iteration.should_reset_error_window(error_rate_window) {
                    for node in tend_cluster.nodes() {
                        node.failures.store(0, Ordering::Release);
                    }
                }
            },
        );

        Ok(Self {
            cluster,
            auth,
            session,
            login_state,
            policy,
            closed,
            tend_handle: Some(handle),
        })
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn policy(&self) -> &ClientPolicy {
        &self.policy
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn login_state(&self) -> &LoginState {
        &self.login_state
    }

    pub fn auth_mode(&self) -> &AuthMode {
        &self.auth
    }

    pub fn is_connected(&self) -> bool {
        !self.cluster.active_nodes().is_empty()
    }

    /// Stop the tend thread and release resources. Idempotent.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
        self.cluster.wake_tend();
        if let Some(handle) = self.tend_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

fn auth_needs_login(auth: &AuthMode) -> bool {
    !matches!(auth, AuthMode::Pki)
}

/// One full tend-loop iteration (§4.6 steps 1, 3-6): clear reference
/// counts, refresh every known node's `node`/generation info, discover
/// any newly-listed peers, rebuild the partition map for nodes whose
/// `partition-generation` advanced, then reap whatever no longer
/// belongs.
fn tend_once(cluster: &Cluster, connect_timeout: Duration) {
    for node in cluster.nodes() {
        node.reference_count.store(0, Ordering::Release);
    }

    let mut any_peers_changed = false;
    for node in cluster.nodes() {
        if node.state() == NodeState::Closed {
            continue;
        }
        match refresh_node(&node, connect_timeout) {
            Ok(reported_name) => {
                if reported_name != node.name {
                    tracing::warn!(cached = %node.name, reported = %reported_name, "node name mismatch; forcing inactive");
                    node.retire();
                } else {
                    node.mark_refresh_success();
                    node.set_state(NodeState::Active);
                }
            }
            Err(e) => {
                let failures = node.mark_refresh_failure();
                tracing::debug!(node = %node.name, failures, error = %e, "tend refresh failed");
            }
        }
        if node.rebalance_changed.swap(false, Ordering::AcqRel) {
            any_peers_changed = true;
        }
    }

    if any_peers_changed {
        discover_peers(cluster, connect_timeout);
    }

    rebuild_partition_map(cluster, connect_timeout);

    cluster.reap_dead_nodes();
}

/// §4.6 step 3: re-fetch `node`, `partition-generation`, and
/// `peers-generation`, marking `partition_changed`/`rebalance_changed`
/// when the respective generation advanced and detecting a backward
/// `peers-generation` as a quick restart.
fn refresh_node(node: &Arc<Node>, connect_timeout: Duration) -> Result<String, Error> {
    let mut conn = dial(&node.host, connect_timeout)?;
    let reply = info_request(&mut conn, &["node", "partition-generation", "peers-generation"], connect_timeout)?;
    let reported_name = reply.get("node").cloned().ok_or_else(|| Error::Protocol("info reply missing 'node' key".into()))?;

    if let Some(raw) = reply.get("partition-generation") {
        let gen: u32 = raw.parse().map_err(|e| Error::Protocol(format!("invalid partition-generation: {e}")))?;
        let prev = node.partition_generation.swap(gen, Ordering::AcqRel);
        if gen != prev {
            node.partition_changed.store(true, Ordering::Release);
        }
    }
    if let Some(raw) = reply.get("peers-generation") {
        let gen: u32 = raw.parse().map_err(|e| Error::Protocol(format!("invalid peers-generation: {e}")))?;
        let prev = node.peers_generation.load(Ordering::Acquire);
        if node.observe_peers_generation(gen) {
            tracing::info!(node = %node.name, "peers-generation moved backward; treating as quick restart");
        }
        if gen != prev {
            node.rebalance_changed.store(true, Ordering::Release);
        }
    }

    Ok(reported_name)
}

/// §4.6 step 4: fetch `peers-clear-std` from every active node and, for
/// each referenced peer, either bump its `reference_count` (already
/// known) or contact and publish it (not yet known). Hosts that already
/// failed a dial this iteration are not retried for a different peer.
fn discover_peers(cluster: &Cluster, connect_timeout: Duration) {
    let mut failed_hosts: HashSet<(String, u16)> = HashSet::new();

    for node in cluster.nodes() {
        if !node.is_active() {
            continue;
        }
        let payload = match fetch_peers(&node, connect_timeout) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(node = %node.name, error = %e, "peers fetch failed");
                continue;
            }
        };
        for peer in &payload.peers {
            if let Some(existing) = cluster.node_by_name(&peer.node_name) {
                existing.reference_count.fetch_add(1, Ordering::AcqRel);
                continue;
            }
            match contact_peer(cluster, peer, payload.default_port, connect_timeout, &mut failed_hosts) {
                Ok(new_node) => {
                    new_node.reference_count.fetch_add(1, Ordering::AcqRel);
                }
                Err(e) => {
                    tracing::debug!(peer = %peer.node_name, error = %e, "peer contact failed");
                }
            }
        }
    }
}

fn fetch_peers(node: &Arc<Node>, connect_timeout: Duration) -> Result<info::PeersPayload, Error> {
    let mut conn = dial(&node.host, connect_timeout)?;
    let reply = info_request(&mut conn, &["peers-clear-std"], connect_timeout)?;
    let payload = reply
        .get("peers-clear-std")
        .ok_or_else(|| Error::Protocol("info reply missing 'peers-clear-std' key".into()))?;
    info::parse_peers(payload)
}

/// Try each of `peer`'s addresses in order, skipping ones already marked
/// failed this iteration, stopping at the first successful validation.
fn contact_peer(
    cluster: &Cluster,
    peer: &info::PeerEntry,
    default_port: u16,
    connect_timeout: Duration,
    failed_hosts: &mut HashSet<(String, u16)>,
) -> Result<Arc<Node>, Error> {
    let mut last_err = None;
    for (addr, port) in &peer.hosts {
        let port = port.unwrap_or(default_port);
        if failed_hosts.contains(&(addr.clone(), port)) {
            continue;
        }
        let mut host = Host::new(addr.clone(), port);
        if let Some(tls_name) = &peer.tls_name {
            host = host.with_tls_name(tls_name.clone());
        }
        let result = cluster.validate_and_publish(host, |h| {
            let mut conn = dial(h, connect_timeout)?;
            let reply = info_request(&mut conn, &["node"], connect_timeout)?;
            reply.get("node").cloned().ok_or_else(|| Error::Protocol("info reply missing 'node' key".into()))
        });
        match result {
            Ok(node) => return Ok(node),
            Err(e) => {
                failed_hosts.insert((addr.clone(), port));
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Connection(format!("peer {} has no addresses to try", peer.node_name))))
}

/// §4.6 step 6: fetch `replicas` from every node whose
/// `partition_changed` flag is set, merging each into a single
/// copy-on-write rebuild of the partition map published once at the end.
fn rebuild_partition_map(cluster: &Cluster, connect_timeout: Duration) {
    let changed: Vec<Arc<Node>> = cluster
        .nodes()
        .into_iter()
        .filter(|n| n.is_active() && n.partition_changed.swap(false, Ordering::AcqRel))
        .collect();
    if changed.is_empty() {
        return;
    }

    let mut builder = cluster.partitions().begin_update();
    for node in &changed {
        match fetch_replicas(node, connect_timeout) {
            Ok(namespaces) => {
                for ns in &namespaces {
                    builder.merge_namespace(ns, node);
                }
            }
            Err(e) => {
                tracing::debug!(node = %node.name, error = %e, "replicas fetch failed");
            }
        }
    }
    cluster.partitions().publish(builder);
}

fn fetch_replicas(node: &Arc<Node>, connect_timeout: Duration) -> Result<Vec<partitions::NamespaceReplicas>, Error> {
    let mut conn = dial(&node.host, connect_timeout)?;
    let reply = info_request(&mut conn, &["replicas"], connect_timeout)?;
    let payload = reply.get("replicas").ok_or_else(|| Error::Protocol("info reply missing 'replicas' key".into()))?;
    partitions::parse_replicas_payload(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fails_fast_on_empty_host_list() {
        let err = Client::new(ClientPolicy::default(), vec![], AuthMode::Pki).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn new_surfaces_connection_error_when_every_seed_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let host = Host::new("127.0.0.1", addr.port());
        let result = Client::new(ClientPolicy::default(), vec![host], AuthMode::Pki);
        assert!(result.is_err());
    }

    /// Accept one connection on `listener`, read its info request, and
    /// reply with the literal `key\tvalue\n` text in `reply`.
    fn respond_once(listener: &std::net::TcpListener, reply: &str) {
        use std::io::{Read, Write};
        let (mut stream, _) = listener.accept().unwrap();
        let mut header = [0u8; 8];
        stream.read_exact(&mut header).unwrap();
        let (_version, _frame_type, len) = frame::decode_header(&header).unwrap();
        let mut body = vec![0u8; len as usize];
        stream.read_exact(&mut body).unwrap();
        let out = Frame::new(FrameType::Uncompressed, reply.as_bytes().to_vec());
        stream.write_all(&out.encode()).unwrap();
    }

    /// End-to-end: a single node whose `partition-generation` and
    /// `peers-generation` have both advanced drives `tend_once` through
    /// every real step (§4.6 steps 3-6) — peers discovery and the actual
    /// partition-map rebuild, not a simplified stand-in.
    #[test]
    fn tend_once_discovers_peers_and_rebuilds_partition_map() {
        use meridian_proto::partitions::Bitmap;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut bitmap = Bitmap::zeroed();
        bitmap.set(0);
        let replicas_reply = format!("replicas\ttest:1,1,{};\n", bitmap.to_base64());

        let server = std::thread::spawn(move || {
            respond_once(&listener, "node\tN1\npartition-generation\t1\npeers-generation\t1\n");
            respond_once(&listener, "peers-clear-std\t[1,3000,[]]\n");
            respond_once(&listener, &replicas_reply);
        });

        let cluster = Cluster::new(vec![], meridian_net::PoolConfig::default(), 1);
        let host = Host::new("127.0.0.1", addr.port());
        let node = cluster.validate_and_publish(host, |_h| Ok("N1".to_string())).unwrap();
        assert_eq!(node.state(), NodeState::Active);

        tend_once(&cluster, Duration::from_secs(2));
        server.join().unwrap();

        let snapshot = cluster.partitions().snapshot();
        let partitions = snapshot.get("test").expect("replicas fetch should have populated the namespace");
        assert_eq!(partitions.regimes[0], 1);
        assert_eq!(partitions.replicas[0][0].as_ref().unwrap().name, "N1");
    }
}
