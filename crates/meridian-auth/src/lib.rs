//! meridian-auth — credential modes, login/authenticate, and session
//! token lifecycle (§4.3).

pub mod kdf;

use meridian_core::Error;
use meridian_proto::message::FieldTlv;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Admin field type tags, distinct from the data-plane field types in
/// `meridian-proto::message` — the admin framing is a dedicated,
/// short-lived exchange that never shares buffers with the data plane.
pub mod admin_field {
    pub const USER: u8 = 0;
    pub const CREDENTIAL: u8 = 3;
    pub const SESSION_TOKEN: u8 = 17;
    pub const SESSION_TTL: u8 = 18;
}

/// How this client authenticates to the cluster.
#[derive(Clone, Debug)]
pub enum AuthMode {
    /// Username + password, hashed with a slow KDF before ever touching
    /// the wire.
    Internal { user: String, password: String },
    /// Username + clear-text password; requires TLS. The password is
    /// kept in memory and sent on the wire as-is.
    External { user: String, password: String },
    /// Identity comes entirely from the TLS client certificate; no
    /// user/password is held at all.
    Pki,
}

impl AuthMode {
    pub fn requires_tls(&self) -> bool {
        matches!(self, AuthMode::External { .. } | AuthMode::Pki)
    }
}

/// A session token and the instant it stops being valid.
#[derive(Clone, Debug)]
pub struct SessionToken {
    pub token: Vec<u8>,
    pub expires_at: Instant,
}

impl SessionToken {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Monotonic login-in-flight flag: `0 = idle`, `1 = in-flight`. Ensures
/// only one login is ever outstanding per node at a time.
#[derive(Default)]
pub struct LoginState {
    flag: AtomicU8,
}

const IDLE: u8 = 0;
const IN_FLIGHT: u8 = 1;

impl LoginState {
    pub fn new() -> Self {
        Self { flag: AtomicU8::new(IDLE) }
    }

    /// Attempt to transition `idle -> in-flight`. Returns `true` if this
    /// call won the race and should perform the login; `false` means
    /// another thread is already logging in.
    pub fn try_begin_login(&self) -> bool {
        self.flag
            .compare_exchange(IDLE, IN_FLIGHT, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Transition back to idle once a login attempt (success or
    /// failure) has completed.
    pub fn end_login(&self) {
        self.flag.store(IDLE, Ordering::Release);
    }

    pub fn is_in_flight(&self) -> bool {
        self.flag.load(Ordering::Acquire) == IN_FLIGHT
    }
}

/// Holds the current session token for one node, replaced wholesale on
/// every successful login.
#[derive(Default)]
pub struct SessionStore {
    current: RwLock<Option<SessionToken>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self { current: RwLock::new(None) }
    }

    pub fn get(&self) -> Option<SessionToken> {
        self.current.read().unwrap().clone()
    }

    pub fn set(&self, token: SessionToken) {
        *self.current.write().unwrap() = Some(token);
    }

    /// `true` if there is no token, or it has expired.
    pub fn needs_login(&self) -> bool {
        match self.get() {
            None => true,
            Some(t) => t.is_expired(),
        }
    }
}

/// Build the admin field list for a `Login` request.
pub fn login_fields(user: &str, credential: &[u8]) -> Vec<FieldTlv> {
    vec![
        FieldTlv::new(admin_field::USER, user.as_bytes().to_vec()),
        FieldTlv::new(admin_field::CREDENTIAL, credential.to_vec()),
    ]
}

/// Build the admin field list for an `Authenticate` request presenting
/// an existing session token on a freshly-dialed connection.
pub fn authenticate_fields(user: &str, token: &[u8]) -> Vec<FieldTlv> {
    vec![
        FieldTlv::new(admin_field::USER, user.as_bytes().to_vec()),
        FieldTlv::new(admin_field::SESSION_TOKEN, token.to_vec()),
    ]
}

/// Parse the `session_ttl` admin reply field (seconds) into an
/// `Instant` deadline.
pub fn expiration_from_ttl_seconds(ttl_seconds: u32) -> Instant {
    Instant::now() + Duration::from_secs(ttl_seconds as u64)
}
