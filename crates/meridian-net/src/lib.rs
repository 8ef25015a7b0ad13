//! meridian-net — sockets, TLS verification, and connection pooling.
//!
//! Transport-only: nothing here parses wire bytes (that's `meridian-proto`)
//! or knows about cluster topology (that's `meridian-cluster`).

pub mod connection;
pub mod pool;
pub mod tls;

pub use connection::Connection;
pub use pool::{ConnPool, NodeConnPools, PoolConfig, PooledConnection};
pub use tls::NameAndRevocationVerifier;
