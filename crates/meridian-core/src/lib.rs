//! meridian-core — shared types used across every MeridianDB client crate.
//!
//! Holds the things that would otherwise create circular crate
//! dependencies: the error taxonomy (§7), the `Host`/`Key` value types, and
//! the node feature bitset.

pub mod error;
pub mod features;
pub mod host;
pub mod key;

pub use error::{CommandError, Error, ErrorKind, Result};
pub use features::FeatureBits;
pub use host::Host;
pub use key::Key;

/// Number of partitions in every namespace. Fixed by the protocol.
pub const PARTITION_COUNT: usize = 4096;
