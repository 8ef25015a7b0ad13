//! Record keys and the digest used to route them to a partition.
//!
//! The full record/value model is an external collaborator (§1 "Out of
//! scope"); this type holds exactly enough of a key's shape for the
//! partition resolver to compute a partition id from it.

use crate::PARTITION_COUNT;
use sha2::{Digest as _, Sha256};

/// Digest width in bytes. The original protocol uses a 160-bit digest
/// (RIPEMD160); this workspace has no RIPEMD160 dependency, so SHA-256
/// truncated to the first 20 bytes is used instead (see `DESIGN.md`). Only
/// the first 4 little-endian bytes are wire-significant for routing.
pub const DIGEST_LEN: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    pub namespace: String,
    pub set: String,
    pub user_key: Vec<u8>,
}

impl Key {
    pub fn new(namespace: impl Into<String>, set: impl Into<String>, user_key: impl Into<Vec<u8>>) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
            user_key: user_key.into(),
        }
    }

    /// Digest of `(set, user_key)`. The namespace does not participate in
    /// the digest (it selects which `Partitions` table to look the
    /// partition id up in, not the hash itself).
    pub fn digest(&self) -> [u8; DIGEST_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(self.set.as_bytes());
        hasher.update(&self.user_key);
        let full = hasher.finalize();
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&full[..DIGEST_LEN]);
        out
    }

    /// `partition_id = little_endian_u32(digest[0..4]) mod 4096`.
    pub fn partition_id(&self) -> u16 {
        partition_id_of(&self.digest())
    }
}

/// Free function form, used by code that already has a digest (e.g. batch
/// planning reuses digests computed once per key).
pub fn partition_id_of(digest: &[u8; DIGEST_LEN]) -> u16 {
    let bytes = [digest[0], digest[1], digest[2], digest[3]];
    (u32::from_le_bytes(bytes) as usize % PARTITION_COUNT) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let k = Key::new("test", "s", b"k1".to_vec());
        assert_eq!(k.digest(), k.digest());
    }

    #[test]
    fn different_keys_differ() {
        let a = Key::new("test", "s", b"k1".to_vec());
        let b = Key::new("test", "s", b"k2".to_vec());
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn namespace_does_not_affect_digest() {
        let a = Key::new("ns1", "s", b"k1".to_vec());
        let b = Key::new("ns2", "s", b"k1".to_vec());
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn partition_id_within_range() {
        for i in 0..1000u32 {
            let k = Key::new("test", "s", i.to_be_bytes().to_vec());
            assert!((k.partition_id() as usize) < PARTITION_COUNT);
        }
    }

    #[test]
    fn partition_id_of_matches_key_partition_id() {
        let k = Key::new("test", "s", b"some-key".to_vec());
        assert_eq!(k.partition_id(), partition_id_of(&k.digest()));
    }
}
