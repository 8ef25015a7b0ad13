//! Partitions payload parsing (§6): `ns:regime,count,<base64 bitmap>,...;`.
//!
//! One namespace entry carries a regime number, a replica count, and one
//! base64-encoded bitmap per replica index (replica 0 is the master
//! bitmap, the rest are prole bitmaps). This module only decodes the
//! wire payload into per-namespace `Bitmap`s; building the full
//! partition-to-node table from those bitmaps is `meridian-cluster`'s job.

use meridian_core::{Error, PARTITION_COUNT};

const BITMAP_BYTES: usize = PARTITION_COUNT / 8;

/// A fixed-size bitset over all 4096 partitions, one bit per partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    bytes: [u8; BITMAP_BYTES],
}

impl Bitmap {
    pub fn zeroed() -> Self {
        Self {
            bytes: [0u8; BITMAP_BYTES],
        }
    }

    pub fn is_set(&self, partition_id: u16) -> bool {
        let idx = partition_id as usize;
        let byte = self.bytes[idx / 8];
        byte & (1 << (7 - (idx % 8))) != 0
    }

    pub fn set(&mut self, partition_id: u16) {
        let idx = partition_id as usize;
        self.bytes[idx / 8] |= 1 << (7 - (idx % 8));
    }

    pub fn to_base64(&self) -> String {
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, self.bytes)
    }

    pub fn from_base64(s: &str) -> Result<Self, Error> {
        let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s)
            .map_err(|e| Error::Protocol(format!("invalid base64 partition bitmap: {e}")))?;
        if decoded.len() != BITMAP_BYTES {
            return Err(Error::Protocol(format!(
                "partition bitmap has {} bytes, want {BITMAP_BYTES}",
                decoded.len()
            )));
        }
        let mut bytes = [0u8; BITMAP_BYTES];
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }
}

/// One namespace's entry in a `partition-generation` / `replicas-*` reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceReplicas {
    pub namespace: String,
    pub regime: u32,
    pub replicas: Vec<Bitmap>,
}

/// Parse a full `ns:regime,count,<bitmap>,...;ns2:...;` payload.
pub fn parse_replicas_payload(payload: &str) -> Result<Vec<NamespaceReplicas>, Error> {
    let mut out = Vec::new();
    for entry in payload.trim().split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        out.push(parse_namespace_entry(entry)?);
    }
    Ok(out)
}

fn parse_namespace_entry(entry: &str) -> Result<NamespaceReplicas, Error> {
    let (namespace, rest) = entry
        .split_once(':')
        .ok_or_else(|| Error::Protocol(format!("malformed partitions entry: {entry}")))?;
    let mut fields = rest.split(',');
    let regime = fields
        .next()
        .ok_or_else(|| Error::Protocol("partitions entry missing regime".into()))?
        .parse::<u32>()
        .map_err(|e| Error::Protocol(format!("invalid regime: {e}")))?;
    let count = fields
        .next()
        .ok_or_else(|| Error::Protocol("partitions entry missing replica count".into()))?
        .parse::<usize>()
        .map_err(|e| Error::Protocol(format!("invalid replica count: {e}")))?;

    let mut replicas = Vec::with_capacity(count);
    for _ in 0..count {
        let raw = fields
            .next()
            .ok_or_else(|| Error::Protocol("partitions entry has fewer bitmaps than its declared count".into()))?;
        replicas.push(Bitmap::from_base64(raw)?);
    }

    Ok(NamespaceReplicas {
        namespace: namespace.to_string(),
        regime,
        replicas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_set_and_is_set_roundtrip() {
        let mut bm = Bitmap::zeroed();
        assert!(!bm.is_set(0));
        bm.set(0);
        bm.set(4095);
        bm.set(13);
        assert!(bm.is_set(0));
        assert!(bm.is_set(4095));
        assert!(bm.is_set(13));
        assert!(!bm.is_set(14));
    }

    #[test]
    fn bitmap_base64_roundtrip() {
        let mut bm = Bitmap::zeroed();
        bm.set(100);
        bm.set(2048);
        let encoded = bm.to_base64();
        let decoded = Bitmap::from_base64(&encoded).unwrap();
        assert_eq!(decoded, bm);
    }

    #[test]
    fn from_base64_rejects_wrong_length() {
        let short = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, [0u8; 10]);
        assert!(Bitmap::from_base64(&short).is_err());
    }

    #[test]
    fn parses_single_namespace_entry() {
        let bm = Bitmap::zeroed();
        let payload = format!("test:0,1,{};", bm.to_base64());
        let parsed = parse_replicas_payload(&payload).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].namespace, "test");
        assert_eq!(parsed[0].regime, 0);
        assert_eq!(parsed[0].replicas.len(), 1);
    }

    #[test]
    fn parses_multiple_namespaces_with_multiple_replicas() {
        let mut master = Bitmap::zeroed();
        master.set(1);
        let mut prole = Bitmap::zeroed();
        prole.set(2);
        let payload = format!(
            "ns1:3,2,{},{};ns2:0,1,{};",
            master.to_base64(),
            prole.to_base64(),
            Bitmap::zeroed().to_base64()
        );
        let parsed = parse_replicas_payload(&payload).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].namespace, "ns1");
        assert_eq!(parsed[0].regime, 3);
        assert_eq!(parsed[0].replicas.len(), 2);
        assert_eq!(parsed[1].namespace, "ns2");
    }

    #[test]
    fn rejects_entry_with_missing_bitmap() {
        let payload = "ns1:0,2,AAAA;";
        assert!(parse_replicas_payload(payload).is_err());
    }

    #[test]
    fn rejects_malformed_entry_without_colon() {
        assert!(parse_replicas_payload("garbage").is_err());
    }

    #[test]
    fn tolerates_trailing_whitespace_and_empty_segments() {
        let payload = format!("  test:0,0;  ;");
        let parsed = parse_replicas_payload(&payload).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].replicas.is_empty());
    }
}
