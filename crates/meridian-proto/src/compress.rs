//! Compression envelope for `FrameType::Compressed` payloads:
//! `[u_length(8 BE)][deflate(payload)]` (§4.1, §6).

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use meridian_core::Error;
use std::io::{Read, Write};

/// Deflate `plaintext`, producing a fresh `Vec<u8>` distinct from the input
/// buffer (see `DESIGN.md`'s Open Question #1: the compressed-out buffer
/// must never alias the buffer the plaintext message was assembled in).
pub fn deflate(plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(plaintext)
        .map_err(|e| Error::Protocol(format!("deflate write failed: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| Error::Protocol(format!("deflate finish failed: {e}")))?;

    let mut out = Vec::with_capacity(8 + compressed.len());
    out.extend_from_slice(&(plaintext.len() as u64).to_be_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Inflate an envelope produced by `deflate`, returning the original
/// plaintext. Verifies the decompressed length matches the declared
/// `u_length` prefix.
pub fn inflate(envelope: &[u8]) -> Result<Vec<u8>, Error> {
    if envelope.len() < 8 {
        return Err(Error::Protocol("compressed envelope shorter than 8 bytes".into()));
    }
    let declared_len = u64::from_be_bytes(envelope[0..8].try_into().unwrap()) as usize;
    let mut decoder = DeflateDecoder::new(&envelope[8..]);
    let mut out = Vec::with_capacity(declared_len);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Protocol(format!("inflate failed: {e}")))?;
    if out.len() != declared_len {
        return Err(Error::Protocol(format!(
            "inflated length {} does not match declared length {declared_len}",
            out.len()
        )));
    }
    Ok(out)
}
