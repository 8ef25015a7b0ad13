//! Proto frame header: `[version(1)][type(1)][length(6, big-endian)]` (§6).

use meridian_core::Error;

/// Hard ceiling on a frame's declared length. The 48-bit length field on
/// the wire could claim up to 256 TiB; §4.1 requires rejecting anything
/// past this recommended limit rather than trusting it.
pub const MAX_PROTO_SIZE: u64 = 128 * 1024 * 1024;

/// Receive buffers grow in this increment so that repeated small
/// over-allocations don't thrash the allocator (§4.1).
pub const BUFFER_GROWTH_INCREMENT: usize = 16 * 1024;

pub const CURRENT_VERSION: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameType {
    Uncompressed,
    Compressed,
}

impl FrameType {
    fn to_byte(self) -> u8 {
        match self {
            FrameType::Uncompressed => 3,
            FrameType::Compressed => 4,
        }
    }

    fn from_byte(b: u8) -> Result<Self, Error> {
        match b {
            3 => Ok(FrameType::Uncompressed),
            4 => Ok(FrameType::Compressed),
            other => Err(Error::Protocol(format!("unknown frame type byte {other}"))),
        }
    }
}

/// A decoded proto header plus the raw payload bytes that follow it
/// (still possibly compressed — §4.1's compression envelope is handled a
/// layer up, in `compress`).
#[derive(Debug, Clone)]
pub struct Frame {
    pub version: u8,
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(frame_type: FrameType, payload: Vec<u8>) -> Self {
        Self {
            version: CURRENT_VERSION,
            frame_type,
            payload,
        }
    }

    /// Encode the 8-byte header followed by `payload`, exactly
    /// byte-identical regardless of how many times this buffer has been
    /// reused (the header bytes are always written fresh, never left over
    /// from a previous encode).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.payload.len());
        out.push(self.version);
        out.push(self.frame_type.to_byte());
        let len = self.payload.len() as u64;
        // 6-byte big-endian length: top two bytes of a u64 are always zero
        // here because of the MAX_PROTO_SIZE check on decode, but on encode
        // we only ever produce frames we just built, so no check is needed.
        let len_bytes = len.to_be_bytes();
        out.extend_from_slice(&len_bytes[2..8]);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a header + payload from `buf`. `buf` must contain at least
    /// the full frame (header + declared length); callers performing
    /// streaming reads should first peek the header alone via
    /// `decode_header` to learn how many more bytes to read.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let (version, frame_type, len) = decode_header(buf)?;
        let body = &buf[8..];
        if (body.len() as u64) < len {
            return Err(Error::Protocol(format!(
                "short frame: declared {len} bytes, have {}",
                body.len()
            )));
        }
        Ok(Frame {
            version,
            frame_type,
            payload: body[..len as usize].to_vec(),
        })
    }
}

/// Decode just the 8-byte header, returning `(version, type, length)`.
/// Used by the connection layer to know how many more bytes to read before
/// calling `Frame::decode` on the full buffer.
pub fn decode_header(buf: &[u8]) -> Result<(u8, FrameType, u64), Error> {
    if buf.len() < 8 {
        return Err(Error::Protocol("frame header shorter than 8 bytes".into()));
    }
    let version = buf[0];
    let frame_type = FrameType::from_byte(buf[1])?;
    let mut len_bytes = [0u8; 8];
    len_bytes[2..8].copy_from_slice(&buf[2..8]);
    let len = u64::from_be_bytes(len_bytes);
    if len > MAX_PROTO_SIZE {
        return Err(Error::Protocol(format!(
            "frame length {len} exceeds hard limit of {MAX_PROTO_SIZE} bytes"
        )));
    }
    Ok((version, frame_type, len))
}

/// Round `len` up to the next `BUFFER_GROWTH_INCREMENT` multiple.
pub fn rounded_capacity(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    len.div_ceil(BUFFER_GROWTH_INCREMENT) * BUFFER_GROWTH_INCREMENT
}

/// A reusable receive buffer. Grows in 16 KiB increments and is reset
/// (not re-initialized field by field) between frames so repeated receives
/// produce identical bytes for identical input regardless of prior use.
#[derive(Debug, Default)]
pub struct RecvBuffer {
    bytes: Vec<u8>,
}

impl RecvBuffer {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Ensure the buffer can hold at least `needed` bytes, growing in
    /// 16 KiB increments if not, and reset its logical length to `needed`.
    pub fn ensure_capacity(&mut self, needed: usize) -> &mut [u8] {
        if self.bytes.len() < needed {
            let target = rounded_capacity(needed);
            self.bytes.resize(target, 0);
        }
        &mut self.bytes[..needed]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}
