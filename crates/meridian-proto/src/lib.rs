//! meridian-proto — the binary wire codec and the text info protocol (§4.1, §4.4, §6).
//!
//! Everything in this crate is pure encode/decode logic over `&[u8]` /
//! `Vec<u8>`; it has no knowledge of sockets (that's `meridian-net`) or of
//! cluster topology (that's `meridian-cluster`). Keeping the codec
//! transport-agnostic is what lets it be unit-tested without a single TCP
//! connection anywhere in this crate's test suite.

pub mod compress;
pub mod frame;
pub mod info;
pub mod message;
pub mod partitions;
pub mod record;
pub mod result_code;

pub use frame::{Frame, FrameType, MAX_PROTO_SIZE};
pub use info::{PeerEntry, PeersPayload};
pub use message::{FieldTlv, MessageHeader, OperationTlv, ReadAttr, WriteAttr};
pub use partitions::{Bitmap, NamespaceReplicas};
pub use record::{CollectingSink, RecordGroup, RecordSink};
pub use result_code::ResultCode;
