//! Reply parsing: a stream of record groups, each with a fixed prelude
//! followed by fields and operations (§4.1).
//!
//! The actual bin/value decoding is delegated to an external collaborator
//! (§1 "Out of scope: the per-operation serialization of user values");
//! this module stops at handing raw `FieldTlv`/`OperationTlv` slices to
//! whatever implements `RecordSink`.

use crate::message::{FieldTlv, InfoAttr, MessageHeader, OperationTlv};
use meridian_core::Error;

/// One record group's fixed prelude, followed by `field_count` field TLVs
/// and `op_count` operation TLVs. Reuses the same 22-byte wire shape as
/// `MessageHeader`: in batch/scan replies the `server_timeout` slot is
/// reinterpreted as `batch_index`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordGroup {
    pub info_attr: InfoAttr,
    pub result_code: u8,
    pub generation: u32,
    pub ttl: u32,
    pub batch_index: u32,
    pub fields: Vec<FieldTlv>,
    pub ops: Vec<OperationTlv>,
}

impl RecordGroup {
    /// `true` when `INFO3_PARTITION_DONE` is set in this group's
    /// `info_attr` (§4.8 scan/query partition draining).
    pub fn partition_done(&self) -> bool {
        self.info_attr.contains(InfoAttr::PARTITION_DONE)
    }
}

/// Parse every record group out of `buf` (the bytes following the outer
/// message header in a reply frame), returning them in wire order.
pub fn parse_groups(buf: &[u8]) -> Result<Vec<RecordGroup>, Error> {
    let mut groups = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        if buf.len() - offset < MessageHeader::WIRE_LEN {
            return Err(Error::Protocol("truncated record group prelude".into()));
        }
        let prelude = MessageHeader::decode(&buf[offset..offset + MessageHeader::WIRE_LEN])?;
        offset += MessageHeader::WIRE_LEN;

        let mut fields = Vec::with_capacity(prelude.field_count as usize);
        for _ in 0..prelude.field_count {
            let (field, consumed) = FieldTlv::decode(&buf[offset..])?;
            fields.push(field);
            offset += consumed;
        }

        let mut ops = Vec::with_capacity(prelude.op_count as usize);
        for _ in 0..prelude.op_count {
            let (op, consumed) = OperationTlv::decode(&buf[offset..])?;
            ops.push(op);
            offset += consumed;
        }

        groups.push(RecordGroup {
            info_attr: prelude.info_attr,
            result_code: prelude.result_code,
            generation: prelude.generation,
            ttl: prelude.ttl,
            batch_index: prelude.server_timeout,
            fields,
            ops,
        });
    }
    Ok(groups)
}

/// External collaborator interface: receives parsed record groups one at a
/// time and turns them into the caller's record/value types. The core
/// never implements the "real" sink (bin/value decoding is out of scope);
/// it only defines the seam and a trivial in-crate implementation used by
/// tests.
pub trait RecordSink {
    fn accept(&mut self, group: RecordGroup);
}

/// A `RecordSink` that just collects every group it sees, used to exercise
/// the reply-parsing loop end to end without a real value decoder.
#[derive(Default)]
pub struct CollectingSink {
    pub groups: Vec<RecordGroup>,
}

impl RecordSink for CollectingSink {
    fn accept(&mut self, group: RecordGroup) {
        self.groups.push(group);
    }
}

/// Parse and feed every group in `buf` to `sink`, in order.
pub fn drive_sink(buf: &[u8], sink: &mut dyn RecordSink) -> Result<(), Error> {
    for group in parse_groups(buf)? {
        sink.accept(group);
    }
    Ok(())
}
