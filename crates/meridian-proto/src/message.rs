//! Fixed 22-byte message header and field/operation TLVs (§6).

use meridian_core::Error;

pub const HEADER_SIZE: u8 = 22;

bitflags::bitflags! {
    /// `read_attr` byte.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ReadAttr: u8 {
        const READ           = 1 << 0;
        const GET_ALL        = 1 << 1;
        const BATCH          = 1 << 3;
        const NO_BIN_DATA    = 1 << 5;
        /// Strong-consistency "linearize" flag, set for `read_mode = LINEARIZE`.
        const LINEARIZE      = 1 << 6;
        /// Strong-consistency "allow unavailable" flag.
        const SC_ALLOW_UNAVAILABLE = 1 << 7;
    }
}

bitflags::bitflags! {
    /// `write_attr` byte.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct WriteAttr: u8 {
        const WRITE          = 1 << 0;
        const DELETE         = 1 << 1;
        const GENERATION     = 1 << 2;
        const GENERATION_GT  = 1 << 3;
        const DURABLE_DELETE = 1 << 4;
        const CREATE_ONLY    = 1 << 5;
        const RESPOND_ALL_OPS = 1 << 6;
    }
}

bitflags::bitflags! {
    /// `info_attr` byte.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct InfoAttr: u8 {
        const TOUCH        = 1 << 0;
        const GET_ALL      = 1 << 1;
        const PARTITION_DONE = 1 << 4;
        const UDF          = 1 << 6;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub read_attr: ReadAttr,
    pub write_attr: WriteAttr,
    pub info_attr: InfoAttr,
    pub result_code: u8,
    pub generation: u32,
    pub ttl: u32,
    pub server_timeout: u32,
    pub field_count: u16,
    pub op_count: u16,
}

impl MessageHeader {
    pub const WIRE_LEN: usize = HEADER_SIZE as usize;

    pub fn encode(&self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0] = HEADER_SIZE;
        out[1] = self.read_attr.bits();
        out[2] = self.write_attr.bits();
        out[3] = self.info_attr.bits();
        out[4] = 0; // unused
        out[5] = self.result_code;
        out[6..10].copy_from_slice(&self.generation.to_be_bytes());
        out[10..14].copy_from_slice(&self.ttl.to_be_bytes());
        out[14..18].copy_from_slice(&self.server_timeout.to_be_bytes());
        out[18..20].copy_from_slice(&self.field_count.to_be_bytes());
        out[20..22].copy_from_slice(&self.op_count.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < Self::WIRE_LEN {
            return Err(Error::Protocol(format!(
                "message header shorter than {} bytes",
                Self::WIRE_LEN
            )));
        }
        if buf[0] != HEADER_SIZE {
            return Err(Error::Protocol(format!(
                "unexpected header_size byte {} (want {})",
                buf[0], HEADER_SIZE
            )));
        }
        Ok(MessageHeader {
            read_attr: ReadAttr::from_bits_truncate(buf[1]),
            write_attr: WriteAttr::from_bits_truncate(buf[2]),
            info_attr: InfoAttr::from_bits_truncate(buf[3]),
            result_code: buf[5],
            generation: u32::from_be_bytes(buf[6..10].try_into().unwrap()),
            ttl: u32::from_be_bytes(buf[10..14].try_into().unwrap()),
            server_timeout: u32::from_be_bytes(buf[14..18].try_into().unwrap()),
            field_count: u16::from_be_bytes(buf[18..20].try_into().unwrap()),
            op_count: u16::from_be_bytes(buf[20..22].try_into().unwrap()),
        })
    }
}

/// A length-prefixed field TLV: `size(4 BE)=1+len, type(1), bytes`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldTlv {
    pub field_type: u8,
    pub data: Vec<u8>,
}

impl FieldTlv {
    pub fn new(field_type: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            field_type,
            data: data.into(),
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let size = 1 + self.data.len() as u32;
        out.extend_from_slice(&size.to_be_bytes());
        out.push(self.field_type);
        out.extend_from_slice(&self.data);
    }

    /// Decode one field TLV from the front of `buf`, returning it along
    /// with the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), Error> {
        if buf.len() < 5 {
            return Err(Error::Protocol("truncated field TLV".into()));
        }
        let size = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        if size == 0 {
            return Err(Error::Protocol("field TLV size must be >= 1".into()));
        }
        let total = 4 + size;
        if buf.len() < total {
            return Err(Error::Protocol("field TLV declares more data than available".into()));
        }
        let field_type = buf[4];
        let data = buf[5..total].to_vec();
        Ok((FieldTlv { field_type, data }, total))
    }
}

/// A length-prefixed operation TLV:
/// `size(4 BE), op_type(1), value_type(1), unused(1), name_len(1), name, value`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationTlv {
    pub op_type: u8,
    pub value_type: u8,
    pub name: String,
    pub value: Vec<u8>,
}

impl OperationTlv {
    pub fn new(op_type: u8, value_type: u8, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            op_type,
            value_type,
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let name_bytes = self.name.as_bytes();
        let size = 4 + name_bytes.len() as u32 + self.value.len() as u32;
        out.extend_from_slice(&size.to_be_bytes());
        out.push(self.op_type);
        out.push(self.value_type);
        out.push(0); // unused
        out.push(name_bytes.len() as u8);
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(&self.value);
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize), Error> {
        if buf.len() < 8 {
            return Err(Error::Protocol("truncated operation TLV".into()));
        }
        let size = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        let total = 4 + size;
        if buf.len() < total || size < 4 {
            return Err(Error::Protocol("operation TLV declares more data than available".into()));
        }
        let op_type = buf[4];
        let value_type = buf[5];
        let name_len = buf[7] as usize;
        let name_start = 8;
        let name_end = name_start + name_len;
        if buf.len() < name_end || total < name_end {
            return Err(Error::Protocol("operation TLV name exceeds bounds".into()));
        }
        let name = String::from_utf8_lossy(&buf[name_start..name_end]).into_owned();
        let value = buf[name_end..total].to_vec();
        Ok((
            OperationTlv {
                op_type,
                value_type,
                name,
                value,
            },
            total,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = MessageHeader {
            read_attr: ReadAttr::READ,
            write_attr: WriteAttr::empty(),
            info_attr: InfoAttr::empty(),
            result_code: 0,
            generation: 7,
            ttl: 300,
            server_timeout: 1000,
            field_count: 2,
            op_count: 1,
        };
        let encoded = header.encode();
        let decoded = MessageHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn header_rejects_wrong_size_byte() {
        let mut buf = [0u8; MessageHeader::WIRE_LEN];
        buf[0] = 10;
        assert!(MessageHeader::decode(&buf).is_err());
    }

    #[test]
    fn field_tlv_roundtrip() {
        let field = FieldTlv::new(0, b"test".to_vec());
        let mut buf = Vec::new();
        field.encode_into(&mut buf);
        let (decoded, consumed) = FieldTlv::decode(&buf).unwrap();
        assert_eq!(decoded, field);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn operation_tlv_roundtrip() {
        let op = OperationTlv::new(1, 3, "bin1", b"value-bytes".to_vec());
        let mut buf = Vec::new();
        op.encode_into(&mut buf);
        let (decoded, consumed) = OperationTlv::decode(&buf).unwrap();
        assert_eq!(decoded, op);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn operation_tlv_truncated_is_rejected() {
        let op = OperationTlv::new(1, 3, "bin1", b"value".to_vec());
        let mut buf = Vec::new();
        op.encode_into(&mut buf);
        buf.truncate(buf.len() - 2);
        assert!(OperationTlv::decode(&buf).is_err());
    }

    #[test]
    fn sequence_of_operations_decodes_each_in_turn() {
        let ops = vec![
            OperationTlv::new(1, 3, "a", b"1".to_vec()),
            OperationTlv::new(1, 3, "b", b"22".to_vec()),
        ];
        let mut buf = Vec::new();
        for op in &ops {
            op.encode_into(&mut buf);
        }
        let mut offset = 0;
        let mut decoded = Vec::new();
        while offset < buf.len() {
            let (op, consumed) = OperationTlv::decode(&buf[offset..]).unwrap();
            decoded.push(op);
            offset += consumed;
        }
        assert_eq!(decoded, ops);
    }
}
