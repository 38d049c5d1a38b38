//! Request and response packets of the memcached binary protocol.

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::*;
use super::opcode::OpCode;
use super::status::ResponseStatus;
use crate::error::{DocstoreError, Result};

/// Maximum key length accepted by the server.
pub const MAX_KEY_LENGTH: usize = 250;

static OPAQUE: AtomicU32 = AtomicU32::new(1);

/// Returns the next request opaque. Wraps on overflow.
pub fn next_opaque() -> u32 {
    OPAQUE.fetch_add(1, Ordering::Relaxed)
}

/// An outgoing request packet.
///
/// Layout: 24-byte header, then framing extras, extras, key and value. When
/// framing extras are present the alternative magic is used and the key length
/// shrinks to a single byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPacket {
    /// Operation code.
    pub opcode: OpCode,
    /// Target partition.
    pub partition: u16,
    /// Correlation value echoed by the server.
    pub opaque: u32,
    /// CAS for optimistic concurrency, zero when unused.
    pub cas: u64,
    /// Datatype byte.
    pub datatype: u8,
    /// Framing extras (durability requirements).
    pub framing_extras: Bytes,
    /// Command extras.
    pub extras: Bytes,
    /// Document key.
    pub key: Bytes,
    /// Command body.
    pub value: Bytes,
}

impl RequestPacket {
    /// Creates an empty request for `opcode` against `partition`.
    pub fn new(opcode: OpCode, partition: u16) -> Self {
        Self {
            opcode,
            partition,
            opaque: next_opaque(),
            cas: 0,
            datatype: DATATYPE_RAW,
            framing_extras: Bytes::new(),
            extras: Bytes::new(),
            key: Bytes::new(),
            value: Bytes::new(),
        }
    }

    /// Sets the document key, rejecting keys the server would refuse.
    pub fn with_key(mut self, key: &[u8]) -> Result<Self> {
        if key.is_empty() || key.len() > MAX_KEY_LENGTH {
            return Err(DocstoreError::Protocol(format!(
                "key length {} outside 1..={MAX_KEY_LENGTH}",
                key.len()
            )));
        }
        self.key = Bytes::copy_from_slice(key);
        Ok(self)
    }

    /// Sets the command extras.
    pub fn with_extras(mut self, extras: Bytes) -> Self {
        self.extras = extras;
        self
    }

    /// Sets the framing extras.
    pub fn with_framing_extras(mut self, framing_extras: Bytes) -> Self {
        self.framing_extras = framing_extras;
        self
    }

    /// Sets the body.
    pub fn with_value(mut self, value: Bytes) -> Self {
        self.value = value;
        self
    }

    /// Sets the CAS.
    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    /// Total body length as written in the header.
    pub fn body_length(&self) -> usize {
        self.framing_extras.len() + self.extras.len() + self.key.len() + self.value.len()
    }

    /// Size of this packet on the wire.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body_length()
    }

    /// Writes this packet to the given buffer.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        if self.framing_extras.is_empty() {
            dst.put_u8(REQUEST_MAGIC);
            dst.put_u8(self.opcode.value());
            dst.put_u16(self.key.len() as u16);
        } else {
            dst.put_u8(ALT_REQUEST_MAGIC);
            dst.put_u8(self.opcode.value());
            dst.put_u8(self.framing_extras.len() as u8);
            dst.put_u8(self.key.len() as u8);
        }
        dst.put_u8(self.extras.len() as u8);
        dst.put_u8(self.datatype);
        dst.put_u16(self.partition);
        dst.put_u32(self.body_length() as u32);
        dst.put_u32(self.opaque);
        dst.put_u64(self.cas);
        dst.put_slice(&self.framing_extras);
        dst.put_slice(&self.extras);
        dst.put_slice(&self.key);
        dst.put_slice(&self.value);
    }

    /// Encodes this packet into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Parses a complete request packet.
    pub fn parse(mut src: Bytes) -> Result<Self> {
        let header = read_header(&mut src, &[REQUEST_MAGIC, ALT_REQUEST_MAGIC])?;
        let opcode = OpCode::from_value(header.opcode).ok_or_else(|| {
            DocstoreError::Protocol(format!("unknown opcode 0x{:02x}", header.opcode))
        })?;
        let body = split_body(&mut src, &header)?;
        Ok(Self {
            opcode,
            partition: header.vbucket_or_status,
            opaque: header.opaque,
            cas: header.cas,
            datatype: header.datatype,
            framing_extras: body.framing_extras,
            extras: body.extras,
            key: body.key,
            value: body.value,
        })
    }
}

/// An incoming response packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePacket {
    /// Raw opcode byte.
    pub opcode: u8,
    /// Response status.
    pub status: ResponseStatus,
    /// Datatype byte.
    pub datatype: u8,
    /// Correlation value of the request.
    pub opaque: u32,
    /// CAS of the document after the operation.
    pub cas: u64,
    /// Framing extras (server durations and similar).
    pub framing_extras: Bytes,
    /// Command extras, e.g. the document flags of a fetch.
    pub extras: Bytes,
    /// Key, when echoed.
    pub key: Bytes,
    /// Response body.
    pub value: Bytes,
}

impl ResponsePacket {
    /// Creates a response for `opcode` with `status` and an empty body.
    pub fn new(opcode: OpCode, status: ResponseStatus) -> Self {
        Self {
            opcode: opcode.value(),
            status,
            datatype: DATATYPE_RAW,
            opaque: 0,
            cas: 0,
            framing_extras: Bytes::new(),
            extras: Bytes::new(),
            key: Bytes::new(),
            value: Bytes::new(),
        }
    }

    /// Returns the opcode if it is known.
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_value(self.opcode)
    }

    /// Returns the document flags carried in the extras of a fetch response.
    pub fn flags(&self) -> u32 {
        if self.extras.len() >= 4 {
            (&self.extras[..4]).get_u32()
        } else {
            0
        }
    }

    /// Total body length as written in the header.
    pub fn body_length(&self) -> usize {
        self.framing_extras.len() + self.extras.len() + self.key.len() + self.value.len()
    }

    /// Writes this packet to the given buffer.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE + self.body_length());
        if self.framing_extras.is_empty() {
            dst.put_u8(RESPONSE_MAGIC);
            dst.put_u8(self.opcode);
            dst.put_u16(self.key.len() as u16);
        } else {
            dst.put_u8(ALT_RESPONSE_MAGIC);
            dst.put_u8(self.opcode);
            dst.put_u8(self.framing_extras.len() as u8);
            dst.put_u8(self.key.len() as u8);
        }
        dst.put_u8(self.extras.len() as u8);
        dst.put_u8(self.datatype);
        dst.put_u16(self.status.value());
        dst.put_u32(self.body_length() as u32);
        dst.put_u32(self.opaque);
        dst.put_u64(self.cas);
        dst.put_slice(&self.framing_extras);
        dst.put_slice(&self.extras);
        dst.put_slice(&self.key);
        dst.put_slice(&self.value);
    }

    /// Encodes this packet into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.body_length());
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Parses a complete response packet.
    pub fn parse(mut src: Bytes) -> Result<Self> {
        let header = read_header(&mut src, &[RESPONSE_MAGIC, ALT_RESPONSE_MAGIC])?;
        let body = split_body(&mut src, &header)?;
        Ok(Self {
            opcode: header.opcode,
            status: ResponseStatus::from_value(header.vbucket_or_status),
            datatype: header.datatype,
            opaque: header.opaque,
            cas: header.cas,
            framing_extras: body.framing_extras,
            extras: body.extras,
            key: body.key,
            value: body.value,
        })
    }

    /// Reads one response packet from the front of `src`.
    ///
    /// Returns `Ok(None)` if the buffer does not yet hold a complete packet.
    pub fn read_from(src: &mut BytesMut) -> Result<Option<Self>> {
        let Some(total) = complete_packet_len(src) else {
            return Ok(None);
        };
        let packet = src.split_to(total).freeze();
        Self::parse(packet).map(Some)
    }
}

/// Returns the length of the first packet in `src` once it is fully buffered.
pub(crate) fn complete_packet_len(src: &[u8]) -> Option<usize> {
    if src.len() < HEADER_SIZE {
        return None;
    }
    let body = (&src[BODY_LENGTH_OFFSET..BODY_LENGTH_OFFSET + 4]).get_u32() as usize;
    let total = HEADER_SIZE + body;
    (src.len() >= total).then_some(total)
}

struct Header {
    opcode: u8,
    framing_len: usize,
    key_len: usize,
    extras_len: usize,
    datatype: u8,
    vbucket_or_status: u16,
    body_len: usize,
    opaque: u32,
    cas: u64,
}

struct Body {
    framing_extras: Bytes,
    extras: Bytes,
    key: Bytes,
    value: Bytes,
}

fn read_header(src: &mut Bytes, magics: &[u8; 2]) -> Result<Header> {
    if src.len() < HEADER_SIZE {
        return Err(DocstoreError::Protocol(format!(
            "packet of {} bytes is shorter than the {HEADER_SIZE}-byte header",
            src.len()
        )));
    }
    let magic = src.get_u8();
    let opcode = src.get_u8();
    let (framing_len, key_len) = if magic == magics[0] {
        (0, src.get_u16() as usize)
    } else if magic == magics[1] {
        (src.get_u8() as usize, src.get_u8() as usize)
    } else {
        return Err(DocstoreError::Protocol(format!("unexpected magic 0x{magic:02x}")));
    };
    Ok(Header {
        opcode,
        framing_len,
        key_len,
        extras_len: src.get_u8() as usize,
        datatype: src.get_u8(),
        vbucket_or_status: src.get_u16(),
        body_len: src.get_u32() as usize,
        opaque: src.get_u32(),
        cas: src.get_u64(),
    })
}

fn split_body(src: &mut Bytes, header: &Header) -> Result<Body> {
    if src.len() < header.body_len {
        return Err(DocstoreError::Protocol(format!(
            "body declares {} bytes, {} available",
            header.body_len,
            src.len()
        )));
    }
    let fixed = header.framing_len + header.extras_len + header.key_len;
    if fixed > header.body_len {
        return Err(DocstoreError::Protocol(format!(
            "framing, extras and key ({fixed} bytes) exceed body length {}",
            header.body_len
        )));
    }
    let mut body = src.split_to(header.body_len);
    Ok(Body {
        framing_extras: body.split_to(header.framing_len),
        extras: body.split_to(header.extras_len),
        key: body.split_to(header.key_len),
        value: body,
    })
}
