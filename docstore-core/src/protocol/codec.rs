//! Codec implementation for framing protocol packets on a byte stream.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::packet::{complete_packet_len, RequestPacket, ResponsePacket};
use crate::error::{DocstoreError, Result};

/// Codec writing request packets and reading response packets.
///
/// Implements the `tokio_util::codec::{Encoder, Decoder}` traits for use
/// with tokio's framed I/O.
#[derive(Debug, Default)]
pub struct PacketCodec {
    max_packet_size: Option<usize>,
}

impl PacketCodec {
    /// Creates a new codec instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a codec that rejects responses larger than `max` bytes.
    pub fn with_max_packet_size(max: usize) -> Self {
        Self {
            max_packet_size: Some(max),
        }
    }
}

impl Encoder<RequestPacket> for PacketCodec {
    type Error = DocstoreError;

    fn encode(&mut self, item: RequestPacket, dst: &mut BytesMut) -> Result<()> {
        item.write_to(dst);
        Ok(())
    }
}

impl Decoder for PacketCodec {
    type Item = ResponsePacket;
    type Error = DocstoreError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let (Some(max), Some(total)) = (self.max_packet_size, peek_declared_len(src)) {
            if total > max {
                return Err(DocstoreError::Protocol(format!(
                    "response of {total} bytes exceeds limit of {max}"
                )));
            }
        }
        match complete_packet_len(src) {
            Some(_) => ResponsePacket::read_from(src),
            None => {
                if let Some(total) = peek_declared_len(src) {
                    src.reserve(total.saturating_sub(src.len()));
                }
                Ok(None)
            }
        }
    }
}

fn peek_declared_len(src: &[u8]) -> Option<usize> {
    use super::constants::{BODY_LENGTH_OFFSET, HEADER_SIZE};
    if src.len() < HEADER_SIZE {
        return None;
    }
    let len = u32::from_be_bytes([
        src[BODY_LENGTH_OFFSET],
        src[BODY_LENGTH_OFFSET + 1],
        src[BODY_LENGTH_OFFSET + 2],
        src[BODY_LENGTH_OFFSET + 3],
    ]) as usize;
    Some(HEADER_SIZE + len)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::protocol::{OpCode, ResponseStatus};

    fn response(value: &'static [u8]) -> ResponsePacket {
        let mut packet = ResponsePacket::new(OpCode::Get, ResponseStatus::Success);
        packet.value = Bytes::from_static(value);
        packet
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::from(&[0x81, 0x00][..]);

        let result = codec.decode(&mut buf).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_decode_multiple_packets() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        response(b"one").write_to(&mut buf);
        response(b"three").write_to(&mut buf);

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(first.value.as_ref(), b"one");
        assert_eq!(second.value.as_ref(), b"three");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_then_complete_decode() {
        let mut codec = PacketCodec::new();
        let mut full = BytesMut::new();
        response(b"{\"name\":\"docstore\"}").write_to(&mut full);

        let split_point = full.len() / 2;
        let mut partial = full.split_to(split_point);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.unsplit(full);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded.value.as_ref(), b"{\"name\":\"docstore\"}");
    }

    #[test]
    fn test_oversized_packet_rejected() {
        let mut codec = PacketCodec::with_max_packet_size(30);
        let mut buf = BytesMut::new();
        response(b"0123456789").write_to(&mut buf);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(DocstoreError::Protocol(_))
        ));
    }

    #[test]
    fn test_encode_writes_request() {
        let mut codec = PacketCodec::new();
        let request = RequestPacket::new(OpCode::Get, 3).with_key(b"key").unwrap();
        let mut buf = BytesMut::new();
        codec.encode(request.clone(), &mut buf).unwrap();

        let parsed = RequestPacket::parse(buf.freeze()).unwrap();
        assert_eq!(parsed, request);
    }
}
