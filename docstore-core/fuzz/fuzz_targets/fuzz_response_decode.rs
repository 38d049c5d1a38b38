#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

use docstore_core::protocol::ResponsePacket;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    while !buf.is_empty() {
        match ResponsePacket::read_from(&mut buf) {
            Ok(Some(packet)) => {
                let _ = packet.flags();
                let _ = packet.opcode();
                let _ = packet.status.is_success();
            }
            Ok(None) | Err(_) => break,
        }
    }
});
