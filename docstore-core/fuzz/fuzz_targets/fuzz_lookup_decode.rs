#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use docstore_core::protocol::{
    decode_lookup_response, decode_mutation_response, OpCode, OperationSpec, PathFlags,
    ResponseStatus,
};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let count = (data[0] as usize % 16) + 1;
    let body = Bytes::copy_from_slice(&data[1..]);

    let mut specs: Vec<_> = (0..count)
        .map(|i| OperationSpec::new(OpCode::SubGet, format!("p{i}"), PathFlags::NONE))
        .collect();
    let _ = decode_lookup_response(&body, &mut specs);

    let mut specs: Vec<_> = (0..count)
        .map(|i| OperationSpec::new(OpCode::SubDelete, format!("p{i}"), PathFlags::NONE))
        .collect();
    let _ = decode_mutation_response(ResponseStatus::Success, &body, &mut specs);
    let _ = decode_mutation_response(ResponseStatus::MultiPathFailure, &body, &mut specs);
});
