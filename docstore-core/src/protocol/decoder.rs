//! Positional decoding of multi-path response bodies.

use bytes::{Buf, Bytes};

use super::constants::LOOKUP_RESULT_HEADER_SIZE;
use super::spec::OperationSpec;
use super::status::ResponseStatus;
use crate::error::{DocstoreError, Result};

/// Decodes a multi-lookup body into `specs`.
///
/// Each entry is `status (u16) | length (u32) | body` and belongs to the next
/// spec in send order. The entry count must equal the spec count.
pub fn decode_lookup_response(body: &Bytes, specs: &mut [OperationSpec]) -> Result<()> {
    let mut cursor = body.clone();
    let mut decoded = 0usize;

    while cursor.has_remaining() {
        if cursor.remaining() < LOOKUP_RESULT_HEADER_SIZE {
            return Err(DocstoreError::Protocol(format!(
                "truncated lookup entry header at entry {decoded}"
            )));
        }
        let status = ResponseStatus::from_value(cursor.get_u16());
        let len = cursor.get_u32() as usize;
        if cursor.remaining() < len {
            return Err(DocstoreError::Protocol(format!(
                "lookup entry {decoded} declares {len} bytes, {} available",
                cursor.remaining()
            )));
        }
        let Some(spec) = specs.get_mut(decoded) else {
            return Err(DocstoreError::Protocol(format!(
                "lookup response has more entries than the {} specs sent",
                specs.len()
            )));
        };
        spec.set_result(status, cursor.split_to(len));
        tracing::trace!(index = decoded, ?status, len, "decoded lookup entry");
        decoded += 1;
    }

    if decoded != specs.len() {
        return Err(DocstoreError::Protocol(format!(
            "lookup response has {decoded} entries for {} specs",
            specs.len()
        )));
    }
    Ok(())
}

/// Decodes a multi-mutation body into `specs`.
///
/// On success the body lists only specs that return a value, as
/// `index (u8) | status (u16) | length (u32) | value`; every other spec is
/// marked successful with an empty body. On a multi-path failure the body is
/// a single `index (u8) | status (u16)` naming the first failing spec.
pub fn decode_mutation_response(
    overall: ResponseStatus,
    body: &Bytes,
    specs: &mut [OperationSpec],
) -> Result<()> {
    let mut cursor = body.clone();

    match overall {
        ResponseStatus::Success | ResponseStatus::SuccessDeleted => {
            for spec in specs.iter_mut() {
                spec.set_result(ResponseStatus::Success, Bytes::new());
            }
            while cursor.has_remaining() {
                if cursor.remaining() < 7 {
                    return Err(DocstoreError::Protocol(
                        "truncated mutation result entry".to_string(),
                    ));
                }
                let index = cursor.get_u8() as usize;
                let status = ResponseStatus::from_value(cursor.get_u16());
                let len = cursor.get_u32() as usize;
                if cursor.remaining() < len {
                    return Err(DocstoreError::Protocol(format!(
                        "mutation result {index} declares {len} bytes, {} available",
                        cursor.remaining()
                    )));
                }
                let value = cursor.split_to(len);
                spec_at(specs, index)?.set_result(status, value);
            }
        }
        ResponseStatus::MultiPathFailure | ResponseStatus::MultiPathFailureDeleted => {
            if cursor.remaining() < 3 {
                return Err(DocstoreError::Protocol(
                    "multi-path failure without a failing spec".to_string(),
                ));
            }
            let index = cursor.get_u8() as usize;
            let status = ResponseStatus::from_value(cursor.get_u16());
            spec_at(specs, index)?.set_result(status, Bytes::new());
        }
        other => {
            return Err(DocstoreError::Protocol(format!(
                "status {other:?} does not carry a mutation body"
            )));
        }
    }
    Ok(())
}

/// Returns the first failing spec and its error, if any spec failed.
pub fn first_failure(specs: &[OperationSpec]) -> Option<DocstoreError> {
    specs
        .iter()
        .enumerate()
        .find_map(|(index, spec)| spec.status().and_then(|s| s.to_path_error(index)))
}

fn spec_at(specs: &mut [OperationSpec], index: usize) -> Result<&mut OperationSpec> {
    let count = specs.len();
    specs.get_mut(index).ok_or_else(|| {
        DocstoreError::Protocol(format!(
            "mutation result refers to spec {index} but only {count} were sent"
        ))
    })
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::error::SubDocErrorKind;
    use crate::protocol::{OpCode, PathFlags};

    fn lookup_entry(buf: &mut BytesMut, status: u16, body: &[u8]) {
        buf.put_u16(status);
        buf.put_u32(body.len() as u32);
        buf.put_slice(body);
    }

    fn lookup_specs() -> Vec<OperationSpec> {
        vec![
            OperationSpec::new(OpCode::SubGet, "a.b", PathFlags::NONE),
            OperationSpec::new(OpCode::SubExist, "c", PathFlags::NONE),
        ]
    }

    #[test]
    fn test_lookup_entries_assigned_in_send_order() {
        let mut buf = BytesMut::new();
        lookup_entry(&mut buf, 0x00, b"{\"x\":1}");
        lookup_entry(&mut buf, 0xc0, b"");
        let mut specs = lookup_specs();

        decode_lookup_response(&buf.freeze(), &mut specs).unwrap();

        assert_eq!(specs[0].status(), Some(ResponseStatus::Success));
        assert_eq!(specs[0].bytes().unwrap().as_ref(), b"{\"x\":1}");
        assert_eq!(
            specs[1].status(),
            Some(ResponseStatus::SubDoc(SubDocErrorKind::PathNotFound))
        );
        assert!(specs[1].bytes().unwrap().is_empty());
    }

    #[test]
    fn test_lookup_too_few_entries_is_protocol_error() {
        let mut buf = BytesMut::new();
        lookup_entry(&mut buf, 0x00, b"1");
        let mut specs = lookup_specs();
        assert!(matches!(
            decode_lookup_response(&buf.freeze(), &mut specs),
            Err(DocstoreError::Protocol(_))
        ));
    }

    #[test]
    fn test_lookup_too_many_entries_is_protocol_error() {
        let mut buf = BytesMut::new();
        for _ in 0..3 {
            lookup_entry(&mut buf, 0x00, b"1");
        }
        let mut specs = lookup_specs();
        assert!(decode_lookup_response(&buf.freeze(), &mut specs).is_err());
    }

    #[test]
    fn test_lookup_truncated_body_is_protocol_error() {
        let mut buf = BytesMut::new();
        buf.put_u16(0);
        buf.put_u32(10);
        buf.put_slice(b"abc");
        let mut specs = vec![OperationSpec::new(OpCode::SubGet, "a", PathFlags::NONE)];
        assert!(decode_lookup_response(&buf.freeze(), &mut specs).is_err());
    }

    #[test]
    fn test_mutation_success_with_counter_value() {
        let mut specs = vec![
            OperationSpec::with_value(
                OpCode::SubDictUpsert,
                "a",
                Bytes::from_static(b"1"),
                PathFlags::NONE,
            ),
            OperationSpec::with_value(
                OpCode::SubCounter,
                "hits",
                Bytes::from_static(b"1"),
                PathFlags::NONE,
            ),
        ];
        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_u16(0);
        buf.put_u32(2);
        buf.put_slice(b"11");

        decode_mutation_response(ResponseStatus::Success, &buf.freeze(), &mut specs).unwrap();

        assert_eq!(specs[0].status(), Some(ResponseStatus::Success));
        assert!(specs[0].bytes().unwrap().is_empty());
        assert_eq!(specs[1].bytes().unwrap().as_ref(), b"11");
        assert!(first_failure(&specs).is_none());
    }

    #[test]
    fn test_mutation_failure_marks_failing_spec() {
        let mut specs = vec![
            OperationSpec::new(OpCode::SubDelete, "a", PathFlags::NONE),
            OperationSpec::new(OpCode::SubDelete, "b", PathFlags::NONE),
        ];
        let body = Bytes::from_static(&[0x01, 0x00, 0xc0]);

        decode_mutation_response(ResponseStatus::MultiPathFailure, &body, &mut specs).unwrap();

        assert!(specs[0].status().is_none());
        let err = first_failure(&specs).unwrap();
        assert!(matches!(
            err,
            DocstoreError::SubDocument {
                index: 1,
                kind: SubDocErrorKind::PathNotFound
            }
        ));
    }

    #[test]
    fn test_mutation_index_out_of_range() {
        let mut specs = vec![OperationSpec::new(OpCode::SubDelete, "a", PathFlags::NONE)];
        let body = Bytes::from_static(&[0x05, 0x00, 0xc0]);
        assert!(
            decode_mutation_response(ResponseStatus::MultiPathFailure, &body, &mut specs).is_err()
        );
    }
}
