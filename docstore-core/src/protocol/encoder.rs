//! Serialization of spec queues and key-value requests into request packets.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use super::constants::{
    DATATYPE_JSON, LOOKUP_SPEC_HEADER_SIZE, MAX_SUBDOC_SPECS, MUTATION_SPEC_HEADER_SIZE,
};
use super::durability::DurabilityRequirement;
use super::flags::{DocFlags, PathFlags};
use super::opcode::OpCode;
use super::packet::RequestPacket;
use super::spec::OperationSpec;
use crate::error::{DocstoreError, Result};

/// Envelope settings of a multi-mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationEnvelope {
    /// Expected CAS, zero for none.
    pub cas: u64,
    /// Document expiry, `None` to leave it unchanged.
    pub expiry: Option<Duration>,
    /// Document-level flags.
    pub doc_flags: DocFlags,
    /// Durability requirement.
    pub durability: DurabilityRequirement,
}

/// Writes the lookup spec list: opcode, flags, path length (u16), path.
pub fn encode_lookup_specs(specs: &[OperationSpec], dst: &mut BytesMut) -> Result<()> {
    write_lookup_specs(specs, PathFlags::NONE, dst)
}

fn write_lookup_specs(specs: &[OperationSpec], implied: PathFlags, dst: &mut BytesMut) -> Result<()> {
    check_spec_count(specs)?;
    for (index, spec) in specs.iter().enumerate() {
        if !spec.opcode().is_lookup() {
            return Err(DocstoreError::Protocol(format!(
                "spec {index} uses {} which is not a lookup opcode",
                spec.opcode()
            )));
        }
        let path_len = path_length(index, spec)?;
        dst.reserve(LOOKUP_SPEC_HEADER_SIZE + spec.path().len());
        dst.put_u8(spec.opcode().value());
        dst.put_u8((spec.path_flags() | implied).bits());
        dst.put_u16(path_len);
        dst.put_slice(spec.path().as_bytes());
        tracing::trace!(index, opcode = %spec.opcode(), path = spec.path(), "encoded lookup spec");
    }
    Ok(())
}

/// Writes the mutation spec list: opcode, flags, path length (u16), value length (u32), path, value.
pub fn encode_mutation_specs(specs: &[OperationSpec], dst: &mut BytesMut) -> Result<()> {
    write_mutation_specs(specs, PathFlags::NONE, dst)
}

fn write_mutation_specs(
    specs: &[OperationSpec],
    implied: PathFlags,
    dst: &mut BytesMut,
) -> Result<()> {
    check_spec_count(specs)?;
    for (index, spec) in specs.iter().enumerate() {
        if !spec.opcode().is_mutation() {
            return Err(DocstoreError::Protocol(format!(
                "spec {index} uses {} which is not a mutation opcode",
                spec.opcode()
            )));
        }
        let path_len = path_length(index, spec)?;
        let value: &[u8] = spec.value().map(|v| &v[..]).unwrap_or(&[]);
        let value_len = u32::try_from(value.len()).map_err(|_| {
            DocstoreError::Protocol(format!("value of spec {index} exceeds u32::MAX bytes"))
        })?;
        dst.reserve(MUTATION_SPEC_HEADER_SIZE + spec.path().len() + value.len());
        dst.put_u8(spec.opcode().value());
        dst.put_u8((spec.path_flags() | implied).bits());
        dst.put_u16(path_len);
        dst.put_u32(value_len);
        dst.put_slice(spec.path().as_bytes());
        dst.put_slice(value);
        tracing::trace!(index, opcode = %spec.opcode(), path = spec.path(), "encoded mutation spec");
    }
    Ok(())
}

/// Builds a whole-document fetch.
pub fn get_request(key: &[u8], partition: u16) -> Result<RequestPacket> {
    RequestPacket::new(OpCode::Get, partition).with_key(key)
}

/// Builds a replica read.
pub fn replica_read_request(key: &[u8], partition: u16) -> Result<RequestPacket> {
    RequestPacket::new(OpCode::ReplicaRead, partition).with_key(key)
}

/// Builds a multi-path lookup for `specs`.
///
/// The document-flags byte is only sent when non-empty. Access to deleted
/// documents marks every path as an xattr path.
pub fn lookup_request(
    key: &[u8],
    partition: u16,
    specs: &[OperationSpec],
    doc_flags: DocFlags,
) -> Result<RequestPacket> {
    let doc_flags = specs
        .iter()
        .fold(doc_flags, |acc, spec| acc | spec.doc_flags());
    let mut body = BytesMut::new();
    write_lookup_specs(specs, doc_flags.implied_path_flags(), &mut body)?;

    let mut packet = RequestPacket::new(OpCode::SubMultiLookup, partition)
        .with_key(key)?
        .with_value(body.freeze());
    if !doc_flags.is_empty() {
        packet = packet.with_extras(Bytes::copy_from_slice(&[doc_flags.bits()]));
    }
    Ok(packet)
}

/// Builds a multi-path mutation for `specs`.
///
/// Extras hold the expiry (u32 seconds) when set, followed by the document-flags
/// byte when non-empty; the durability requirement goes into the framing extras.
pub fn mutation_request(
    key: &[u8],
    partition: u16,
    specs: &[OperationSpec],
    envelope: &MutationEnvelope,
) -> Result<RequestPacket> {
    let doc_flags = specs
        .iter()
        .fold(envelope.doc_flags, |acc, spec| acc | spec.doc_flags());
    let mut body = BytesMut::new();
    write_mutation_specs(specs, doc_flags.implied_path_flags(), &mut body)?;

    let mut extras = BytesMut::new();
    if let Some(expiry) = envelope.expiry {
        let seconds = u32::try_from(expiry.as_secs()).map_err(|_| {
            DocstoreError::Protocol(format!("expiry of {}s does not fit the wire", expiry.as_secs()))
        })?;
        extras.put_u32(seconds);
    }
    if !doc_flags.is_empty() {
        extras.put_u8(doc_flags.bits());
    }

    let mut framing = BytesMut::new();
    envelope.durability.write_framing_extra(&mut framing);

    let mut packet = RequestPacket::new(OpCode::SubMultiMutation, partition)
        .with_key(key)?
        .with_extras(extras.freeze())
        .with_framing_extras(framing.freeze())
        .with_value(body.freeze())
        .with_cas(envelope.cas);
    if specs.iter().any(|spec| spec.value().is_some()) {
        packet.datatype = DATATYPE_JSON;
    }
    Ok(packet)
}

fn check_spec_count(specs: &[OperationSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(DocstoreError::Protocol(
            "a multi-path operation needs at least one spec".to_string(),
        ));
    }
    if specs.len() > MAX_SUBDOC_SPECS {
        return Err(DocstoreError::Protocol(format!(
            "{} specs exceed the limit of {MAX_SUBDOC_SPECS} per operation",
            specs.len()
        )));
    }
    Ok(())
}

fn path_length(index: usize, spec: &OperationSpec) -> Result<u16> {
    u16::try_from(spec.path().len()).map_err(|_| {
        DocstoreError::Protocol(format!("path of spec {index} exceeds u16::MAX bytes"))
    })
}
