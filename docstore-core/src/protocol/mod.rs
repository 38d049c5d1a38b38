//! Memcached binary protocol implementation for key-value and sub-document commands.
//!
//! This module provides the packet types, flag bytes, spec queue, encoder and
//! decoder used to talk to docstore data servers.

mod codec;
pub mod constants;
mod decoder;
mod durability;
mod encoder;
mod flags;
mod opcode;
mod packet;
mod spec;
mod status;

pub use codec::PacketCodec;
pub use constants::*;
pub use decoder::{decode_lookup_response, decode_mutation_response, first_failure};
pub use durability::{DurabilityLevel, DurabilityRequirement};
pub use encoder::{
    encode_lookup_specs, encode_mutation_specs, get_request, lookup_request, mutation_request,
    replica_read_request, MutationEnvelope,
};
pub use flags::{DocFlags, PathFlags, StoreSemantics};
pub use opcode::OpCode;
pub use packet::{next_opaque, RequestPacket, ResponsePacket, MAX_KEY_LENGTH};
pub use spec::{OperationSpec, SpecQueue};
pub use status::ResponseStatus;
