//! Key-value and sub-document operations.
//!
//! Every operation resolves the key's partition against the bucket's current
//! topology, sends one request through the [`Transport`](crate::Transport) and
//! retries while servers answer that they do not own the partition.

mod collection;
mod get_result;
mod lookup_in;
mod mutate_in;
mod options;
mod projection;
mod replica;
mod timeout;

pub use collection::{Collection, KvSettings};
pub use get_result::GetResult;
pub use lookup_in::{LookupInBuilder, LookupInResult, LookupInSpec};
pub use mutate_in::{MutateInBuilder, MutateInResult, MutateInSpec};
pub use options::{GetOptions, LookupInOptions, MutateInOptions};
pub use replica::GetReplicaResult;
pub use timeout::OperationTimeout;
